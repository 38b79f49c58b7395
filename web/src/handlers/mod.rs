//! HTTP request handlers.

pub mod health;
pub mod intake;
pub mod status;

pub use health::health_check;
pub use intake::submit_order;
pub use status::{StatusQuery, order_status};
