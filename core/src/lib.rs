//! # Order Lifecycle Core
//!
//! Core types and traits for the order lifecycle pipeline.
//!
//! An order is created by the intake service, advanced one status at a time by
//! the lifecycle state machine, and observed by the notification dispatcher.
//! Every hop goes through a partitioned, ordered message broker. This crate
//! holds the pieces every component agrees on:
//!
//! - [`order`]: the [`Order`] snapshot and the [`OrderStatus`] transition table
//! - [`event`]: topic names and the JSON wire codec for lifecycle events
//! - [`event_bus`]: the [`EventBus`](event_bus::EventBus) publish/subscribe contract
//! - [`id`]: process-local order identity generation
//!
//! ## Data Flow
//!
//! ```text
//! client ──► intake ──► orders ──► state machine ──┬──► notifications ──► dispatcher
//!                                      ▲           │
//!                                      └── status ◄┘  (until finalizado)
//! ```
//!
//! No I/O happens here; the runtime and broker crates supply the behavior.

pub mod event;
pub mod event_bus;
pub mod id;
pub mod order;

// Re-export commonly used types
pub use event::{CodecError, EventRecord, NOTIFICATIONS_TOPIC, ORDERS_TOPIC, STATUS_TOPIC};
pub use event_bus::{Acknowledgement, Delivery, EventBus, EventBusError, EventStream};
pub use id::{AtomicOrderIdGenerator, OrderIdGenerator};
pub use order::{Order, OrderId, OrderStatus, TransitionError};
