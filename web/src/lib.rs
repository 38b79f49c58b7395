//! HTTP boundaries of the order lifecycle pipeline.
//!
//! Two small axum routers, each served by its own deployable:
//!
//! | Router | Route | Backed by |
//! |---|---|---|
//! | [`intake_router`] | `POST /` | [`IntakeService`](order_lifecycle_runtime::IntakeService) |
//! | [`status_router`] | `GET /order?id=` | [`StatusIndex`](order_lifecycle_runtime::StatusIndex) |
//!
//! Both also serve `GET /health`. Error responses are JSON `{code, message}`
//! produced by [`AppError`].
//!
//! # Example
//!
//! ```ignore
//! use order_lifecycle_web::status_router;
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8081").await?;
//! axum::serve(listener, status_router(index)).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod error;
pub mod handlers;
pub mod router;

pub use error::AppError;
pub use router::{intake_router, metrics_router, status_router};

/// Result type alias for web handlers.
pub type WebResult<T> = Result<T, AppError>;
