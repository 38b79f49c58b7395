//! # Order Lifecycle Runtime
//!
//! The moving parts of the order lifecycle pipeline, written against the
//! [`EventBus`](order_lifecycle_core::EventBus) trait so they run the same on
//! the in-memory bus in tests and on Redpanda in production.
//!
//! ## Components
//!
//! - **[`IntakeService`]**: validates purchase requests, assigns ids and
//!   publishes creation events
//! - **[`LifecycleProcessor`]**: the state machine; consumes `orders` and
//!   `status`, announces each transition and schedules the next one
//! - **[`NotificationDispatcher`]**: consumes `notifications`, updates the
//!   [`StatusIndex`] and emails the customer
//! - **[`EventConsumer`]**: the subscribe-decode-dispatch loop every consumer
//!   runs, with keyed fan-out through [`KeyedDispatcher`]
//!
//! ## Example
//!
//! ```ignore
//! use order_lifecycle_runtime::{LifecycleProcessor, PipelineConfig};
//! use tokio::sync::broadcast;
//!
//! let config = PipelineConfig::default();
//! let (shutdown_tx, _) = broadcast::channel(1);
//!
//! let processor = LifecycleProcessor::from_config(event_bus.clone(), &config);
//! let (creation, advance) = processor.spawn(event_bus, &config, &shutdown_tx);
//!
//! // Later
//! shutdown_tx.send(())?;
//! creation.await??;
//! advance.await??;
//! ```

pub mod config;
pub mod consumer;
pub mod dispatcher;
pub mod error;
pub mod intake;
pub mod lifecycle;
pub mod mail;
pub mod metrics;
pub mod notifier;
pub mod publisher;
pub mod retry;
pub mod status_index;

pub use config::PipelineConfig;
pub use consumer::{ConsumerError, ConsumerHandle, EventConsumer, OrderHandler};
pub use dispatcher::KeyedDispatcher;
pub use error::{IntakeError, MailError, PipelineError};
pub use intake::{IntakeService, NewOrder};
pub use lifecycle::{AdvanceStage, CreationStage, LifecycleProcessor, Transition};
pub use mail::{ConsoleMailer, Mailer, OrderNotification, SmtpConfig, SmtpMailer};
pub use notifier::NotificationDispatcher;
pub use publisher::EventPublisher;
pub use retry::{RetryPolicy, Transient, retry_transient};
pub use status_index::StatusIndex;
