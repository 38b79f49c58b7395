//! Error types for the pipeline components.
//!
//! Failures fall into four groups, and each group is handled differently:
//!
//! | Group | Example | Handling |
//! |---|---|---|
//! | client input | blank product name | rejected synchronously by intake |
//! | decode | malformed event payload | message skipped, loop continues |
//! | transport | broker unreachable | retried with backoff, then fatal for the loop |
//! | domain | advance from `finalizado` | message dropped, never escalated |

use crate::retry::Transient;
use order_lifecycle_core::{CodecError, EventBusError, OrderId, OrderStatus, TransitionError};
use thiserror::Error;

/// Errors from [`IntakeService::submit`](crate::intake::IntakeService::submit).
#[derive(Error, Debug)]
pub enum IntakeError {
    /// The request is not a well-formed order.
    #[error("invalid order request: {0}")]
    Invalid(String),

    /// The order could not be encoded.
    #[error(transparent)]
    Encode(#[from] CodecError),

    /// The broker did not accept the creation event.
    #[error("failed to publish order: {0}")]
    Publish(#[from] EventBusError),
}

impl IntakeError {
    /// Whether the caller sent a bad request, as opposed to a server failure.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::Invalid(_))
    }
}

/// Errors raised while handling one consumed lifecycle event.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// A payload could not be decoded, or a snapshot could not be encoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The snapshot asks for a transition the lifecycle does not allow.
    #[error("order {order_id} in status {status}: {source}")]
    Domain {
        /// Order concerned.
        order_id: OrderId,
        /// Status carried by the snapshot.
        status: OrderStatus,
        /// Rejected transition.
        #[source]
        source: TransitionError,
    },

    /// Publishing failed even after retrying.
    #[error("transport failure for order {order_id}: {source}")]
    Transport {
        /// Order concerned.
        order_id: OrderId,
        /// Last broker error.
        #[source]
        source: EventBusError,
    },
}

impl PipelineError {
    /// Whether the owning consumer loop must stop.
    ///
    /// Only exhausted transport retries are fatal. Bad messages are skipped.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Transport { .. })
    }

    /// Short label for logs and metrics.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Codec(_) => "codec",
            Self::Domain { .. } => "domain",
            Self::Transport { .. } => "transport",
        }
    }
}

/// Errors delivering a notification email.
#[derive(Error, Debug)]
pub enum MailError {
    /// Sender or recipient address does not parse.
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress {
        /// Offending address.
        address: String,
        /// Parser message.
        reason: String,
    },

    /// The message could not be assembled.
    #[error("failed to build email: {0}")]
    Build(String),

    /// The mail server could not be reached or refused the message.
    #[error("failed to send email: {0}")]
    Transport(String),
}

impl Transient for MailError {
    fn is_transient(&self) -> bool {
        matches!(self, Self::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transport_errors_are_fatal() {
        let transport = PipelineError::Transport {
            order_id: OrderId::new(1),
            source: EventBusError::TransportError("down".into()),
        };
        let domain = PipelineError::Domain {
            order_id: OrderId::new(1),
            status: OrderStatus::Finalized,
            source: TransitionError::Terminal,
        };

        assert!(transport.is_fatal());
        assert!(!domain.is_fatal());
        assert_eq!(domain.kind(), "domain");
    }

    #[test]
    fn invalid_intake_is_client_error() {
        assert!(IntakeError::Invalid("blank".into()).is_client_error());
        assert!(!IntakeError::Publish(EventBusError::Other("x".into())).is_client_error());
    }

    #[test]
    fn only_mail_transport_is_retried() {
        assert!(MailError::Transport("timeout".into()).is_transient());
        assert!(!MailError::Build("no body".into()).is_transient());
    }
}
