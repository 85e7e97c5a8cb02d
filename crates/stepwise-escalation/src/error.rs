//! Error types for the escalation channel
//!
//! - Broker failures (storage, serialization, unknown entries)
//! - Escalation outcomes (a timed-out wait is recoverable)
//! - Operator failures (invalid choice, closed input)

use crate::broker::EntryId;
use std::time::Duration;
use uuid::Uuid;

/// Message broker errors
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    /// A message could not be encoded
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Acknowledge/release of an entry the group does not hold
    #[error("entry {entry} is not pending in group `{group}`")]
    UnknownEntry {
        /// Consumer group
        group: String,
        /// Log entry
        entry: EntryId,
    },

    /// Backing store unavailable
    #[error("broker unavailable: {0}")]
    Unavailable(String),
}

/// Escalation errors
#[derive(Debug, thiserror::Error)]
pub enum EscalationError {
    /// No matching response arrived in time
    #[error("timeout waiting for human response to request {request_id} after {}s", waited.as_secs())]
    Timeout {
        /// Request that went unanswered
        request_id: Uuid,
        /// How long the waiter waited
        waited: Duration,
    },

    /// Broker failure
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl EscalationError {
    /// Check if the human simply did not answer in time
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    /// Check if error is retryable
    ///
    /// A timeout is; the next advisory round may pick another action.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.is_timeout()
    }
}

/// Human operator errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperatorError {
    /// Answer matches none of the offered options
    #[error("invalid choice `{0}`")]
    InvalidChoice(String),

    /// Reading the answer failed
    #[error("input error: {0}")]
    Input(String),

    /// The operator is gone (closed terminal, EOF)
    #[error("operator unavailable")]
    Closed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_is_retryable() {
        let err = EscalationError::Timeout {
            request_id: Uuid::new_v4(),
            waited: Duration::from_secs(1),
        };
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert!(err.to_string().contains("after 1s"));
    }

    #[test]
    fn broker_error_is_not_retryable() {
        let err = EscalationError::from(BrokerError::Unavailable("down".to_string()));
        assert!(!err.is_retryable());
    }
}
