//! Escalation broker contract
//!
//! Two independent append-only logs:
//! - requests, read through competing-consumer groups (each entry goes to
//!   exactly one consumer of a group)
//! - responses, read by full re-scan filtered by `request_id`
//!   (at-least-once; a consumed response stays visible to other waiters)

use crate::error::BrokerError;
use crate::message::{HumanRequest, HumanResponse};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Default consumer group of request handlers
pub const DEFAULT_CONSUMER_GROUP: &str = "agent_group";

/// Position of an entry in a log
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntryId(pub u64);

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-0", self.0)
    }
}

/// A request delivered to one consumer of a group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimedRequest {
    /// Log entry, used to acknowledge or release
    pub entry: EntryId,
    /// The request
    pub request: HumanRequest,
}

/// Request/response mailbox shared by concurrent scenario runs
#[async_trait]
pub trait EscalationBroker: Send + Sync {
    /// Append a request to the request log
    async fn publish_request(&self, request: &HumanRequest) -> Result<EntryId, BrokerError>;

    /// Append a response to the response log
    async fn publish_response(&self, response: &HumanResponse) -> Result<EntryId, BrokerError>;

    /// Claim undelivered requests for `consumer` within `group`
    ///
    /// Waits up to `max_wait` for at least one entry; returns an empty batch
    /// when none arrived.
    async fn claim_requests(
        &self,
        group: &str,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Vec<ClaimedRequest>, BrokerError>;

    /// Mark a claimed entry as handled
    async fn ack(&self, group: &str, entry: EntryId) -> Result<(), BrokerError>;

    /// Return a claimed entry to the group for a future consumer
    async fn release(&self, group: &str, entry: EntryId) -> Result<(), BrokerError>;

    /// Scan the response log for an answer to `request_id`
    async fn find_response(&self, request_id: Uuid) -> Result<Option<HumanResponse>, BrokerError>;

    /// Wait up to `timeout` for an answer to `request_id`
    ///
    /// Returns `None` when the deadline passes without a match.
    async fn await_response(
        &self,
        request_id: Uuid,
        timeout: Duration,
    ) -> Result<Option<HumanResponse>, BrokerError>;
}
