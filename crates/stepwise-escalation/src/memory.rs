//! In-process escalation broker
//!
//! Provides [`InMemoryBroker`]:
//! - Two append-only logs of JSON-encoded entries
//! - Consumer-group cursors with pending/requeue bookkeeping
//! - Change notification through `watch` channels, so waiters block on a
//!   channel receive with a deadline instead of polling

use crate::broker::{ClaimedRequest, EntryId, EscalationBroker};
use crate::error::BrokerError;
use crate::message::{HumanRequest, HumanResponse};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;
use uuid::Uuid;

/// Append-only log of JSON entries
#[derive(Debug)]
struct AppendLog {
    entries: RwLock<Vec<String>>,
    generation: watch::Sender<u64>,
}

impl AppendLog {
    fn new() -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            entries: RwLock::new(Vec::new()),
            generation,
        }
    }

    fn append(&self, payload: String) -> EntryId {
        let id = {
            let mut entries = self.entries.write();
            entries.push(payload);
            EntryId((entries.len() - 1) as u64)
        };
        self.touch();
        id
    }

    /// Wake every waiter of this log
    fn touch(&self) {
        self.generation.send_modify(|g| *g = g.wrapping_add(1));
    }

    fn subscribe(&self) -> watch::Receiver<u64> {
        self.generation.subscribe()
    }

    fn len(&self) -> usize {
        self.entries.read().len()
    }

    fn get(&self, index: usize) -> Option<String> {
        self.entries.read().get(index).cloned()
    }

    fn snapshot(&self) -> Vec<String> {
        self.entries.read().clone()
    }
}

/// Delivery state of one consumer group
#[derive(Debug, Default)]
struct GroupState {
    /// Next never-delivered entry
    next: usize,
    /// Released entries, redelivered before new ones
    requeued: VecDeque<usize>,
    /// Delivered but not yet acknowledged: entry -> consumer
    pending: HashMap<usize, String>,
}

/// Broker statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStats {
    /// Entries in the request log
    pub requests: usize,
    /// Entries in the response log
    pub responses: usize,
    /// Claimed-but-unacknowledged entries across groups
    pub pending: usize,
}

/// In-process broker shared by every scenario run of a process
#[derive(Debug)]
pub struct InMemoryBroker {
    requests: AppendLog,
    responses: AppendLog,
    groups: DashMap<String, Mutex<GroupState>>,
}

impl InMemoryBroker {
    /// Create new empty broker
    #[must_use]
    pub fn new() -> Self {
        Self {
            requests: AppendLog::new(),
            responses: AppendLog::new(),
            groups: DashMap::new(),
        }
    }

    /// Get broker statistics
    #[must_use]
    pub fn stats(&self) -> BrokerStats {
        let pending = self
            .groups
            .iter()
            .map(|group| group.value().lock().pending.len())
            .sum();

        BrokerStats {
            requests: self.requests.len(),
            responses: self.responses.len(),
            pending,
        }
    }

    /// Deliver whatever the group has not delivered yet
    fn claim_available(&self, group: &str, consumer: &str) -> Vec<ClaimedRequest> {
        let state = self.groups.entry(group.to_string()).or_default();
        let mut state = state.lock();
        // read under the group lock so the cursor never moves backwards
        let total = self.requests.len().max(state.next);

        let mut indexes: Vec<usize> = state.requeued.drain(..).collect();
        indexes.extend(state.next..total);
        state.next = total;

        let mut claimed = Vec::with_capacity(indexes.len());
        for index in indexes {
            let Some(payload) = self.requests.get(index) else {
                continue;
            };
            match serde_json::from_str::<HumanRequest>(&payload) {
                Ok(request) => {
                    state.pending.insert(index, consumer.to_string());
                    claimed.push(ClaimedRequest {
                        entry: EntryId(index as u64),
                        request,
                    });
                }
                Err(e) => {
                    tracing::error!(entry = index, error = %e, "skipping malformed request entry");
                }
            }
        }
        claimed
    }

    fn settle(&self, group: &str, entry: EntryId, requeue: bool) -> Result<(), BrokerError> {
        let unknown = || BrokerError::UnknownEntry {
            group: group.to_string(),
            entry,
        };

        let state = self.groups.get(group).ok_or_else(unknown)?;
        let mut state = state.lock();
        let index = usize::try_from(entry.0).map_err(|_| unknown())?;

        if state.pending.remove(&index).is_none() {
            return Err(unknown());
        }
        if requeue {
            state.requeued.push_back(index);
        }
        Ok(())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EscalationBroker for InMemoryBroker {
    async fn publish_request(&self, request: &HumanRequest) -> Result<EntryId, BrokerError> {
        let payload = serde_json::to_string(request)?;
        let entry = self.requests.append(payload);
        tracing::info!(
            request_id = %request.request_id,
            scenario_id = request.scenario_id.as_deref().unwrap_or("-"),
            "published human request: {}",
            request.question
        );
        Ok(entry)
    }

    async fn publish_response(&self, response: &HumanResponse) -> Result<EntryId, BrokerError> {
        let payload = serde_json::to_string(response)?;
        let entry = self.responses.append(payload);
        tracing::info!(request_id = %response.request_id, "published human response");
        Ok(entry)
    }

    async fn claim_requests(
        &self,
        group: &str,
        consumer: &str,
        max_wait: Duration,
    ) -> Result<Vec<ClaimedRequest>, BrokerError> {
        let deadline = Instant::now() + max_wait;
        let mut changes = self.requests.subscribe();

        loop {
            let claimed = self.claim_available(group, consumer);
            if !claimed.is_empty() {
                return Ok(claimed);
            }

            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(Vec::new()),
            }
        }
    }

    async fn ack(&self, group: &str, entry: EntryId) -> Result<(), BrokerError> {
        self.settle(group, entry, false)
    }

    async fn release(&self, group: &str, entry: EntryId) -> Result<(), BrokerError> {
        self.settle(group, entry, true)?;
        tracing::debug!(group, %entry, "request released back to group");
        self.requests.touch();
        Ok(())
    }

    async fn find_response(&self, request_id: Uuid) -> Result<Option<HumanResponse>, BrokerError> {
        for payload in self.responses.snapshot() {
            match serde_json::from_str::<HumanResponse>(&payload) {
                Ok(response) if response.request_id == request_id => return Ok(Some(response)),
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = %e, "skipping malformed response entry");
                }
            }
        }
        Ok(None)
    }

    async fn await_response(
        &self,
        request_id: Uuid,
        timeout: Duration,
    ) -> Result<Option<HumanResponse>, BrokerError> {
        let deadline = Instant::now() + timeout;
        let mut changes = self.responses.subscribe();

        loop {
            if let Some(response) = self.find_response(request_id).await? {
                return Ok(Some(response));
            }

            match tokio::time::timeout_at(deadline, changes.changed()).await {
                Ok(Ok(())) => continue,
                Ok(Err(_)) | Err(_) => return Ok(None),
            }
        }
    }
}
