//! Advisor replaying recorded decisions

use parking_lot::Mutex;
use std::collections::VecDeque;
use stepwise_core::{Advisor, AdvisorError, AdvisoryDecision, AdvisoryRequest};

/// Hands out decisions from a JSON array in order
///
/// Stands in for a completion model: each decision uses the same
/// `{"analysis": ..., "next_action": {"tool_name": ..., "params": {...}}}`
/// shape a model would answer with.
#[derive(Debug, Default)]
pub struct ReplayAdvisor {
    decisions: Mutex<VecDeque<AdvisoryDecision>>,
}

impl ReplayAdvisor {
    /// Create advisor over `decisions`
    #[must_use]
    pub fn new(decisions: impl IntoIterator<Item = AdvisoryDecision>) -> Self {
        Self {
            decisions: Mutex::new(decisions.into_iter().collect()),
        }
    }

    /// Parse a JSON array of decisions
    ///
    /// # Errors
    /// `AdvisorError::Unparseable` if the text is not such an array
    pub fn from_json(raw: &str) -> Result<Self, AdvisorError> {
        let decisions: Vec<AdvisoryDecision> =
            serde_json::from_str(raw).map_err(|e| AdvisorError::Unparseable(e.to_string()))?;
        Ok(Self::new(decisions))
    }

    /// Decisions not handed out yet
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.decisions.lock().len()
    }
}

#[async_trait::async_trait]
impl Advisor for ReplayAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<AdvisoryDecision, AdvisorError> {
        tracing::debug!(
            history_chars = request.history.len(),
            tools = request.tool_descriptions.len(),
            "advisory request"
        );
        self.decisions
            .lock()
            .pop_front()
            .ok_or_else(|| AdvisorError::NoAction("no recorded decisions left".to_string()))
    }
}
