//! Wire messages of the escalation channel
//!
//! Requests and responses live in two independent logs and are correlated
//! exclusively by `request_id`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A question for the human operator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanRequest {
    /// Correlation id, fresh per request
    pub request_id: Uuid,
    /// Scenario run that asked
    #[serde(default)]
    pub scenario_id: Option<String>,
    /// Question text
    pub question: String,
    /// Valid answers, if restricted
    #[serde(default)]
    pub options: Option<Vec<String>>,
}

impl HumanRequest {
    /// Create request with a fresh id
    #[must_use]
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            scenario_id: None,
            question: question.into(),
            options: None,
        }
    }

    /// With originating scenario
    #[inline]
    #[must_use]
    pub fn with_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = Some(scenario_id.into());
        self
    }

    /// With answer options
    #[inline]
    #[must_use]
    pub fn with_options(mut self, options: Option<Vec<String>>) -> Self {
        self.options = options.filter(|o| !o.is_empty());
        self
    }
}

/// The operator's answer to a request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HumanResponse {
    /// Id of the answered request
    pub request_id: Uuid,
    /// Answer text
    pub response: String,
}

impl HumanResponse {
    /// Create response
    #[inline]
    #[must_use]
    pub fn new(request_id: Uuid, response: impl Into<String>) -> Self {
        Self {
            request_id,
            response: response.into(),
        }
    }
}
