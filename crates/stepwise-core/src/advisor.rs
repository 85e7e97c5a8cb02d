//! Advisory process contract
//!
//! The single integration point with whatever decides the next corrective
//! action (typically a completion model). The engine never depends on how
//! the decision is made.

use crate::error::AdvisorError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stepwise_tools::ToolParams;

/// Evidence handed to the advisory process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdvisoryRequest {
    /// Rendered step history
    pub history: String,
    /// Catalog of the step's tools: name -> description
    pub tool_descriptions: BTreeMap<String, String>,
}

/// Action chosen by the advisory process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    /// Registry name of the tool
    pub tool_name: String,
    /// Parameters for the tool
    #[serde(default)]
    pub params: ToolParams,
}

/// Structured decision of the advisory process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryDecision {
    /// Reasoning behind the choice
    pub analysis: String,
    /// What to do next
    pub next_action: NextAction,
}

impl AdvisoryDecision {
    /// Create decision
    #[must_use]
    pub fn new(analysis: impl Into<String>, tool_name: impl Into<String>, params: ToolParams) -> Self {
        Self {
            analysis: analysis.into(),
            next_action: NextAction {
                tool_name: tool_name.into(),
                params,
            },
        }
    }

    /// Parse a raw JSON payload
    ///
    /// # Errors
    /// `AdvisorError::Unparseable` when the payload is not JSON or lacks a
    /// required field
    pub fn from_json(raw: &str) -> Result<Self, AdvisorError> {
        serde_json::from_str(raw.trim()).map_err(|e| AdvisorError::Unparseable(e.to_string()))
    }
}

/// Proposes the next corrective action for a failed step
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Advisor: Send + Sync {
    /// Decide, given the step's history and tool catalog
    ///
    /// # Errors
    /// Any error ends the recovery attempt
    async fn advise(&self, request: &AdvisoryRequest) -> Result<AdvisoryDecision, AdvisorError>;
}
