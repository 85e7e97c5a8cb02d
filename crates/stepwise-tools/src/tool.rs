//! The tool contract

use crate::environment::Environment;
use crate::error::ToolFault;
use crate::response::{ToolParams, ToolResponse};
use crate::spec::ToolSpec;
use async_trait::async_trait;
use serde_json::Value;

/// One atomic operation invocable by a step or by the recovery procedure
///
/// Tools are stateless with respect to the engine. Expected failures are
/// reported as `Ok(ToolResponse { success: false, .. })`; `Err` is reserved
/// for unexpected faults, which the engine never retries.
#[async_trait]
pub trait Tool<E: Environment>: Send + Sync {
    /// Declared capability (description + parameters)
    fn spec(&self) -> ToolSpec;

    /// Human/model readable description used in the advisory catalog
    fn description(&self) -> String {
        self.spec().catalog_text()
    }

    /// Whether this tool delegates the decision to a human operator
    ///
    /// The recovery procedure routes such tools through the escalation
    /// channel instead of calling `execute` directly.
    fn is_human_escalation(&self) -> bool {
        false
    }

    /// Execute against the environment
    async fn execute(&self, env: &mut E, params: &ToolParams) -> Result<ToolResponse, ToolFault>;
}

/// Fetch a required string parameter
///
/// # Errors
/// `ToolFault::InvalidParameter` when absent or not a string
pub fn require_str<'a>(params: &'a ToolParams, name: &str) -> Result<&'a str, ToolFault> {
    match params.get(name) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(ToolFault::invalid_parameter(name, "must be a string")),
        None => Err(ToolFault::invalid_parameter(name, "missing")),
    }
}

/// Fetch an optional list of strings
///
/// A single string is accepted as a one-element list; `null` is absent.
///
/// # Errors
/// `ToolFault::InvalidParameter` when present with another shape
pub fn optional_str_list(params: &ToolParams, name: &str) -> Result<Option<Vec<String>>, ToolFault> {
    match params.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(vec![s.clone()])),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| ToolFault::invalid_parameter(name, "list items must be strings"))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(ToolFault::invalid_parameter(name, "must be a list of strings")),
    }
}
