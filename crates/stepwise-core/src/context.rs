//! Mutable state of one scenario run

use crate::error::TransitionError;
use crate::status::{validate_transition, ScenarioStatus, StepStatus};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

/// Structured parameters produced by the command parser
pub type ParsedParams = Map<String, Value>;

/// State of one scenario run
///
/// Owned by exactly one engine; steps only ever see a shared borrow. The
/// command and parsed parameters are fixed at creation, the step cursor only
/// moves forward and only past a completed step.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScenarioContext {
    scenario_id: Uuid,
    original_command: String,
    parsed_params: ParsedParams,
    current_step_index: usize,
    status: ScenarioStatus,
    error_context: Option<Map<String, Value>>,
}

impl ScenarioContext {
    /// Create context in `NotStarted`
    #[must_use]
    pub fn new(original_command: impl Into<String>, parsed_params: ParsedParams) -> Self {
        Self {
            scenario_id: Uuid::new_v4(),
            original_command: original_command.into(),
            parsed_params,
            current_step_index: 0,
            status: ScenarioStatus::NotStarted,
            error_context: None,
        }
    }

    /// Run identifier, also used to tag escalation requests
    #[inline]
    #[must_use]
    pub fn scenario_id(&self) -> Uuid {
        self.scenario_id
    }

    /// Command that started the run
    #[inline]
    #[must_use]
    pub fn original_command(&self) -> &str {
        &self.original_command
    }

    /// Parsed parameters
    #[inline]
    #[must_use]
    pub fn parsed_params(&self) -> &ParsedParams {
        &self.parsed_params
    }

    /// String parameter, if present
    #[must_use]
    pub fn param_str(&self, name: &str) -> Option<&str> {
        self.parsed_params.get(name).and_then(Value::as_str)
    }

    /// Index of the step being executed
    #[inline]
    #[must_use]
    pub fn current_step_index(&self) -> usize {
        self.current_step_index
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> ScenarioStatus {
        self.status
    }

    /// Diagnostic payload of the failure, if any
    #[inline]
    #[must_use]
    pub fn error_context(&self) -> Option<&Map<String, Value>> {
        self.error_context.as_ref()
    }

    pub(crate) fn transition(&mut self, to: ScenarioStatus) -> Result<(), TransitionError> {
        validate_transition(self.status, to)?;
        tracing::debug!(
            scenario_id = %self.scenario_id,
            from = %self.status,
            to = %to,
            "scenario status change"
        );
        self.status = to;
        Ok(())
    }

    /// Move the cursor past the current step
    pub(crate) fn advance(&mut self, step_status: StepStatus) -> Result<(), TransitionError> {
        if step_status != StepStatus::Completed {
            return Err(TransitionError::StepNotCompleted {
                index: self.current_step_index,
                status: step_status,
            });
        }
        self.current_step_index += 1;
        Ok(())
    }

    /// Record the diagnostic and move to `Failed`
    pub(crate) fn fail(&mut self, diagnostic: Map<String, Value>) -> Result<(), TransitionError> {
        self.error_context = Some(diagnostic);
        self.transition(ScenarioStatus::Failed)
    }
}
