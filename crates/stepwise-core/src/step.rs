//! Steps: the unit of sequential work
//!
//! A concrete step implements [`Step`] and embeds a [`StepState`], which
//! owns the step's tool registry and its append-only execution history.
//! [`StepState::invoke`] performs lookup, timed execution and recording in
//! one call, so no tool invocation goes unrecorded.

use crate::context::ScenarioContext;
use crate::error::StepFault;
use crate::record::{
    redact, EnvironmentSnapshot, ExecutionHistory, ExecutionRecord, DEFAULT_SNAPSHOT_MAX_CHARS,
};
use crate::status::StepStatus;
use async_trait::async_trait;
use chrono::Local;
use std::time::Duration;
use stepwise_tools::{Environment, ToolParams, ToolRegistry, ToolResponse};

/// Default bound on a single tool invocation
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Status, history and tools of one step
pub struct StepState<E: Environment> {
    status: StepStatus,
    history: ExecutionHistory,
    tools: ToolRegistry<E>,
    tool_timeout: Duration,
    snapshot_max_chars: usize,
}

impl<E: Environment> StepState<E> {
    /// Create state around a populated registry
    #[must_use]
    pub fn new(tools: ToolRegistry<E>) -> Self {
        Self {
            status: StepStatus::NotStarted,
            history: ExecutionHistory::new(),
            tools,
            tool_timeout: DEFAULT_TOOL_TIMEOUT,
            snapshot_max_chars: DEFAULT_SNAPSHOT_MAX_CHARS,
        }
    }

    /// With tool timeout
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tool_timeout = timeout;
        self
    }

    pub(crate) fn configure(&mut self, tool_timeout: Duration, snapshot_max_chars: usize) {
        self.tool_timeout = tool_timeout;
        self.snapshot_max_chars = snapshot_max_chars;
    }

    /// Current status
    #[inline]
    #[must_use]
    pub fn status(&self) -> StepStatus {
        self.status
    }

    /// Set status
    pub fn set_status(&mut self, status: StepStatus) {
        self.status = status;
    }

    /// Tools of this step
    #[inline]
    #[must_use]
    pub fn tools(&self) -> &ToolRegistry<E> {
        &self.tools
    }

    /// Recorded invocations
    #[inline]
    #[must_use]
    pub fn history(&self) -> &ExecutionHistory {
        &self.history
    }

    /// Bound on a single tool invocation
    #[inline]
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        self.tool_timeout
    }

    /// Append a record of a tool invocation
    ///
    /// Parameters the tool declares sensitive are redacted before storage.
    /// On failure, and when an environment is given, a bounded snapshot of
    /// the external state is captured.
    pub async fn record_execution(
        &mut self,
        tool_name: &str,
        params: &ToolParams,
        response: ToolResponse,
        env: Option<&E>,
        header_summary: Option<&str>,
    ) {
        let environment_snapshot = match env {
            Some(env) if !response.success => Some(EnvironmentSnapshot::new(
                env.current_address(),
                &env.describe_state().await,
                self.snapshot_max_chars,
            )),
            _ => None,
        };

        let sensitive = self.tools.sensitive_params(tool_name);
        self.history.push(ExecutionRecord {
            timestamp: Local::now(),
            tool_name: tool_name.to_string(),
            tool_params: redact(params, &sensitive),
            response,
            header_summary: header_summary.map(str::to_string),
            environment_snapshot,
        });
    }

    /// Render the history trace with the current status
    #[must_use]
    pub fn render_history(&self, include_successful: bool) -> String {
        self.history.render(self.status, include_successful)
    }

    /// Look up, execute under the tool timeout, and record
    ///
    /// Missing required parameters and timeouts are recorded and returned
    /// as expected failures; the tool is not run in the first case.
    ///
    /// # Errors
    /// - `StepFault::Registry` when the tool is not registered
    /// - `StepFault::Tool` when the tool faults (the fault is recorded first)
    pub async fn invoke(
        &mut self,
        tool_name: &str,
        params: &ToolParams,
        env: &mut E,
        header_summary: Option<&str>,
    ) -> Result<ToolResponse, StepFault> {
        let tool = self.tools.get(tool_name)?;

        let spec = tool.spec();
        let missing = spec.missing_required(params);
        if !missing.is_empty() {
            let missing = missing.join("`, `");
            tracing::warn!(tool = tool_name, missing = %missing, "tool invoked without required parameters");
            let response = ToolResponse::failure(format!("missing required parameter `{missing}`"));
            self.record_execution(tool_name, params, response.clone(), Some(&*env), header_summary)
                .await;
            return Ok(response);
        }

        tracing::debug!(tool = tool_name, "invoking tool");

        let response = match tokio::time::timeout(self.tool_timeout, tool.execute(env, params)).await {
            Ok(Ok(response)) => response,
            Ok(Err(fault)) => {
                tracing::error!(tool = tool_name, error = %fault, "tool faulted");
                let recorded = ToolResponse::failure(format!("Tool fault: {fault}"));
                self.record_execution(tool_name, params, recorded, Some(&*env), header_summary)
                    .await;
                return Err(StepFault::tool(tool_name, fault));
            }
            Err(_) => {
                tracing::warn!(tool = tool_name, timeout = ?self.tool_timeout, "tool timed out");
                ToolResponse::failure(format!(
                    "Tool timed out after {}s",
                    self.tool_timeout.as_secs_f64()
                ))
            }
        };

        self.record_execution(tool_name, params, response.clone(), Some(&*env), header_summary)
            .await;
        Ok(response)
    }
}

impl<E: Environment> std::fmt::Debug for StepState<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepState")
            .field("status", &self.status)
            .field("records", &self.history.len())
            .field("tools", &self.tools.names())
            .field("tool_timeout", &self.tool_timeout)
            .finish()
    }
}

/// One verifiable unit of work within a scenario
#[async_trait]
pub trait Step<E: Environment>: Send + Sync {
    /// Short identifier used in logs and diagnostics
    fn name(&self) -> &str;

    /// Human-readable description of what the step does
    fn description(&self) -> String;

    /// Embedded state
    fn state(&self) -> &StepState<E>;

    /// Embedded state, mutably
    fn state_mut(&mut self) -> &mut StepState<E>;

    /// Run the step's fixed action sequence
    ///
    /// Returns whether the step believes it reached its goal. Expected tool
    /// failures are reported as `Ok(false)`.
    ///
    /// # Errors
    /// `StepFault` for unexpected failures, which are never retried
    async fn execute(&mut self, ctx: &ScenarioContext, env: &mut E) -> Result<bool, StepFault>;

    /// Re-check the goal condition against the environment
    ///
    /// Takes the environment by shared borrow: repeated calls without an
    /// intervening action return the same answer.
    ///
    /// # Errors
    /// `StepFault` when the environment cannot be inspected
    async fn verify_success(&self, ctx: &ScenarioContext, env: &E) -> Result<bool, StepFault>;

    /// Current status
    fn status(&self) -> StepStatus {
        self.state().status()
    }

    /// Render the history trace
    fn render_history(&self, include_successful: bool) -> String {
        self.state().render_history(include_successful)
    }
}
