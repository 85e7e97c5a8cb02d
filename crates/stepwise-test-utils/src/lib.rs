//! Testing utilities for the Stepwise workspace
//!
//! An in-memory environment of named boolean flags, tools acting on it,
//! scripted steps and scenarios, and an advisor replaying canned decisions.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use stepwise_core::{
    Advisor, AdvisorError, AdvisoryDecision, AdvisoryRequest, ParsedParams, Plan, Scenario,
    ScenarioContext, ScenarioError, Step, StepFault, StepState,
};
use stepwise_tools::{
    require_str, Environment, ParamSpec, Tool, ToolFault, ToolParams, ToolRegistry, ToolResponse,
    ToolSpec,
};

pub const SET_FLAG_TOOL: &str = "SetFlagTool";
pub const FAIL_TOOL: &str = "FailTool";
pub const FAULT_TOOL: &str = "FaultTool";

/// Object-shaped JSON into tool parameters; anything else is empty
pub fn params(value: Value) -> ToolParams {
    match value {
        Value::Object(map) => map,
        _ => ToolParams::new(),
    }
}

/// Advisory decision for `tool_name` with JSON parameters
pub fn suggest(tool_name: &str, value: Value) -> AdvisoryDecision {
    AdvisoryDecision::new(format!("try {tool_name}"), tool_name, params(value))
}

// ---------------------------------------------------------------------------
// Environment
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default)]
pub struct FakeEnvironment {
    address: String,
    flags: BTreeMap<String, bool>,
    actions: Vec<String>,
}

impl FakeEnvironment {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            ..Self::default()
        }
    }

    pub fn flag(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }

    pub fn set_flag(&mut self, name: &str, value: bool) {
        self.flags.insert(name.to_string(), value);
    }

    pub fn navigate(&mut self, address: impl Into<String>) {
        self.address = address.into();
    }

    /// Tool invocations in order, as `tool:detail`
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub fn log_action(&mut self, action: impl Into<String>) {
        self.actions.push(action.into());
    }
}

#[async_trait]
impl Environment for FakeEnvironment {
    fn current_address(&self) -> String {
        self.address.clone()
    }

    async fn describe_state(&self) -> String {
        let flags: Vec<String> = self
            .flags
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        format!("flags: {}", flags.join(", "))
    }
}

// ---------------------------------------------------------------------------
// Tools
// ---------------------------------------------------------------------------

/// Sets `flag` to `value` (default `true`)
#[derive(Debug, Clone, Copy, Default)]
pub struct SetFlagTool;

#[async_trait]
impl Tool<FakeEnvironment> for SetFlagTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Set a named flag in the environment")
            .param(ParamSpec::required("flag", "flag name"))
            .param(ParamSpec::optional("value", "boolean, defaults to true"))
    }

    async fn execute(
        &self,
        env: &mut FakeEnvironment,
        params: &ToolParams,
    ) -> Result<ToolResponse, ToolFault> {
        let flag = require_str(params, "flag")?;
        let value = params.get("value").and_then(Value::as_bool).unwrap_or(true);
        env.set_flag(flag, value);
        env.log_action(format!("{SET_FLAG_TOOL}:{flag}"));
        Ok(ToolResponse::ok().with_meta("flag", flag))
    }
}

/// Always reports an expected failure
#[derive(Debug, Clone)]
pub struct FailingTool {
    message: String,
}

impl FailingTool {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingTool {
    fn default() -> Self {
        Self::new("element not found")
    }
}

#[async_trait]
impl Tool<FakeEnvironment> for FailingTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Attempt an action that does not work")
    }

    async fn execute(
        &self,
        env: &mut FakeEnvironment,
        _params: &ToolParams,
    ) -> Result<ToolResponse, ToolFault> {
        env.log_action(FAIL_TOOL);
        Ok(ToolResponse::failure(self.message.clone()))
    }
}

/// Always faults
#[derive(Debug, Clone, Copy, Default)]
pub struct FaultyTool;

#[async_trait]
impl Tool<FakeEnvironment> for FaultyTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Lose the environment session")
    }

    async fn execute(
        &self,
        _env: &mut FakeEnvironment,
        _params: &ToolParams,
    ) -> Result<ToolResponse, ToolFault> {
        Err(ToolFault::Environment("session lost".to_string()))
    }
}

/// Fails and counts its executions
#[derive(Debug, Clone, Default)]
pub struct CountingTool {
    calls: Arc<AtomicUsize>,
}

impl CountingTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shared counter, readable after the tool moved into a registry
    pub fn counter(&self) -> Arc<AtomicUsize> {
        Arc::clone(&self.calls)
    }
}

#[async_trait]
impl Tool<FakeEnvironment> for CountingTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new("Retry the same thing").param(ParamSpec::optional("target", "what to retry"))
    }

    async fn execute(
        &self,
        _env: &mut FakeEnvironment,
        _params: &ToolParams,
    ) -> Result<ToolResponse, ToolFault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ToolResponse::failure("still broken"))
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

/// Recipe for a [`FlagStep`]
#[derive(Debug, Clone)]
pub struct StepScript {
    pub name: String,
    pub flag: String,
    pub tool: String,
    pub params: ToolParams,
}

impl StepScript {
    /// Sets its own flag on first execution
    pub fn succeeding(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flag: name.to_string(),
            tool: SET_FLAG_TOOL.to_string(),
            params: params(json!({ "flag": name })),
        }
    }

    /// Fails on first execution; recovered by setting the flag named `name`
    pub fn failing(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flag: name.to_string(),
            tool: FAIL_TOOL.to_string(),
            params: ToolParams::new(),
        }
    }

    /// Faults on first execution
    pub fn faulting(name: &str) -> Self {
        Self {
            name: name.to_string(),
            flag: name.to_string(),
            tool: FAULT_TOOL.to_string(),
            params: ToolParams::new(),
        }
    }
}

/// Registry with the set, fail and fault tools
///
/// # Errors
/// Never in practice; registration validates the built-in specs
pub fn base_tools() -> Result<ToolRegistry<FakeEnvironment>, stepwise_tools::RegistryError> {
    ToolRegistry::new()
        .with_tool(SET_FLAG_TOOL, Arc::new(SetFlagTool))?
        .with_tool(FAIL_TOOL, Arc::new(FailingTool::default()))?
        .with_tool(FAULT_TOOL, Arc::new(FaultyTool))
}

/// Step whose goal is its flag being set
#[derive(Debug)]
pub struct FlagStep {
    script: StepScript,
    state: StepState<FakeEnvironment>,
}

impl FlagStep {
    pub fn new(script: StepScript, tools: ToolRegistry<FakeEnvironment>) -> Self {
        Self {
            script,
            state: StepState::new(tools),
        }
    }
}

#[async_trait]
impl Step<FakeEnvironment> for FlagStep {
    fn name(&self) -> &str {
        &self.script.name
    }

    fn description(&self) -> String {
        format!("Make flag `{}` true", self.script.flag)
    }

    fn state(&self) -> &StepState<FakeEnvironment> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut StepState<FakeEnvironment> {
        &mut self.state
    }

    async fn execute(
        &mut self,
        ctx: &ScenarioContext,
        env: &mut FakeEnvironment,
    ) -> Result<bool, StepFault> {
        let header = self.description();
        self.state
            .invoke(&self.script.tool, &self.script.params, env, Some(&header))
            .await?;
        self.verify_success(ctx, env).await
    }

    async fn verify_success(
        &self,
        _ctx: &ScenarioContext,
        env: &FakeEnvironment,
    ) -> Result<bool, StepFault> {
        Ok(env.flag(&self.script.flag))
    }
}

// ---------------------------------------------------------------------------
// Scenario
// ---------------------------------------------------------------------------

/// Scenario built from step recipes
///
/// Matches commands containing its keyword; empty commands do not parse.
pub struct ScriptedScenario {
    name: String,
    keyword: String,
    steps: Vec<StepScript>,
    extra_tools: Vec<(String, Arc<dyn Tool<FakeEnvironment>>)>,
}

impl ScriptedScenario {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            keyword: name.to_string(),
            steps: Vec::new(),
            extra_tools: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_keyword(mut self, keyword: &str) -> Self {
        self.keyword = keyword.to_string();
        self
    }

    #[must_use]
    pub fn with_step(mut self, script: StepScript) -> Self {
        self.steps.push(script);
        self
    }

    /// Add a tool to every step's registry
    #[must_use]
    pub fn with_tool(mut self, name: &str, tool: Arc<dyn Tool<FakeEnvironment>>) -> Self {
        self.extra_tools.push((name.to_string(), tool));
        self
    }
}

#[async_trait]
impl Scenario<FakeEnvironment> for ScriptedScenario {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify_intent(&self, command: &str) -> f64 {
        if command.contains(&self.keyword) {
            0.9
        } else {
            0.05
        }
    }

    async fn parse_command(&self, command: &str) -> Result<ParsedParams, ScenarioError> {
        if command.trim().is_empty() {
            return Err(ScenarioError::Parse("empty command".to_string()));
        }
        Ok(params(json!({ "command": command })))
    }

    fn build_steps(&self, _params: &ParsedParams) -> Result<Plan<FakeEnvironment>, ScenarioError> {
        self.steps
            .iter()
            .map(|script| {
                let mut tools = base_tools().map_err(|e| ScenarioError::Plan(e.to_string()))?;
                for (name, tool) in &self.extra_tools {
                    tools
                        .register(name, Arc::clone(tool))
                        .map_err(|e| ScenarioError::Plan(e.to_string()))?;
                }
                Ok(Box::new(FlagStep::new(script.clone(), tools)) as Box<dyn Step<FakeEnvironment>>)
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Advisor
// ---------------------------------------------------------------------------

/// Advisor replaying queued outcomes, then an optional fallback
#[derive(Default)]
pub struct ScriptedAdvisor {
    script: Mutex<VecDeque<Result<AdvisoryDecision, AdvisorError>>>,
    fallback: Option<AdvisoryDecision>,
    requests: Mutex<Vec<AdvisoryRequest>>,
}

impl ScriptedAdvisor {
    pub fn new(decisions: impl IntoIterator<Item = AdvisoryDecision>) -> Self {
        Self {
            script: Mutex::new(decisions.into_iter().map(Ok).collect()),
            ..Self::default()
        }
    }

    /// Suggest the same decision forever
    pub fn repeating(decision: AdvisoryDecision) -> Self {
        Self {
            fallback: Some(decision),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn then_error(self, error: AdvisorError) -> Self {
        self.script.lock().push_back(Err(error));
        self
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn requests(&self) -> Vec<AdvisoryRequest> {
        self.requests.lock().clone()
    }
}

#[async_trait]
impl Advisor for ScriptedAdvisor {
    async fn advise(&self, request: &AdvisoryRequest) -> Result<AdvisoryDecision, AdvisorError> {
        self.requests.lock().push(request.clone());
        match self.script.lock().pop_front() {
            Some(outcome) => outcome,
            None => self
                .fallback
                .clone()
                .ok_or_else(|| AdvisorError::NoAction("script exhausted".to_string())),
        }
    }
}
