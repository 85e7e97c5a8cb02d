//! Recovery procedure
//!
//! Runs after a step failed. Each round renders the step history, asks the
//! advisory process for the next action and applies it, until the step's
//! goal condition holds or the policy gives up:
//! - an unknown tool aborts immediately
//! - the same action suggested `max_consecutive_retries` times in a row aborts
//! - `max_total_retries` bounds the number of rounds
//!
//! Escalations to the human bypass the repeat detector; an answer resets it.

use crate::advisor::{Advisor, AdvisoryRequest, NextAction};
use crate::context::ScenarioContext;
use crate::error::RecoveryError;
use crate::fingerprint::ActionFingerprint;
use crate::step::Step;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use stepwise_escalation::{
    call_human, escalation_response, EscalationBroker, HumanQuestion, DEFAULT_HUMAN_TIMEOUT,
    PARAM_QUESTION, PARAM_SCENARIO_ID,
};
use stepwise_tools::{Environment, Tool, ToolParams, ToolResponse};
use tokio::io::AsyncWriteExt;

/// Retry limits of one recovery attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryPolicy {
    /// Advisory rounds per failed step
    pub max_total_retries: u32,
    /// Consecutive identical suggestions that abort the attempt
    pub max_consecutive_retries: u32,
}

impl RecoveryPolicy {
    /// Create policy
    #[inline]
    #[must_use]
    pub fn new(max_total_retries: u32, max_consecutive_retries: u32) -> Self {
        Self {
            max_total_retries,
            max_consecutive_retries,
        }
    }
}

impl Default for RecoveryPolicy {
    fn default() -> Self {
        Self::new(12, 3)
    }
}

/// Outcome of a successful recovery
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    /// Rounds that ran, including the successful one
    pub attempts: u32,
    /// Advisory invocations
    pub advisory_calls: u32,
    /// Rounds routed to the human
    pub escalations: u32,
}

/// Verdict of the repeat detector on one suggestion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopVerdict {
    /// Run the action; `consecutive` counts identical suggestions in a row
    Proceed {
        /// Run length including this suggestion
        consecutive: u32,
    },
    /// Refuse the action
    Stuck {
        /// Run length including this suggestion
        consecutive: u32,
    },
}

/// Detects the advisory process repeating itself
#[derive(Debug, Clone)]
pub struct LoopDetector {
    limit: u32,
    last: Option<ActionFingerprint>,
    consecutive: u32,
}

impl LoopDetector {
    /// Create detector aborting at `limit` identical suggestions in a row
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            last: None,
            consecutive: 1,
        }
    }

    /// Judge the next suggestion
    pub fn observe(&mut self, fingerprint: ActionFingerprint) -> LoopVerdict {
        if self.last.as_ref() == Some(&fingerprint) {
            self.consecutive += 1;
            if self.consecutive >= self.limit {
                return LoopVerdict::Stuck {
                    consecutive: self.consecutive,
                };
            }
        } else {
            self.consecutive = 1;
        }
        self.last = Some(fingerprint);
        LoopVerdict::Proceed {
            consecutive: self.consecutive,
        }
    }

    /// Forget the previous action
    pub fn reset(&mut self) {
        self.last = None;
        self.consecutive = 1;
    }
}

/// Broker access of the recovery procedure
#[derive(Clone)]
pub struct Escalation {
    broker: Arc<dyn EscalationBroker>,
    timeout: Duration,
}

impl Escalation {
    /// Create with [`DEFAULT_HUMAN_TIMEOUT`]
    #[must_use]
    pub fn new(broker: Arc<dyn EscalationBroker>) -> Self {
        Self {
            broker,
            timeout: DEFAULT_HUMAN_TIMEOUT,
        }
    }

    /// With answer timeout
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Answer timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for Escalation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Escalation")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Bounded, loop-detecting retry of a failed step
pub struct RecoveryProcedure<'a> {
    advisor: &'a dyn Advisor,
    policy: RecoveryPolicy,
    escalation: Option<&'a Escalation>,
    dump_path: Option<&'a Path>,
}

impl<'a> RecoveryProcedure<'a> {
    /// Create procedure
    #[must_use]
    pub fn new(advisor: &'a dyn Advisor, policy: RecoveryPolicy) -> Self {
        Self {
            advisor,
            policy,
            escalation: None,
            dump_path: None,
        }
    }

    /// Route human escalations through a broker
    #[must_use]
    pub fn with_escalation(mut self, escalation: Option<&'a Escalation>) -> Self {
        self.escalation = escalation;
        self
    }

    /// Append every rendered history to a file
    #[must_use]
    pub fn with_dump_path(mut self, path: Option<&'a Path>) -> Self {
        self.dump_path = path;
        self
    }

    /// Run until the step verifies or the policy gives up
    ///
    /// # Errors
    /// - `UnknownTool`, `StuckLoop`, `BudgetExhausted` when the policy gives up
    /// - `Advisory`, `ToolFault`, `Step` when a collaborator faults
    pub async fn run<E: Environment>(
        &self,
        step: &mut dyn Step<E>,
        ctx: &ScenarioContext,
        env: &mut E,
    ) -> Result<RecoveryReport, RecoveryError> {
        let max = self.policy.max_total_retries;
        let tool_descriptions = step.state().tools().describe_all();
        let mut detector = LoopDetector::new(self.policy.max_consecutive_retries);
        let mut report = RecoveryReport::default();

        tracing::info!(
            step = step.name(),
            escalation_tool = step.state().tools().human_escalation_tool().unwrap_or("none"),
            "handling step failure"
        );

        while report.attempts < max {
            let attempt = report.attempts + 1;
            tracing::info!(step = step.name(), attempt, max, "recovery attempt");

            let history = step.render_history(true);
            self.dump(&history).await;

            report.advisory_calls += 1;
            let decision = self
                .advisor
                .advise(&AdvisoryRequest {
                    history,
                    tool_descriptions: tool_descriptions.clone(),
                })
                .await?;
            tracing::info!(analysis = %decision.analysis, "advisory analysis");

            let NextAction { tool_name, params } = decision.next_action;
            let Ok(tool) = step.state().tools().get(&tool_name) else {
                tracing::error!(tool = %tool_name, "advisor suggested unknown tool");
                return Err(RecoveryError::UnknownTool { tool: tool_name });
            };

            if tool.is_human_escalation() {
                report.attempts += 1;
                report.escalations += 1;
                if self.escalate(step, ctx, env, &tool_name, tool, &params).await? {
                    tracing::info!("human response received, asking for the next action");
                    detector.reset();
                }
                continue;
            }

            let fingerprint = ActionFingerprint::of(&tool_name, &params);
            let short = fingerprint.short().to_owned();
            if let LoopVerdict::Stuck { consecutive } = detector.observe(fingerprint) {
                tracing::warn!(
                    tool = %tool_name,
                    fingerprint = %short,
                    consecutive,
                    "stopping: same action attempted consecutively"
                );
                return Err(RecoveryError::StuckLoop {
                    tool: tool_name,
                    repeats: consecutive,
                });
            }

            tracing::info!(tool = %tool_name, fingerprint = %short, attempt, "executing recovery action");
            let header = format!("Recovery attempt {attempt}");
            step.state_mut()
                .invoke(&tool_name, &params, env, Some(&header))
                .await?;

            report.attempts += 1;
            if step.verify_success(ctx, env).await? {
                tracing::info!(attempts = report.attempts, "recovery successful");
                return Ok(report);
            }
        }

        tracing::warn!(max, "stopping: maximum total retries exceeded");
        Err(RecoveryError::BudgetExhausted {
            attempts: report.attempts,
        })
    }

    /// Ask the human; returns whether an answer arrived
    async fn escalate<E: Environment>(
        &self,
        step: &mut dyn Step<E>,
        ctx: &ScenarioContext,
        env: &mut E,
        tool_name: &str,
        tool: Arc<dyn Tool<E>>,
        params: &ToolParams,
    ) -> Result<bool, RecoveryError> {
        let fault = |source| RecoveryError::ToolFault {
            tool: tool_name.to_string(),
            source,
        };
        let missing = tool.spec().missing_required(params).join("`, `");
        if !missing.is_empty() {
            tracing::warn!(tool = tool_name, missing = %missing, "escalation without required parameters");
            let response = ToolResponse::failure(format!("missing required parameter `{missing}`"));
            step.state_mut()
                .record_execution(
                    tool_name,
                    params,
                    response,
                    Some(&*env),
                    Some("Requesting human clarification"),
                )
                .await;
            return Ok(false);
        }

        let question = params
            .get(PARAM_QUESTION)
            .and_then(Value::as_str)
            .unwrap_or_default();
        let asking = ToolResponse::ok()
            .with_meta("action", "asking_human")
            .with_narrative([format!("Asked human: \"{question}\"")]);
        step.state_mut()
            .record_execution(
                tool_name,
                params,
                asking,
                Some(&*env),
                Some("Requesting human clarification"),
            )
            .await;

        let scenario_id = ctx.scenario_id().to_string();
        let response = match self.escalation {
            Some(escalation) => {
                let ask = HumanQuestion::from_params(params).map_err(fault)?;
                let outcome = call_human(
                    escalation.broker.as_ref(),
                    &ask.question,
                    ask.options,
                    Some(&scenario_id),
                    escalation.timeout,
                )
                .await;
                escalation_response(outcome).map_err(fault)?
            }
            None => {
                let mut params = params.clone();
                params
                    .entry(PARAM_SCENARIO_ID)
                    .or_insert_with(|| Value::String(scenario_id.clone()));
                tool.execute(env, &params).await.map_err(fault)?
            }
        };

        let answered = response.success;
        if !answered {
            tracing::error!(
                error = response.error.as_deref().unwrap_or("unknown error"),
                "failed to get human response"
            );
        }
        step.state_mut()
            .record_execution(
                tool_name,
                params,
                response,
                Some(&*env),
                Some("Got human response"),
            )
            .await;
        Ok(answered)
    }

    async fn dump(&self, history: &str) {
        let Some(path) = self.dump_path else {
            return;
        };
        let result = async {
            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .await?;
            file.write_all(format!("{history}\n\n").as_bytes()).await?;
            file.flush().await
        }
        .await;

        if let Err(e) = result {
            tracing::warn!(path = %path.display(), error = %e, "cannot append execution history");
        }
    }
}

impl std::fmt::Debug for RecoveryProcedure<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecoveryProcedure")
            .field("policy", &self.policy)
            .field("escalation", &self.escalation)
            .field("dump_path", &self.dump_path)
            .finish_non_exhaustive()
    }
}
