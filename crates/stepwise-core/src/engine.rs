//! Scenario engine
//!
//! Drives one scenario run:
//! 1. Parse the command and build the plan
//! 2. Execute steps strictly in order
//! 3. On a failed step, run the recovery procedure; on success mark the step
//!    completed and move on, otherwise fail the scenario
//! 4. Any fault fails the scenario without retry

use crate::advisor::Advisor;
use crate::config::EngineConfig;
use crate::context::ScenarioContext;
use crate::error::EngineError;
use crate::recovery::{Escalation, RecoveryProcedure};
use crate::scenario::{Plan, Scenario};
use crate::status::{ScenarioStatus, StepStatus};
use serde::Serialize;
use std::sync::Arc;
use stepwise_escalation::EscalationBroker;
use stepwise_tools::Environment;
use tracing::Instrument;
use uuid::Uuid;

/// Outcome of a completed scenario run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScenarioReport {
    /// Run identifier
    pub scenario_id: Uuid,
    /// Final status
    pub status: ScenarioStatus,
    /// Steps that reached `Completed`
    pub steps_completed: usize,
    /// Steps that needed recovery
    pub recoveries: usize,
}

/// Supervised execution of one scenario run
///
/// Owns the run's environment exclusively; concurrent runs each get their
/// own engine and environment.
pub struct ScenarioEngine<E: Environment> {
    scenario: Arc<dyn Scenario<E>>,
    env: E,
    advisor: Arc<dyn Advisor>,
    config: EngineConfig,
    escalation: Option<Escalation>,
    context: Option<ScenarioContext>,
    steps: Plan<E>,
}

impl<E: Environment> ScenarioEngine<E> {
    /// Create engine with default configuration
    #[must_use]
    pub fn new(scenario: Arc<dyn Scenario<E>>, env: E, advisor: Arc<dyn Advisor>) -> Self {
        Self {
            scenario,
            env,
            advisor,
            config: EngineConfig::default(),
            escalation: None,
            context: None,
            steps: Vec::new(),
        }
    }

    /// With configuration
    #[must_use]
    pub fn with_config(mut self, config: EngineConfig) -> Self {
        if let Some(escalation) = self.escalation.take() {
            self.escalation = Some(escalation.with_timeout(config.escalation_timeout()));
        }
        self.config = config;
        self
    }

    /// Route human escalations through `broker`
    ///
    /// Without a broker, escalation tools are executed like any other tool.
    #[must_use]
    pub fn with_escalation(mut self, broker: Arc<dyn EscalationBroker>) -> Self {
        self.escalation =
            Some(Escalation::new(broker).with_timeout(self.config.escalation_timeout()));
        self
    }

    /// Context of the run, once started
    #[inline]
    #[must_use]
    pub fn context(&self) -> Option<&ScenarioContext> {
        self.context.as_ref()
    }

    /// Planned steps, once built
    #[inline]
    #[must_use]
    pub fn steps(&self) -> &Plan<E> {
        &self.steps
    }

    /// The run's environment
    #[inline]
    #[must_use]
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Give back the environment
    #[must_use]
    pub fn into_env(self) -> E {
        self.env
    }

    /// Run the scenario for `command`
    ///
    /// # Errors
    /// - `Parse` / `Plan` when the command cannot be turned into steps
    /// - `StepFailed` when a step failed and recovery gave up
    /// - `Fault` when a step faulted
    /// - `AlreadyStarted` when called twice on the same engine
    pub async fn execute(&mut self, command: &str) -> Result<ScenarioReport, EngineError> {
        if let Some(ctx) = &self.context {
            return Err(EngineError::AlreadyStarted(ctx.scenario_id()));
        }

        let params = match self.scenario.parse_command(command).await {
            Ok(params) => params,
            Err(e) => {
                let err = EngineError::Parse(e);
                let mut ctx = ScenarioContext::new(command, Default::default());
                ctx.fail(err.diagnostic())?;
                tracing::error!(scenario = self.scenario.name(), error = %err, "cannot start scenario");
                self.context = Some(ctx);
                return Err(err);
            }
        };

        let mut ctx = ScenarioContext::new(command, params);
        let span = tracing::info_span!(
            "scenario",
            scenario = self.scenario.name(),
            scenario_id = %ctx.scenario_id()
        );
        tracing::info!(parent: &span, command, "starting scenario");

        let result = self.run(&mut ctx).instrument(span.clone()).await;
        let result = match result {
            Ok(recoveries) => {
                ctx.transition(ScenarioStatus::Completed)?;
                tracing::info!(parent: &span, steps = self.steps.len(), recoveries, "scenario completed");
                Ok(ScenarioReport {
                    scenario_id: ctx.scenario_id(),
                    status: ctx.status(),
                    steps_completed: ctx.current_step_index(),
                    recoveries,
                })
            }
            Err(err) => {
                tracing::error!(parent: &span, error = %err, "scenario failed");
                ctx.fail(err.diagnostic())?;
                Err(err)
            }
        };

        self.context = Some(ctx);
        result
    }

    /// Plan and execute every step; returns the number of recoveries
    async fn run(&mut self, ctx: &mut ScenarioContext) -> Result<usize, EngineError> {
        self.steps = self
            .scenario
            .build_steps(ctx.parsed_params())
            .map_err(EngineError::Plan)?;
        let tool_timeout = self.config.tool_timeout();
        for step in &mut self.steps {
            step.state_mut()
                .configure(tool_timeout, self.config.history.snapshot_max_chars);
        }
        ctx.transition(ScenarioStatus::InProgress)?;
        tracing::info!(steps = self.steps.len(), "plan built");

        let recovery = RecoveryProcedure::new(self.advisor.as_ref(), self.config.recovery)
            .with_escalation(self.escalation.as_ref())
            .with_dump_path(self.config.history.dump_path.as_deref());
        let mut recoveries = 0;

        while ctx.current_step_index() < self.steps.len() {
            let index = ctx.current_step_index();
            let step = &mut self.steps[index];
            let name = step.name().to_string();
            tracing::info!(step_index = index, step = %name, "executing step");

            step.state_mut().set_status(StepStatus::InProgress);
            let succeeded = match step.execute(ctx, &mut self.env).await {
                Ok(succeeded) => succeeded,
                Err(source) => {
                    step.state_mut().set_status(StepStatus::Failed);
                    return Err(EngineError::Fault {
                        step_index: index,
                        step: name,
                        source,
                    });
                }
            };

            if succeeded {
                step.state_mut().set_status(StepStatus::Completed);
                ctx.advance(step.status())?;
                continue;
            }

            tracing::warn!(step_index = index, step = %name, "step failed, starting recovery");
            step.state_mut().set_status(StepStatus::Failed);
            ctx.transition(ScenarioStatus::WaitingForClarification)?;

            step.state_mut().set_status(StepStatus::Retrying);
            match recovery.run(&mut **step, ctx, &mut self.env).await {
                Ok(report) => {
                    tracing::info!(
                        step_index = index,
                        attempts = report.attempts,
                        advisory_calls = report.advisory_calls,
                        "recovery successful"
                    );
                    step.state_mut().set_status(StepStatus::Completed);
                    ctx.transition(ScenarioStatus::InProgress)?;
                    ctx.advance(step.status())?;
                    recoveries += 1;
                }
                Err(source) => {
                    tracing::error!(
                        step_index = index,
                        step = %name,
                        error = %source,
                        "step failed and recovery unsuccessful"
                    );
                    step.state_mut().set_status(StepStatus::Failed);
                    return Err(EngineError::StepFailed {
                        step_index: index,
                        step: name,
                        source,
                    });
                }
            }
        }

        Ok(recoveries)
    }
}

impl<E: Environment> std::fmt::Debug for ScenarioEngine<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEngine")
            .field("scenario", &self.scenario.name())
            .field("config", &self.config)
            .field("escalation", &self.escalation)
            .field("context", &self.context)
            .field("steps", &self.steps.len())
            .finish_non_exhaustive()
    }
}
