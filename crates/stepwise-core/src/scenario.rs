//! Scenario contract
//!
//! A scenario knows how well it matches a command, how to turn the command
//! into parameters (delegating to an external parser), and which steps make
//! up its plan.

use crate::context::ParsedParams;
use crate::error::ScenarioError;
use crate::step::Step;
use async_trait::async_trait;
use stepwise_tools::Environment;

/// Ordered plan of a scenario run
pub type Plan<E> = Vec<Box<dyn Step<E>>>;

/// One end-to-end user-triggered task
#[async_trait]
pub trait Scenario<E: Environment>: Send + Sync {
    /// Scenario name used in logs and planner warnings
    fn name(&self) -> &str;

    /// How well the command matches this scenario, between 0 and 1
    fn classify_intent(&self, command: &str) -> f64;

    /// Turn the command into structured parameters
    ///
    /// # Errors
    /// `ScenarioError::Parse` or `ScenarioError::InvalidParameter` when the
    /// command cannot be understood
    async fn parse_command(&self, command: &str) -> Result<ParsedParams, ScenarioError>;

    /// Build the steps for a run
    ///
    /// # Errors
    /// `ScenarioError::Plan` when the parameters do not support a plan
    fn build_steps(&self, params: &ParsedParams) -> Result<Plan<E>, ScenarioError>;
}
