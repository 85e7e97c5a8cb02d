//! Asking the human
//!
//! [`call_human`] publishes a request and waits for the correlated answer;
//! [`CallHumanTool`] exposes the same operation through the tool contract so
//! the advisory process can pick it like any other action.

use crate::broker::EscalationBroker;
use crate::error::EscalationError;
use crate::message::HumanRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use stepwise_tools::{
    optional_str_list, require_str, Environment, ParamSpec, Tool, ToolFault, ToolParams,
    ToolResponse, ToolSpec,
};
use uuid::Uuid;

/// Default wait for a human answer
pub const DEFAULT_HUMAN_TIMEOUT: Duration = Duration::from_secs(300);

/// Parameter carrying the question
pub const PARAM_QUESTION: &str = "question_to_human";

/// Parameter carrying the answer options
pub const PARAM_OPTIONS: &str = "options";

/// Parameter carrying the asking scenario
pub const PARAM_SCENARIO_ID: &str = "scenario_id";

/// Meta key holding the request id of an escalation
pub const META_REQUEST_ID: &str = "request_id";

/// Error text of an unanswered escalation
pub const TIMEOUT_MESSAGE: &str = "Timeout waiting for human response";

/// Answer to an escalation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanAnswer {
    /// Request that was answered
    pub request_id: Uuid,
    /// Answer text
    pub response: String,
}

impl HumanAnswer {
    /// Trace line recorded in the step history
    #[must_use]
    pub fn narrative(&self) -> String {
        format!("Human answered: \"{}\"", self.response)
    }
}

/// Publish a question and wait for its answer
///
/// # Errors
/// - `EscalationError::Timeout` when no answer with the request's id arrives
///   within `timeout`
/// - `EscalationError::Broker` when the broker fails
pub async fn call_human(
    broker: &dyn EscalationBroker,
    question: &str,
    options: Option<Vec<String>>,
    scenario_id: Option<&str>,
    timeout: Duration,
) -> Result<HumanAnswer, EscalationError> {
    let mut request = HumanRequest::new(question).with_options(options);
    if let Some(scenario_id) = scenario_id {
        request = request.with_scenario(scenario_id);
    }
    let request_id = request.request_id;

    broker.publish_request(&request).await?;
    tracing::info!(%request_id, "waiting for human response");

    match broker.await_response(request_id, timeout).await? {
        Some(answer) => {
            tracing::info!(%request_id, response = %answer.response, "got human response");
            Ok(HumanAnswer {
                request_id,
                response: answer.response,
            })
        }
        None => {
            tracing::error!(%request_id, question, "timeout waiting for human response");
            Err(EscalationError::Timeout {
                request_id,
                waited: timeout,
            })
        }
    }
}

/// Escalation arguments as chosen by the advisory process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HumanQuestion {
    /// Question text
    pub question: String,
    /// Valid answers, if restricted
    pub options: Option<Vec<String>>,
    /// Asking scenario, if given
    pub scenario_id: Option<String>,
}

impl HumanQuestion {
    /// Extract from tool parameters
    ///
    /// # Errors
    /// `ToolFault::InvalidParameter` when the question is missing or a
    /// parameter has the wrong shape
    pub fn from_params(params: &ToolParams) -> Result<Self, ToolFault> {
        let question = require_str(params, PARAM_QUESTION)?.to_string();
        let options = optional_str_list(params, PARAM_OPTIONS)?;
        let scenario_id = match params.get(PARAM_SCENARIO_ID) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(_) => {
                return Err(ToolFault::invalid_parameter(
                    PARAM_SCENARIO_ID,
                    "must be a string",
                ))
            }
        };

        Ok(Self {
            question,
            options,
            scenario_id,
        })
    }
}

/// Shape an escalation outcome as a tool response
///
/// A timeout is an expected failure; a broker failure is a fault.
///
/// # Errors
/// `ToolFault::Collaborator` when the broker failed
pub fn escalation_response(
    outcome: Result<HumanAnswer, EscalationError>,
) -> Result<ToolResponse, ToolFault> {
    match outcome {
        Ok(answer) => Ok(ToolResponse::ok()
            .with_meta(META_REQUEST_ID, answer.request_id.to_string())
            .with_narrative([answer.narrative()])),
        Err(EscalationError::Timeout { request_id, .. }) => Ok(ToolResponse::failure(
            TIMEOUT_MESSAGE,
        )
        .with_meta(META_REQUEST_ID, request_id.to_string())),
        Err(e @ EscalationError::Broker(_)) => Err(ToolFault::Collaborator(format!(
            "failed to get human response: {e}"
        ))),
    }
}

/// Tool delegating a decision to the human operator
#[derive(Clone)]
pub struct CallHumanTool {
    broker: Arc<dyn EscalationBroker>,
    timeout: Duration,
}

impl CallHumanTool {
    /// Create tool waiting [`DEFAULT_HUMAN_TIMEOUT`] for answers
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

impl std::fmt::Debug for CallHumanTool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallHumanTool")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<E: Environment> Tool<E> for CallHumanTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec::new(
            "Request human assistance with decisions or clarifications.\n\
             Use this tool when:\n\
             - Uncertain about correct action\n\
             - Need approval for critical steps\n\
             - Multiple valid options exist\n\
             - Unexpected errors without clear resolution\n\
             - Additional context/information needed",
        )
        .param(ParamSpec::required(
            PARAM_QUESTION,
            "Specific question for human to answer, give a little context",
        ))
        .param(ParamSpec::optional(
            PARAM_OPTIONS,
            "List of possible choices if applicable or None",
        ))
    }

    fn is_human_escalation(&self) -> bool {
        true
    }

    async fn execute(&self, _env: &mut E, params: &ToolParams) -> Result<ToolResponse, ToolFault> {
        let ask = HumanQuestion::from_params(params)?;
        let outcome = call_human(
            self.broker.as_ref(),
            &ask.question,
            ask.options,
            ask.scenario_id.as_deref(),
            self.timeout,
        )
        .await;
        escalation_response(outcome)
    }
}
