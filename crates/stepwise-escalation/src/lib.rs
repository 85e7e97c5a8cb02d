//! Stepwise Escalation - human-in-the-loop channel
//!
//! Lets a scenario pause for a human decision without blocking other
//! scenarios or the background task that talks to the operator:
//! - [`HumanRequest`] / [`HumanResponse`] wire messages correlated by `request_id`
//! - [`EscalationBroker`]: two append-only logs, requests read through
//!   competing-consumer groups, responses by re-scan
//! - [`InMemoryBroker`]: in-process broker with change notification
//! - [`call_human`] / [`CallHumanTool`]: ask and wait with a deadline
//! - [`RequestHandler`]: cancellable background consumer feeding a [`HumanOperator`]
//!
//! # Example
//!
//! ```rust,ignore
//! let broker = Arc::new(InMemoryBroker::new());
//! let cancel = CancellationToken::new();
//! let handler = RequestHandler::new(broker.clone(), Arc::new(TerminalOperator::stdio()?)).spawn(cancel.clone());
//!
//! let answer = call_human(broker.as_ref(), "Which room?", None, Some("run-1"), timeout).await?;
//!
//! cancel.cancel();
//! handler.await??;
//! ```

#![warn(unreachable_pub)]

pub mod broker;
pub mod call;
pub mod error;
pub mod handler;
pub mod memory;
pub mod message;

pub use broker::{ClaimedRequest, EntryId, EscalationBroker, DEFAULT_CONSUMER_GROUP};
pub use call::{
    call_human, escalation_response, CallHumanTool, HumanAnswer, HumanQuestion,
    DEFAULT_HUMAN_TIMEOUT, META_REQUEST_ID, PARAM_OPTIONS, PARAM_QUESTION, PARAM_SCENARIO_ID,
    TIMEOUT_MESSAGE,
};
pub use error::{BrokerError, EscalationError, OperatorError};
pub use handler::{resolve_choice, HandlerStats, HumanOperator, RequestHandler};
pub use memory::{BrokerStats, InMemoryBroker};
pub use message::{HumanRequest, HumanResponse};
pub use tokio_util::sync::CancellationToken;
