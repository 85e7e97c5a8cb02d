//! Error types for the scenario engine
//!
//! Provides error handling for:
//! - Step faults (tool lookup and unexpected tool failures)
//! - Recovery outcomes (unknown tool, stuck loop, exhausted budget)
//! - Advisory failures
//! - Scenario parsing and planning
//! - Status transitions and configuration

use crate::status::{ScenarioStatus, StepStatus};
use serde_json::{Map, Value};
use std::path::PathBuf;
use stepwise_tools::{RegistryError, ToolFault};

/// Unexpected failure inside a step
#[derive(Debug, thiserror::Error)]
pub enum StepFault {
    /// Tool lookup failed
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A tool raised a fault
    #[error("tool `{tool}` faulted: {source}")]
    Tool {
        /// Tool name
        tool: String,
        /// Underlying fault
        #[source]
        source: ToolFault,
    },

    /// The environment could not be inspected
    #[error("environment error: {0}")]
    Environment(String),
}

impl StepFault {
    /// Wrap a tool fault
    #[inline]
    #[must_use]
    pub fn tool(tool: impl Into<String>, source: ToolFault) -> Self {
        Self::Tool {
            tool: tool.into(),
            source,
        }
    }
}

/// Advisory process errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AdvisorError {
    /// Payload is not a decision
    #[error("unparseable advisory payload: {0}")]
    Unparseable(String),

    /// The advisory process has no action to offer
    #[error("no action available: {0}")]
    NoAction(String),

    /// The advisory process could not be reached
    #[error("advisor unavailable: {0}")]
    Unavailable(String),
}

/// Why a recovery attempt ended without success
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
    /// The advisory process named a tool the step does not have
    #[error("advisor suggested unknown tool `{tool}`")]
    UnknownTool {
        /// Suggested name
        tool: String,
    },

    /// The same action was suggested too many times in a row
    #[error("same action suggested {repeats} times consecutively: `{tool}`")]
    StuckLoop {
        /// Repeated tool
        tool: String,
        /// Consecutive suggestions, including the rejected one
        repeats: u32,
    },

    /// Retry budget consumed without verification passing
    #[error("maximum total retries ({attempts}) exceeded")]
    BudgetExhausted {
        /// Retry units consumed
        attempts: u32,
    },

    /// The advisory process failed
    #[error("advisory failed: {0}")]
    Advisory(#[from] AdvisorError),

    /// A recovery action faulted
    #[error("tool `{tool}` faulted during recovery: {source}")]
    ToolFault {
        /// Tool name
        tool: String,
        /// Underlying fault
        #[source]
        source: ToolFault,
    },

    /// The step itself faulted (lookup, verification)
    #[error("step fault during recovery: {0}")]
    Step(StepFault),
}

impl From<StepFault> for RecoveryError {
    fn from(fault: StepFault) -> Self {
        match fault {
            StepFault::Tool { tool, source } => Self::ToolFault { tool, source },
            other => Self::Step(other),
        }
    }
}

impl RecoveryError {
    /// Check if a collaborator faulted, as opposed to the policy giving up
    #[inline]
    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(
            self,
            Self::Advisory(_) | Self::ToolFault { .. } | Self::Step(_)
        )
    }

    /// Short classification used in diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownTool { .. } => "unknown_tool",
            Self::StuckLoop { .. } => "stuck_loop",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::Advisory(_) => "advisory",
            Self::ToolFault { .. } => "tool_fault",
            Self::Step(_) => "step_fault",
        }
    }
}

/// Scenario-level parsing and planning errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScenarioError {
    /// The command could not be parsed
    #[error("cannot parse command: {0}")]
    Parse(String),

    /// A parameter the scenario needs is missing or malformed
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason
        reason: String,
    },

    /// Steps could not be built
    #[error("cannot build plan: {0}")]
    Plan(String),
}

/// Illegal status change
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Not an edge of the scenario state machine
    #[error("illegal scenario transition {from} -> {to}")]
    Illegal {
        /// Current status
        from: ScenarioStatus,
        /// Requested status
        to: ScenarioStatus,
    },

    /// The cursor may only move past a completed step
    #[error("cannot advance past step {index}: step is {status}")]
    StepNotCompleted {
        /// Step index
        index: usize,
        /// Step status
        status: StepStatus,
    },
}

/// Scenario engine errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Command parsing failed
    #[error("command parsing failed: {0}")]
    Parse(#[source] ScenarioError),

    /// Plan building failed
    #[error("plan building failed: {0}")]
    Plan(#[source] ScenarioError),

    /// A step failed and could not be recovered
    #[error("step {step_index} ({step}) failed: {source}")]
    StepFailed {
        /// Index of the failed step
        step_index: usize,
        /// Step name
        step: String,
        /// Why recovery ended
        #[source]
        source: RecoveryError,
    },

    /// A step faulted during normal execution
    #[error("step {step_index} ({step}) faulted: {source}")]
    Fault {
        /// Index of the faulted step
        step_index: usize,
        /// Step name
        step: String,
        /// The fault
        #[source]
        source: StepFault,
    },

    /// Internal state machine violation
    #[error("state error: {0}")]
    Transition(#[from] TransitionError),

    /// The engine already ran a scenario
    #[error("engine already executed scenario {0}")]
    AlreadyStarted(uuid::Uuid),
}

impl EngineError {
    /// Check if a collaborator faulted
    #[inline]
    #[must_use]
    pub fn is_fault(&self) -> bool {
        match self {
            Self::StepFailed { source, .. } => source.is_fault(),
            Self::Fault { .. } | Self::Transition(_) => true,
            Self::Parse(_) | Self::Plan(_) | Self::AlreadyStarted(_) => false,
        }
    }

    /// Short classification used in diagnostics
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Parse(_) => "parse",
            Self::Plan(_) => "plan",
            Self::StepFailed { source, .. } => source.kind(),
            Self::Fault { .. } => "fault",
            Self::Transition(_) => "transition",
            Self::AlreadyStarted(_) => "already_started",
        }
    }

    /// Diagnostic payload stored in the scenario context
    #[must_use]
    pub fn diagnostic(&self) -> Map<String, Value> {
        let mut diagnostic = Map::new();
        diagnostic.insert("kind".into(), self.kind().into());
        diagnostic.insert("reason".into(), self.to_string().into());

        if let Self::StepFailed {
            step_index, step, ..
        }
        | Self::Fault {
            step_index, step, ..
        } = self
        {
            diagnostic.insert("step_index".into(), (*step_index).into());
            diagnostic.insert("step".into(), step.clone().into());
        }
        diagnostic
    }
}

/// Planner errors
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlannerError {
    /// Nothing to choose from
    #[error("no scenarios registered")]
    NoScenarios,

    /// Every scenario scored below the confidence threshold
    #[error("all scenarios returned low confidence scores (best: {best:.2})")]
    LowConfidence {
        /// Best score seen
        best: f64,
    },
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Io {
        /// Config path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// TOML could not be parsed
    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    /// TOML could not be produced
    #[error("cannot serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// Values out of range
    #[error("invalid config value: {0}")]
    Invalid(String),
}
