//! Stepwise Core - scenario execution engine
//!
//! Runs a scenario as an ordered plan of verifiable steps and repairs failed
//! steps with an external advisor.
//!
//! # Overview
//!
//! - **Step / StepState**: a unit of work with its own tools and an
//!   append-only, redacted execution history
//! - **ScenarioEngine**: executes steps in order and drives the scenario
//!   status machine
//! - **RecoveryProcedure**: bounded advise, act, verify loop with
//!   fingerprint-based stuck-loop detection and human escalation
//! - **ScenarioPlanner**: picks a scenario for a command by intent score
//!
//! # Example
//!
//! ```rust,ignore
//! use stepwise_core::prelude::*;
//!
//! let mut engine = ScenarioEngine::new(scenario, env, advisor)
//!     .with_config(EngineConfig::from_env()?)
//!     .with_escalation(broker);
//!
//! let report = engine.execute("book a room for Friday").await?;
//! assert_eq!(report.status, ScenarioStatus::Completed);
//! ```

#![warn(unreachable_pub)]

pub mod advisor;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fingerprint;
pub mod planner;
pub mod record;
pub mod recovery;
pub mod scenario;
pub mod status;
pub mod step;

// Re-exports
pub use advisor::{Advisor, AdvisoryDecision, AdvisoryRequest, NextAction};
pub use config::{
    EngineConfig, EscalationConfig, HistoryConfig, LoggingConfig, ToolsConfig, CONFIG_ENV_VAR,
};
pub use context::{ParsedParams, ScenarioContext};
pub use engine::{ScenarioEngine, ScenarioReport};
pub use error::{
    AdvisorError, ConfigError, EngineError, PlannerError, RecoveryError, ScenarioError, StepFault,
    TransitionError,
};
pub use fingerprint::{canonical_json, ActionFingerprint};
pub use planner::{ScenarioPlanner, AMBIGUITY_MARGIN, MIN_CONFIDENCE};
pub use record::{
    redact, truncate_chars, EnvironmentSnapshot, ExecutionHistory, ExecutionRecord,
    DEFAULT_SNAPSHOT_MAX_CHARS,
};
pub use recovery::{
    Escalation, LoopDetector, LoopVerdict, RecoveryPolicy, RecoveryProcedure, RecoveryReport,
};
pub use scenario::{Plan, Scenario};
pub use status::{allowed_transitions, validate_transition, ScenarioStatus, StepStatus};
pub use step::{Step, StepState, DEFAULT_TOOL_TIMEOUT};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for writing scenarios and steps
    pub use crate::{
        Advisor, AdvisoryDecision, AdvisoryRequest, EngineConfig, EngineError, ParsedParams,
        Plan, RecoveryError, RecoveryPolicy, Scenario, ScenarioContext, ScenarioEngine,
        ScenarioError, ScenarioPlanner, ScenarioReport, ScenarioStatus, Step, StepFault,
        StepState, StepStatus,
    };
    pub use stepwise_tools::{
        Environment, ParamSpec, Tool, ToolFault, ToolParams, ToolRegistry, ToolResponse, ToolSpec,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
