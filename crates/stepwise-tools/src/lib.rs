//! Stepwise Tools - the atomic capability layer
//!
//! Every action a scenario step (or the recovery procedure) can take is a
//! [`Tool`]:
//! - A uniform `execute(env, params) -> ToolResponse` contract
//! - A declared [`ToolSpec`] (description + parameters with sensitivity markers)
//! - A per-step [`ToolRegistry`] mapping symbolic names to tools
//!
//! Tools act on an [`Environment`], the external system a scenario run
//! owns exclusively (e.g. one browser session).
//!
//! # Example
//!
//! ```rust,ignore
//! use stepwise_tools::{ToolRegistry, ToolParams};
//!
//! let mut registry = ToolRegistry::new();
//! registry.register("ClickTool", Arc::new(ClickTool))?;
//!
//! let tool = registry.get("ClickTool")?;
//! let response = tool.execute(&mut env, &ToolParams::new()).await?;
//! ```

#![warn(unreachable_pub)]

pub mod environment;
pub mod error;
pub mod registry;
pub mod response;
pub mod spec;
pub mod tool;

pub use environment::Environment;
pub use error::{RegistryError, ToolFault};
pub use registry::ToolRegistry;
pub use response::{ToolParams, ToolResponse, META_NARRATIVE, META_URL};
pub use spec::{ParamSpec, ToolSpec};
pub use tool::{optional_str_list, require_str, Tool};

/// Placeholder rendered in place of sensitive parameter values
pub const REDACTED: &str = "[REDACTED]";

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
