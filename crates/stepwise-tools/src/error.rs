//! Error types for the tool layer
//!
//! Expected operational failures are NOT errors here: a tool reports them as
//! `ToolResponse { success: false, .. }`. These types cover:
//! - Unexpected tool faults
//! - Registry misuse (unknown names, malformed tool specs)

/// Unexpected failure while executing a tool
///
/// Never used for expected failure modes (element not found, page did not
/// load, ...); those are reported through [`crate::ToolResponse`].
#[derive(Debug, thiserror::Error)]
pub enum ToolFault {
    /// A required parameter was missing or had the wrong shape
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// The environment is unusable (closed session, lost connection)
    #[error("environment unavailable: {0}")]
    Environment(String),

    /// A collaborator behind the tool failed unexpectedly
    #[error("collaborator failed: {0}")]
    Collaborator(String),
}

impl ToolFault {
    /// Create an invalid parameter fault
    #[inline]
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Tool registry errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// No tool registered under this name
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    /// The value does not satisfy the tool contract
    #[error("invalid tool `{name}`: {reason}")]
    InvalidToolKind {
        /// Name the tool was registered under
        name: String,
        /// Which part of the contract is violated
        reason: String,
    },
}
