//! Tool registry for scenario steps
//!
//! Provides [`ToolRegistry`], the per-step mapping from symbolic name to tool.
//! Steps register their fixed toolset once at construction; the recovery
//! procedure looks tools up by the names the advisory process suggests.

use crate::environment::Environment;
use crate::error::RegistryError;
use crate::tool::Tool;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::sync::Arc;

/// Registry of tools available to one step
///
/// Names are unique; registering an existing name replaces the previous
/// tool (last registration wins).
pub struct ToolRegistry<E: Environment> {
    tools: BTreeMap<String, Arc<dyn Tool<E>>>,
}

impl<E: Environment> ToolRegistry<E> {
    /// Create new empty registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool under a name
    ///
    /// # Errors
    /// - `RegistryError::InvalidToolKind` if the name is empty or the tool's
    ///   declared spec is malformed
    pub fn register(&mut self, name: &str, tool: Arc<dyn Tool<E>>) -> Result<(), RegistryError> {
        if name.trim().is_empty() {
            return Err(RegistryError::InvalidToolKind {
                name: name.to_string(),
                reason: "tool name is empty".to_string(),
            });
        }

        tool.spec()
            .validate()
            .map_err(|reason| RegistryError::InvalidToolKind {
                name: name.to_string(),
                reason,
            })?;

        if self.tools.insert(name.to_string(), tool).is_some() {
            tracing::debug!(tool = name, "replaced previously registered tool");
        }
        Ok(())
    }

    /// Builder-style registration
    ///
    /// # Errors
    /// Same as [`ToolRegistry::register`]
    pub fn with_tool(mut self, name: &str, tool: Arc<dyn Tool<E>>) -> Result<Self, RegistryError> {
        self.register(name, tool)?;
        Ok(self)
    }

    /// Get tool by name
    ///
    /// # Errors
    /// - `RegistryError::UnknownTool` if absent
    pub fn get(&self, name: &str) -> Result<Arc<dyn Tool<E>>, RegistryError> {
        self.tools
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownTool(name.to_string()))
    }

    /// Check if tool exists
    #[inline]
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Catalog of every tool's description, ordered by name
    #[must_use]
    pub fn describe_all(&self) -> BTreeMap<String, String> {
        self.tools
            .iter()
            .map(|(name, tool)| (name.clone(), tool.description()))
            .collect()
    }

    /// Parameter names the named tool declares sensitive
    ///
    /// Empty when the tool is unknown.
    #[must_use]
    pub fn sensitive_params(&self, name: &str) -> HashSet<String> {
        self.tools
            .get(name)
            .map(|tool| {
                tool.spec()
                    .sensitive_params()
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Name of the first registered human-escalation tool, if any
    #[must_use]
    pub fn human_escalation_tool(&self) -> Option<&str> {
        self.tools
            .iter()
            .find(|(_, tool)| tool.is_human_escalation())
            .map(|(name, _)| name.as_str())
    }

    /// List all registered tool names
    #[inline]
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    /// Get number of registered tools
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

impl<E: Environment> Default for ToolRegistry<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: Environment> Clone for ToolRegistry<E> {
    fn clone(&self) -> Self {
        Self {
            tools: self.tools.clone(),
        }
    }
}

impl<E: Environment> fmt::Debug for ToolRegistry<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}
