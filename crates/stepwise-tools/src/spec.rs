//! Declared tool capabilities
//!
//! A [`ToolSpec`] is what the advisory process sees of a tool, and what the
//! history formatter consults to decide which parameter values to redact.

use crate::response::ToolParams;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;

/// Declared parameter of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name
    pub name: String,
    /// Human/model readable description
    pub description: String,
    /// Whether the tool refuses to run without it
    pub required: bool,
    /// Whether the value must never be stored or rendered verbatim
    pub sensitive: bool,
}

impl ParamSpec {
    /// Required, non-sensitive parameter
    #[inline]
    #[must_use]
    pub fn required(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            required: true,
            sensitive: false,
        }
    }

    /// Optional, non-sensitive parameter
    #[inline]
    #[must_use]
    pub fn optional(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, description)
        }
    }

    /// Mark as sensitive
    #[inline]
    #[must_use]
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Declared capability of a tool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Human/model readable description of what the tool does
    pub description: String,
    /// Declared parameters
    pub params: Vec<ParamSpec>,
}

impl ToolSpec {
    /// Create spec with no parameters
    #[inline]
    #[must_use]
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            params: Vec::new(),
        }
    }

    /// Add a parameter
    #[inline]
    #[must_use]
    pub fn param(mut self, param: ParamSpec) -> Self {
        self.params.push(param);
        self
    }

    /// Names of parameters declared sensitive
    pub fn sensitive_params(&self) -> impl Iterator<Item = &str> {
        self.params
            .iter()
            .filter(|p| p.sensitive)
            .map(|p| p.name.as_str())
    }

    /// Required parameters absent (or `null`) in `params`
    #[must_use]
    pub fn missing_required<'a>(&'a self, params: &ToolParams) -> Vec<&'a str> {
        self.params
            .iter()
            .filter(|p| p.required && matches!(params.get(&p.name), None | Some(Value::Null)))
            .map(|p| p.name.as_str())
            .collect()
    }

    /// Check the spec is well-formed
    ///
    /// # Errors
    /// Returns the reason when the description is empty, or a parameter
    /// name is empty or duplicated.
    pub fn validate(&self) -> Result<(), String> {
        if self.description.trim().is_empty() {
            return Err("description is empty".to_string());
        }

        let mut seen = HashSet::new();
        for param in &self.params {
            if param.name.trim().is_empty() {
                return Err("parameter with empty name".to_string());
            }
            if !seen.insert(param.name.as_str()) {
                return Err(format!("duplicate parameter `{}`", param.name));
            }
        }
        Ok(())
    }

    /// Catalog text: description followed by the parameter list
    #[must_use]
    pub fn catalog_text(&self) -> String {
        let mut text = self.description.trim().to_string();
        if self.params.is_empty() {
            return text;
        }

        text.push_str("\n\nArgs:");
        for param in &self.params {
            let _ = write!(text, "\n- {}", param.name);
            if !param.required {
                text.push_str(" (optional)");
            }
            let _ = write!(text, ": {}", param.description);
        }
        text
    }
}
