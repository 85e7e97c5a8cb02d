//! Uniform tool response shape

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Named tool parameters
pub type ToolParams = Map<String, Value>;

/// Meta key holding the address reached by a tool
pub const META_URL: &str = "url";

/// Meta key holding a list of human-readable trace lines
pub const META_NARRATIVE: &str = "narrative";

/// Standardized result of a tool invocation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolResponse {
    /// Whether the operation succeeded
    pub success: bool,
    /// Error message when the operation failed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution metadata; only `url` and `narrative` carry meaning
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl ToolResponse {
    /// Successful response with no metadata
    #[inline]
    #[must_use]
    pub fn ok() -> Self {
        Self {
            success: true,
            error: None,
            meta: Map::new(),
        }
    }

    /// Failed response carrying an error message
    #[inline]
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(error.into()),
            meta: Map::new(),
        }
    }

    /// Add a meta entry
    #[inline]
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }

    /// Set the reached address
    #[inline]
    #[must_use]
    pub fn with_url(self, url: impl Into<String>) -> Self {
        self.with_meta(META_URL, url.into())
    }

    /// Set the narrative trace
    #[must_use]
    pub fn with_narrative<I, S>(self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines: Vec<Value> = lines.into_iter().map(|l| Value::String(l.into())).collect();
        self.with_meta(META_NARRATIVE, lines)
    }

    /// Reached address, if reported
    #[inline]
    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.meta.get(META_URL).and_then(Value::as_str)
    }

    /// Narrative lines, if reported
    #[must_use]
    pub fn narrative(&self) -> Vec<String> {
        self.meta
            .get(META_NARRATIVE)
            .and_then(Value::as_array)
            .map(|lines| {
                lines
                    .iter()
                    .map(|l| match l {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn ok_and_failure() {
        assert!(ToolResponse::ok().success);

        let failed = ToolResponse::failure("element not found");
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("element not found"));
    }

    #[test]
    fn reserved_meta_accessors() {
        let response = ToolResponse::ok()
            .with_url("https://example.org/login")
            .with_narrative(["opened page", "clicked login"]);

        assert_eq!(response.url(), Some("https://example.org/login"));
        assert_eq!(response.narrative(), vec!["opened page", "clicked login"]);
    }

    #[test]
    fn narrative_missing_is_empty() {
        assert!(ToolResponse::ok().narrative().is_empty());
    }

    #[test]
    fn deserializes_without_optional_fields() {
        let response: ToolResponse = serde_json::from_value(json!({"success": true})).unwrap();
        assert!(response.success);
        assert!(response.meta.is_empty());
    }
}
