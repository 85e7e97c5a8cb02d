//! Execution records and the history trace
//!
//! Every tool invocation of a step becomes an immutable [`ExecutionRecord`].
//! The rendered [`ExecutionHistory`] is the evidence handed verbatim to the
//! advisory process, so its format is stable:
//!
//! ```text
//! Step Status: failed
//! Total executions: 2
//! Success rate: 50.0%
//!
//! Execution Records:
//!
//! --- Sub-command #1 ---
//! Open login page: SUCCESS
//! Tool: NavigateTool
//! ...
//! ```

use crate::status::StepStatus;
use chrono::{DateTime, Local};
use serde::Serialize;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt::Write as _;
use stepwise_tools::{ToolParams, ToolResponse, REDACTED};

/// Default bound on the captured state description
pub const DEFAULT_SNAPSHOT_MAX_CHARS: usize = 1000;

/// Concise external state captured when a tool fails
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentSnapshot {
    /// Locator of the state (e.g. page URL)
    pub address: String,
    /// Headline text of the state
    pub description: String,
}

impl EnvironmentSnapshot {
    /// Create snapshot, bounding the description to `max_chars`
    #[must_use]
    pub fn new(address: impl Into<String>, description: &str, max_chars: usize) -> Self {
        Self {
            address: address.into(),
            description: truncate_chars(description, max_chars),
        }
    }
}

/// One tool invocation within a step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionRecord {
    /// When the invocation finished
    pub timestamp: DateTime<Local>,
    /// Registry name of the tool
    pub tool_name: String,
    /// Parameters, sensitive values already replaced
    pub tool_params: ToolParams,
    /// Outcome
    pub response: ToolResponse,
    /// Short label of what the invocation was for
    pub header_summary: Option<String>,
    /// External state at failure time
    pub environment_snapshot: Option<EnvironmentSnapshot>,
}

impl ExecutionRecord {
    /// Render as a trace block
    #[must_use]
    pub fn render(&self) -> String {
        let status = if self.response.success {
            "SUCCESS"
        } else {
            "FAILURE"
        };
        let header = match &self.header_summary {
            Some(summary) => format!("{summary}: {status}"),
            None => status.to_string(),
        };
        let params = serde_json::to_string(&self.tool_params).unwrap_or_else(|_| "{}".to_string());

        let mut sections = vec![format!(
            "{header}\nTool: {}\nTime: {}\nParameters: {params}",
            self.tool_name,
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
        )];

        let narrative = self.response.narrative();
        let mut details = Vec::new();
        if self.response.success {
            if let Some(url) = self.response.url() {
                details.push(format!("URL: {url}"));
            }
            if let Some(last) = narrative.last() {
                details.push(format!("How it ended: {last}"));
            }
        } else {
            details.push(format!(
                "Error: {}",
                self.response.error.as_deref().unwrap_or("unknown error")
            ));
            if !narrative.is_empty() {
                details.push("Execution steps:".to_string());
                details.extend(narrative.iter().map(|line| format!("  - {line}")));
            }
            if let Some(snapshot) = &self.environment_snapshot {
                details.push("State at failure:".to_string());
                details.push(format!("  - env_address: {}", snapshot.address));
                details.push(format!("  - env_state: {}", snapshot.description));
            }
        }

        if !details.is_empty() {
            sections.push(details.join("\n"));
        }
        sections.join("\n\n")
    }
}

/// Append-only sequence of records of one step
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ExecutionHistory {
    records: Vec<ExecutionRecord>,
}

impl ExecutionHistory {
    /// Create empty history
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, record: ExecutionRecord) {
        self.records.push(record);
    }

    /// Records in append order
    #[inline]
    #[must_use]
    pub fn records(&self) -> &[ExecutionRecord] {
        &self.records
    }

    /// Number of records
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Most recent record
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&ExecutionRecord> {
        self.records.last()
    }

    /// Number of successful records
    #[must_use]
    pub fn success_count(&self) -> usize {
        self.records.iter().filter(|r| r.response.success).count()
    }

    /// Render the trace
    ///
    /// Failed records are always included; successful ones only when
    /// `include_successful` is set. Sub-command numbers are positions in the
    /// full history.
    #[must_use]
    pub fn render(&self, status: StepStatus, include_successful: bool) -> String {
        if self.records.is_empty() {
            return "No execution history available.".to_string();
        }

        let total = self.records.len();
        #[allow(clippy::cast_precision_loss)]
        let rate = self.success_count() as f64 / total as f64 * 100.0;

        let mut text = String::new();
        let _ = writeln!(text, "Step Status: {status}");
        let _ = writeln!(text, "Total executions: {total}");
        let _ = writeln!(text, "Success rate: {rate:.1}%");
        text.push_str("\nExecution Records:");

        for (index, record) in self.records.iter().enumerate() {
            if record.response.success && !include_successful {
                continue;
            }
            let _ = write!(text, "\n\n--- Sub-command #{} ---\n{}", index + 1, record.render());
        }
        text
    }
}

/// Replace the values of sensitive parameters
#[must_use]
pub fn redact(params: &ToolParams, sensitive: &HashSet<String>) -> ToolParams {
    params
        .iter()
        .map(|(key, value)| {
            let value = if sensitive.contains(key) {
                Value::String(REDACTED.to_string())
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

/// Keep at most `max_chars` characters, marking the cut
#[must_use]
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn at() -> DateTime<Local> {
        Local.with_ymd_and_hms(2026, 10, 18, 9, 30, 0).unwrap()
    }

    fn record(success: bool) -> ExecutionRecord {
        let response = if success {
            ToolResponse::ok()
                .with_url("https://hotel.example/booking")
                .with_narrative(["opened form", "submitted form"])
        } else {
            ToolResponse::failure("button not found").with_narrative(["looked for #submit"])
        };
        ExecutionRecord {
            timestamp: at(),
            tool_name: "ClickTool".to_string(),
            tool_params: json!({"selector": "#submit"}).as_object().cloned().unwrap(),
            response,
            header_summary: Some("Submit form".to_string()),
            environment_snapshot: (!success).then(|| {
                EnvironmentSnapshot::new("https://hotel.example/booking", "Booking form", 100)
            }),
        }
    }

    #[test]
    fn success_record_format() {
        assert_eq!(
            record(true).render(),
            "Submit form: SUCCESS\n\
             Tool: ClickTool\n\
             Time: 2026-10-18 09:30:00\n\
             Parameters: {\"selector\":\"#submit\"}\n\
             \n\
             URL: https://hotel.example/booking\n\
             How it ended: submitted form"
        );
    }

    #[test]
    fn failure_record_format() {
        assert_eq!(
            record(false).render(),
            "Submit form: FAILURE\n\
             Tool: ClickTool\n\
             Time: 2026-10-18 09:30:00\n\
             Parameters: {\"selector\":\"#submit\"}\n\
             \n\
             Error: button not found\n\
             Execution steps:\n  \
             - looked for #submit\n\
             State at failure:\n  \
             - env_address: https://hotel.example/booking\n  \
             - env_state: Booking form"
        );
    }

    #[test]
    fn empty_history() {
        assert_eq!(
            ExecutionHistory::new().render(StepStatus::InProgress, true),
            "No execution history available."
        );
    }

    #[test]
    fn history_header_and_filtering() {
        let mut history = ExecutionHistory::new();
        history.push(record(true));
        history.push(record(false));

        let full = history.render(StepStatus::Failed, true);
        assert!(full.starts_with(
            "Step Status: failed\nTotal executions: 2\nSuccess rate: 50.0%\n\nExecution Records:"
        ));
        assert!(full.contains("--- Sub-command #1 ---"));
        assert!(full.contains("--- Sub-command #2 ---"));

        let failures = history.render(StepStatus::Failed, false);
        assert!(!failures.contains("--- Sub-command #1 ---"));
        assert!(failures.contains("--- Sub-command #2 ---\nSubmit form: FAILURE"));
    }

    #[test]
    fn redaction_uses_declared_names() {
        let params = json!({"username": "ann", "password": "hunter2"})
            .as_object()
            .cloned()
            .unwrap();
        let sensitive: HashSet<String> = ["password".to_string()].into();

        let redacted = redact(&params, &sensitive);
        assert_eq!(redacted["username"], "ann");
        assert_eq!(redacted["password"], REDACTED);
    }

    #[test]
    fn truncation_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo world", 5), "héllo...");
        assert_eq!(truncate_chars("short", 10), "short");
    }
}
