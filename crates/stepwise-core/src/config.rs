//! Engine configuration
//!
//! Loaded from TOML; every section and key is optional:
//!
//! ```toml
//! [recovery]
//! max_total_retries = 12
//! max_consecutive_retries = 3
//!
//! [escalation]
//! timeout_secs = 300
//! consumer_group = "agent_group"
//!
//! [tools]
//! timeout_secs = 60
//!
//! [history]
//! snapshot_max_chars = 1000
//! dump_path = "execution_history.txt"
//!
//! [logging]
//! level = "info"
//! ```

use crate::error::ConfigError;
use crate::record::DEFAULT_SNAPSHOT_MAX_CHARS;
use crate::recovery::RecoveryPolicy;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use stepwise_escalation::{DEFAULT_CONSUMER_GROUP, DEFAULT_HUMAN_TIMEOUT};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "STEPWISE_CONFIG";

/// Human escalation settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    /// Wait for a human answer, in seconds
    pub timeout_secs: u64,
    /// Consumer group of request handlers
    pub consumer_group: String,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_HUMAN_TIMEOUT.as_secs(),
            consumer_group: DEFAULT_CONSUMER_GROUP.to_string(),
        }
    }
}

/// Tool invocation settings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Bound on one tool invocation, in seconds
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self { timeout_secs: 60 }
    }
}

/// Execution history settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Bound on the captured state description
    pub snapshot_max_chars: usize,
    /// File every rendered recovery history is appended to
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dump_path: Option<PathBuf>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            snapshot_max_chars: DEFAULT_SNAPSHOT_MAX_CHARS,
            dump_path: None,
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Engine configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Retry limits
    pub recovery: RecoveryPolicy,
    /// Human escalation
    pub escalation: EscalationConfig,
    /// Tool invocations
    pub tools: ToolsConfig,
    /// Execution history
    pub history: HistoryConfig,
    /// Logging
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate TOML text
    ///
    /// # Errors
    /// `ConfigError::Parse` or `ConfigError::Invalid`
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    ///
    /// # Errors
    /// `ConfigError::Io`, `ConfigError::Parse` or `ConfigError::Invalid`
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from the file named by `STEPWISE_CONFIG`, defaults when unset
    ///
    /// # Errors
    /// As [`EngineConfig::load`]
    pub fn from_env() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) if !path.is_empty() => Self::load(PathBuf::from(path)),
            _ => Ok(Self::default()),
        }
    }

    /// Render as TOML
    ///
    /// # Errors
    /// `ConfigError::Serialize`
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Check value ranges
    ///
    /// # Errors
    /// `ConfigError::Invalid` naming the first offending key
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |key: &str, rule: &str| Err(ConfigError::Invalid(format!("{key} {rule}")));

        if self.recovery.max_total_retries == 0 {
            return invalid("recovery.max_total_retries", "must be at least 1");
        }
        if self.recovery.max_consecutive_retries == 0 {
            return invalid("recovery.max_consecutive_retries", "must be at least 1");
        }
        if self.escalation.timeout_secs == 0 {
            return invalid("escalation.timeout_secs", "must be positive");
        }
        if self.escalation.consumer_group.trim().is_empty() {
            return invalid("escalation.consumer_group", "must not be empty");
        }
        if self.tools.timeout_secs == 0 {
            return invalid("tools.timeout_secs", "must be positive");
        }
        if self.history.snapshot_max_chars == 0 {
            return invalid("history.snapshot_max_chars", "must be positive");
        }
        Ok(())
    }

    /// With retry limits
    #[inline]
    #[must_use]
    pub fn with_recovery_policy(mut self, policy: RecoveryPolicy) -> Self {
        self.recovery = policy;
        self
    }

    /// With human answer timeout
    #[inline]
    #[must_use]
    pub fn with_escalation_timeout(mut self, timeout: Duration) -> Self {
        self.escalation.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With tool timeout
    #[inline]
    #[must_use]
    pub fn with_tool_timeout(mut self, timeout: Duration) -> Self {
        self.tools.timeout_secs = timeout.as_secs().max(1);
        self
    }

    /// With history dump file
    #[inline]
    #[must_use]
    pub fn with_dump_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.history.dump_path = Some(path.into());
        self
    }

    /// Human answer timeout
    #[inline]
    #[must_use]
    pub fn escalation_timeout(&self) -> Duration {
        Duration::from_secs(self.escalation.timeout_secs)
    }

    /// Tool timeout
    #[inline]
    #[must_use]
    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tools.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_policy_constants() {
        let config = EngineConfig::new();
        assert_eq!(config.recovery.max_total_retries, 12);
        assert_eq!(config.recovery.max_consecutive_retries, 3);
        assert_eq!(config.escalation_timeout(), Duration::from_secs(300));
        assert_eq!(config.escalation.consumer_group, "agent_group");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = EngineConfig::from_toml_str(
            "[recovery]\nmax_total_retries = 6\n\n[history]\ndump_path = \"history.txt\"\n",
        )
        .unwrap();

        assert_eq!(config.recovery.max_total_retries, 6);
        assert_eq!(config.recovery.max_consecutive_retries, 3);
        assert_eq!(config.history.dump_path, Some(PathBuf::from("history.txt")));
        assert_eq!(config.tools.timeout_secs, 60);
    }

    #[test]
    fn rejects_zero_budget() {
        let err = EngineConfig::from_toml_str("[recovery]\nmax_total_retries = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(ref msg) if msg.contains("max_total_retries")));
    }

    #[test]
    fn rejects_unknown_types() {
        assert!(matches!(
            EngineConfig::from_toml_str("[tools]\ntimeout_secs = \"soon\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[escalation]\ntimeout_secs = 5").unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.escalation_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = EngineConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn toml_output_parses_back() {
        let config = EngineConfig::new().with_dump_path("h.txt");
        let text = config.to_toml_string().unwrap();
        assert_eq!(EngineConfig::from_toml_str(&text).unwrap(), config);
    }
}
