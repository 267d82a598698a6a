//! Pipeline configuration.
//!
//! # Example
//!
//! ```
//! use actionflow_runtime::config::PipelineConfig;
//! use std::time::Duration;
//!
//! let config = PipelineConfig::default()
//!     .with_async_timeout(Some(Duration::from_secs(10)))
//!     .with_validate_requests(false);
//!
//! assert_eq!(config.async_timeout, Some(Duration::from_secs(10)));
//! ```

use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the asynchronous timeout in milliseconds.
pub const ASYNC_TIMEOUT_ENV: &str = "ACTIONFLOW_ASYNC_TIMEOUT_MS";

/// Environment variable enabling or disabling request validation.
pub const VALIDATE_REQUESTS_ENV: &str = "ACTIONFLOW_VALIDATE_REQUESTS";

/// Default timeout applied to asynchronous actions that accept a cancellation token.
pub const DEFAULT_ASYNC_TIMEOUT: Duration = Duration::from_secs(45);

/// Configuration error
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A variable holds a value that cannot be parsed
    #[error("invalid value `{value}` for {variable}: {reason}")]
    InvalidValue {
        /// Variable name
        variable: String,
        /// Offending value
        value: String,
        /// What was expected
        reason: String,
    },
}

/// Settings shared by every invocation of an [`ActionInvoker`](crate::ActionInvoker).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timeout for asynchronous actions; `None` disables it
    pub async_timeout: Option<Duration>,
    /// Whether requests are validated before binding; ANDed with the controller's flag
    pub validate_requests: bool,
}

impl PipelineConfig {
    /// Create a configuration with custom values
    #[must_use]
    pub const fn new(async_timeout: Option<Duration>, validate_requests: bool) -> Self {
        Self {
            async_timeout,
            validate_requests,
        }
    }

    /// Set the asynchronous timeout
    #[must_use]
    pub const fn with_async_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.async_timeout = timeout;
        self
    }

    /// Enable or disable request validation
    #[must_use]
    pub const fn with_validate_requests(mut self, enabled: bool) -> Self {
        self.validate_requests = enabled;
        self
    }

    /// Load from the process environment, falling back to defaults.
    ///
    /// `ACTIONFLOW_ASYNC_TIMEOUT_MS` accepts milliseconds, or `none`, `-1`
    /// or `0` to disable the timeout. `ACTIONFLOW_VALIDATE_REQUESTS` accepts
    /// `true` or `false`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is malformed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] if a variable is malformed.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(raw) = lookup(ASYNC_TIMEOUT_ENV) {
            config.async_timeout = parse_timeout(&raw)?;
        }

        if let Some(raw) = lookup(VALIDATE_REQUESTS_ENV) {
            config.validate_requests = match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => true,
                "false" | "0" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        variable: VALIDATE_REQUESTS_ENV.to_string(),
                        value: raw,
                        reason: "expected `true` or `false`".to_string(),
                    });
                }
            };
        }

        Ok(config)
    }
}

fn parse_timeout(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("none") || trimmed == "-1" {
        return Ok(None);
    }

    let millis: u64 = trimmed.parse().map_err(|_| ConfigError::InvalidValue {
        variable: ASYNC_TIMEOUT_ENV.to_string(),
        value: raw.to_string(),
        reason: "expected milliseconds, `none` or `-1`".to_string(),
    })?;

    Ok((millis > 0).then(|| Duration::from_millis(millis)))
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            async_timeout: Some(DEFAULT_ASYNC_TIMEOUT),
            validate_requests: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = PipelineConfig::from_lookup(lookup(&[]));
        assert_eq!(config, Ok(PipelineConfig::default()));
    }

    #[test]
    fn timeout_is_read_in_milliseconds() {
        let config = PipelineConfig::from_lookup(lookup(&[(ASYNC_TIMEOUT_ENV, "1500")]));
        assert_eq!(
            config.map(|c| c.async_timeout),
            Ok(Some(Duration::from_millis(1500)))
        );
    }

    #[test]
    fn timeout_can_be_disabled() {
        for raw in ["none", "-1", "0", "NONE"] {
            let config = PipelineConfig::from_lookup(lookup(&[(ASYNC_TIMEOUT_ENV, raw)]));
            assert_eq!(config.map(|c| c.async_timeout), Ok(None), "value {raw}");
        }
    }

    #[test]
    fn malformed_values_are_rejected() {
        let timeout = PipelineConfig::from_lookup(lookup(&[(ASYNC_TIMEOUT_ENV, "soon")]));
        assert!(matches!(timeout, Err(ConfigError::InvalidValue { .. })));

        let validate = PipelineConfig::from_lookup(lookup(&[(VALIDATE_REQUESTS_ENV, "maybe")]));
        assert!(matches!(validate, Err(ConfigError::InvalidValue { variable, .. }) if variable == VALIDATE_REQUESTS_ENV));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let config: Result<PipelineConfig, _> =
            serde_json::from_str(r#"{"validate_requests": false}"#);
        let config = config.ok();
        assert_eq!(
            config,
            Some(PipelineConfig::default().with_validate_requests(false))
        );
    }
}
