//! Configuration module for the live validator.
//!
//! The validator is configured via a TOML file, with support for environment
//! variable interpolation using `${VAR_NAME}` syntax.
//!
//! # Example
//!
//! ```toml
//! [validator]
//! directory = "${SPEC_REPO}"
//! is_arm_call = true
//!
//! [observability.logging]
//! level = "debug"
//! format = "json"
//! ```

mod observability;
mod validator;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub use observability::*;
pub use validator::*;

static ENV_VAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").unwrap());

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiveValidatorConfig {
    /// Contract discovery and validation behaviour.
    #[serde(default)]
    pub validator: ValidatorConfig,

    /// Observability configuration (logging).
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl LiveValidatorConfig {
    /// Load configuration from a TOML file.
    ///
    /// Environment variables in the format `${VAR_NAME}` are expanded.
    /// Missing required variables will cause an error.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::Io(e, path.as_ref().to_path_buf()))?;

        Self::from_str(&contents)
    }

    /// Parse configuration from a TOML string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(contents)?;

        let config: LiveValidatorConfig = toml::from_str(&expanded).map_err(ConfigError::Parse)?;

        config.validate()?;

        Ok(config)
    }

    /// Validate the configuration for consistency and completeness.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validator.validate().map_err(ConfigError::Validation)?;
        Ok(())
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {1}: {0}")]
    Io(std::io::Error, std::path::PathBuf),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),

    #[error("Configuration validation error: {0}")]
    Validation(String),
}

/// Expand environment variables in the format `${VAR_NAME}`.
/// Skips commented lines (lines where content before the variable is a comment).
fn expand_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut result = String::with_capacity(input.len());

    for line in input.lines() {
        let comment_pos = line.find('#');

        let mut line_result = String::with_capacity(line.len());
        let mut last_end = 0;

        for cap in ENV_VAR.captures_iter(line) {
            let Some(whole) = cap.get(0) else {
                continue;
            };

            // Skip if this variable is inside a comment
            if let Some(pos) = comment_pos
                && whole.start() >= pos
            {
                continue;
            }

            line_result.push_str(&line[last_end..whole.start()]);

            let var_name = &cap[1];
            let value = std::env::var(var_name)
                .map_err(|_| ConfigError::EnvVarNotFound(var_name.to_string()))?;
            line_result.push_str(&value);

            last_end = whole.end();
        }

        line_result.push_str(&line[last_end..]);
        result.push_str(&line_result);
        result.push('\n');
    }

    // Remove trailing newline if input didn't have one
    if !input.ends_with('\n') && result.ends_with('\n') {
        result.pop();
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::validation::IssueCode;

    #[test]
    fn test_minimal_config() {
        let config = LiveValidatorConfig::from_str(
            r#"
            [validator]
            directory = "/specs"
        "#,
        )
        .unwrap();

        assert_eq!(config.validator.directory, PathBuf::from("/specs"));
        assert!(config.validator.load_validator_in_background);
        assert!(!config.validator.is_arm_call);
        assert_eq!(config.observability.logging.level, LogLevel::Info);
    }

    #[test]
    fn test_full_config() {
        let config = LiveValidatorConfig::from_str(
            r#"
            [validator]
            swagger_paths = ["a.json", "b.json"]
            is_arm_call = true
            is_path_case_sensitive = true
            load_validator_in_background = false
            model_implicit_default_response = true
            include_errors = ["INVALID_TYPE", "OBJECT_MISSING_REQUIRED_PROPERTY"]

            [observability.logging]
            level = "debug"
            format = "json"
            include_spans = false
        "#,
        )
        .unwrap();

        assert_eq!(config.validator.swagger_paths.len(), 2);
        assert!(config.validator.is_arm_call);
        assert_eq!(
            config.validator.include_errors,
            vec![IssueCode::InvalidType, IssueCode::ObjectMissingRequiredProperty]
        );
        assert_eq!(config.observability.logging.format, LogFormat::Json);
        assert!(!config.observability.logging.include_spans);
    }

    #[test]
    fn test_unknown_field_rejected() {
        let result = LiveValidatorConfig::from_str(
            r#"
            [validator]
            directroy = "/specs"
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_empty_discovery_rejected() {
        let result = LiveValidatorConfig::from_str(
            r#"
            [validator]
            swagger_paths_pattern = []
        "#,
        );
        assert!(matches!(result, Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_env_var_expansion() {
        temp_env::with_var("TEST_SPEC_DIR", Some("/srv/specs"), || {
            let result = expand_env_vars("directory = \"${TEST_SPEC_DIR}\"").unwrap();
            assert_eq!(result, "directory = \"/srv/specs\"");
        });
    }

    #[test]
    fn test_env_var_in_comment_ignored() {
        let result = expand_env_vars("# directory = \"${NONEXISTENT_VAR}\"").unwrap();
        assert_eq!(result, "# directory = \"${NONEXISTENT_VAR}\"");
    }

    #[test]
    fn test_env_var_after_comment_ignored() {
        let result = expand_env_vars("key = \"value\" # ${NONEXISTENT_VAR}").unwrap();
        assert_eq!(result, "key = \"value\" # ${NONEXISTENT_VAR}");
    }

    #[test]
    fn test_missing_env_var_is_an_error() {
        temp_env::with_var_unset("TEST_MISSING_SPEC_DIR", || {
            let result = expand_env_vars("directory = \"${TEST_MISSING_SPEC_DIR}\"");
            assert!(matches!(result, Err(ConfigError::EnvVarNotFound(name)) if name == "TEST_MISSING_SPEC_DIR"));
        });
    }

    #[test]
    fn test_trailing_newline_preserved() {
        assert_eq!(expand_env_vars("a = 1\n").unwrap(), "a = 1\n");
        assert_eq!(expand_env_vars("a = 1").unwrap(), "a = 1");
    }

    #[test]
    fn test_from_file_reports_path() {
        let err = LiveValidatorConfig::from_file("/nonexistent/live-validator.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/live-validator.toml"));
    }
}
