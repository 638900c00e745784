use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::validation::IssueCode;

/// Contract discovery and validation behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidatorConfig {
    /// Root directory of the contract repository.
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Explicit contract files. When non-empty, glob discovery is skipped.
    #[serde(default)]
    pub swagger_paths: Vec<PathBuf>,

    /// Glob patterns (relative to `directory`) selecting contract files.
    #[serde(default = "default_swagger_paths_pattern")]
    pub swagger_paths_pattern: Vec<String>,

    /// Glob patterns for files that are never treated as contracts.
    #[serde(default = "default_excluded_swagger_paths_pattern")]
    pub excluded_swagger_paths_pattern: Vec<String>,

    /// Match request paths case-sensitively.
    #[serde(default)]
    pub is_path_case_sensitive: bool,

    /// Enables Azure Resource Manager specific checks.
    #[serde(default)]
    pub is_arm_call: bool,

    /// Pre-compile every validator in a background task after initialize.
    #[serde(default = "default_true")]
    pub load_validator_in_background: bool,

    /// Pre-compile every validator before initialize returns.
    #[serde(default)]
    pub load_validator_in_initialize: bool,

    /// Give operations without a `default` response the ARM error shape.
    #[serde(default)]
    pub model_implicit_default_response: bool,

    /// Issue codes to report. Empty reports every code.
    #[serde(default)]
    pub include_errors: Vec<IssueCode>,

    /// Contract files read concurrently during initialize.
    #[serde(default = "default_max_concurrent_loads")]
    pub max_concurrent_loads: usize,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            swagger_paths: Vec::new(),
            swagger_paths_pattern: default_swagger_paths_pattern(),
            excluded_swagger_paths_pattern: default_excluded_swagger_paths_pattern(),
            is_path_case_sensitive: false,
            is_arm_call: false,
            load_validator_in_background: true,
            load_validator_in_initialize: false,
            model_implicit_default_response: false,
            include_errors: Vec::new(),
            max_concurrent_loads: default_max_concurrent_loads(),
        }
    }
}

impl ValidatorConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.swagger_paths.is_empty() && self.swagger_paths_pattern.is_empty() {
            return Err(
                "validator needs either swagger_paths or swagger_paths_pattern to discover contracts"
                    .into(),
            );
        }
        if self.max_concurrent_loads == 0 {
            return Err("validator.max_concurrent_loads must be greater than zero".into());
        }
        Ok(())
    }
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_swagger_paths_pattern() -> Vec<String> {
    vec!["specification/**/*.json".to_string()]
}

fn default_excluded_swagger_paths_pattern() -> Vec<String> {
    [
        "**/examples/**/*",
        "**/quickstart-templates/**/*",
        "**/schema/**/*",
        "**/live/**/*",
        "**/wire-format/**/*",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn default_true() -> bool {
    true
}

fn default_max_concurrent_loads() -> usize {
    16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(ValidatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let config = ValidatorConfig {
            max_concurrent_loads: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
