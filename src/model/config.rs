use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::service::retry::RetryPolicy;

const ENV_CONFIG_PATH: &str = "OCSF_REFINERY_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.yaml";

const ENV_VALIDATOR_URL: &str = "OCSF_VALIDATOR_URL";
const ENV_CORRECTOR_URL: &str = "OCSF_CORRECTOR_URL";
const ENV_CORRECTOR_API_KEY: &str = "OCSF_CORRECTOR_API_KEY";
const ENV_CORRECTOR_DATASET: &str = "OCSF_CORRECTOR_DATASET";

const DEFAULT_VALIDATOR_URL: &str = "http://localhost:8085/api/v2";
const DEFAULT_CORRECTOR_URL: &str = "http://localhost:8090/api/chunk/generate";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {field} URL '{value}': {source}")]
    InvalidUrl {
        field: &'static str,
        value: String,
        source: url::ParseError,
    },

    #[error("{0} must be at least 1")]
    ZeroAttempts(&'static str),

    #[error("{0} must be a positive number")]
    InvalidBackoff(&'static str),

    #[error("{0} must be at least 1 second")]
    ZeroTimeout(&'static str),
}

/// Backoff parameters for one external call
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff_multiplier: f64,
}

fn default_backoff() -> f64 {
    2.0
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_millis(self.initial_delay_ms),
            self.backoff_multiplier,
        )
    }

    fn check(&self, name: &'static str) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts(name));
        }
        if !(self.backoff_multiplier.is_finite() && self.backoff_multiplier > 0.0) {
            return Err(ConfigError::InvalidBackoff(name));
        }
        Ok(())
    }
}

/// Schema validation server settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Base URL; documents are posted to `<base_url>/validate`
    pub base_url: String,
    pub timeout_secs: u64,
    pub retry: RetrySettings,
}

impl Default for ValidatorConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_VALIDATOR_URL.to_string(),
            timeout_secs: 30,
            retry: RetrySettings {
                max_attempts: 3,
                initial_delay_ms: 1_000,
                backoff_multiplier: 2.0,
            },
        }
    }
}

/// Correction service settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CorrectorConfig {
    pub url: String,
    pub api_key: Option<String>,
    pub dataset_id: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
    pub retry: RetrySettings,
}

impl Default for CorrectorConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CORRECTOR_URL.to_string(),
            api_key: None,
            dataset_id: None,
            timeout_secs: 120,
            temperature: 0.3,
            retry: RetrySettings {
                max_attempts: 2,
                initial_delay_ms: 2_000,
                backoff_multiplier: 2.0,
            },
        }
    }
}

/// Batch run settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Documents processed at once; 1 keeps the run strictly sequential
    pub max_concurrency: usize,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("transformed"),
            output_dir: PathBuf::from("post-validation"),
            max_concurrency: 1,
        }
    }
}

/// YAML configuration file structure
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub validator: ValidatorConfig,
    #[serde(default)]
    pub corrector: CorrectorConfig,
    #[serde(default)]
    pub workflow: WorkflowConfig,
}

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub validator: ValidatorConfig,
    pub corrector: CorrectorConfig,
    pub workflow: WorkflowConfig,
}

impl Config {
    /// Load configuration from the config file and environment
    ///
    /// The file path comes from `explicit_path`, then `OCSF_REFINERY_CONFIG`,
    /// then `config.yaml`. Endpoint and credential variables override the file.
    pub fn from_env(explicit_path: Option<&Path>) -> Self {
        let config_path = explicit_path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var(ENV_CONFIG_PATH).ok().map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let file = Self::load_config_file(&config_path).unwrap_or_default();
        let mut config = Self {
            validator: file.validator,
            corrector: file.corrector,
            workflow: file.workflow,
        };

        if let Ok(url) = std::env::var(ENV_VALIDATOR_URL) {
            config.validator.base_url = url;
        }
        if let Ok(url) = std::env::var(ENV_CORRECTOR_URL) {
            config.corrector.url = url;
        }
        if let Ok(key) = std::env::var(ENV_CORRECTOR_API_KEY) {
            config.corrector.api_key = Some(key);
        }
        if let Ok(dataset) = std::env::var(ENV_CORRECTOR_DATASET) {
            config.corrector.dataset_id = Some(dataset);
        }

        config
    }

    /// Load configuration from YAML file
    fn load_config_file(path: &Path) -> Option<ConfigFile> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return None;
        }

        match fs::read_to_string(path) {
            Ok(contents) => Self::parse(path, &contents),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                None
            }
        }
    }

    fn parse(path: &Path, contents: &str) -> Option<ConfigFile> {
        let contents = contents.trim();
        if contents.is_empty() {
            tracing::debug!(path = %path.display(), "Config file is empty, using defaults");
            return Some(ConfigFile::default());
        }

        match serde_yaml::from_str(contents) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "Loaded configuration from file");
                Some(config)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to parse config file, using defaults");
                None
            }
        }
    }

    /// Reject settings that would make a run meaningless
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validator_url()?;
        self.corrector_url()?;
        if self.validator.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("validator.timeout_secs"));
        }
        if self.corrector.timeout_secs == 0 {
            return Err(ConfigError::ZeroTimeout("corrector.timeout_secs"));
        }
        self.validator.retry.check("validator.retry.max_attempts")?;
        self.corrector.retry.check("corrector.retry.max_attempts")?;
        Ok(())
    }

    pub fn validator_url(&self) -> Result<Url, ConfigError> {
        parse_url("validator.base_url", &self.validator.base_url)
    }

    pub fn corrector_url(&self) -> Result<Url, ConfigError> {
        parse_url("corrector.url", &self.corrector.url)
    }
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(value).map_err(|source| ConfigError::InvalidUrl {
        field,
        value: value.to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_documented_retry_budgets() {
        let config = Config::default();
        assert_eq!(config.validator.retry.max_attempts, 3);
        assert_eq!(config.validator.retry.initial_delay_ms, 1_000);
        assert_eq!(config.corrector.retry.max_attempts, 2);
        assert_eq!(config.corrector.retry.initial_delay_ms, 2_000);
        assert_eq!(config.workflow.max_concurrency, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
validator:
  base_url: "http://ocsf.internal:8085/api/v2"
  timeout_secs: 5
workflow:
  input_dir: in
  max_concurrency: 4
"#;
        let file = Config::parse(Path::new("test.yaml"), yaml).unwrap();
        assert_eq!(file.validator.base_url, "http://ocsf.internal:8085/api/v2");
        assert_eq!(file.validator.timeout_secs, 5);
        assert_eq!(file.validator.retry.max_attempts, 3);
        assert_eq!(file.workflow.input_dir, PathBuf::from("in"));
        assert_eq!(file.workflow.output_dir, PathBuf::from("post-validation"));
        assert_eq!(file.workflow.max_concurrency, 4);
        assert_eq!(file.corrector.timeout_secs, 120);
    }

    #[test]
    fn test_empty_and_broken_yaml() {
        assert!(Config::parse(Path::new("empty.yaml"), "   \n").is_some());
        assert!(Config::parse(Path::new("bad.yaml"), "validator: [").is_none());
    }

    #[test]
    fn test_validate_rejects_bad_settings() {
        let mut config = Config::default();
        config.validator.base_url = "not a url".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "validator.base_url", .. })
        ));

        let mut config = Config::default();
        config.corrector.retry.max_attempts = 0;
        assert!(matches!(config.validate(), Err(ConfigError::ZeroAttempts(_))));

        let mut config = Config::default();
        config.validator.retry.backoff_multiplier = 0.0;
        assert!(matches!(config.validate(), Err(ConfigError::InvalidBackoff(_))));

        let mut config = Config::default();
        config.corrector.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ZeroTimeout("corrector.timeout_secs"))
        ));
    }
}
