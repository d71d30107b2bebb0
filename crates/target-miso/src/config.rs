//! Configuration management for target-miso
//!
//! The config file is a JSON object passed with `--config`. Flags accept the
//! loose truthy values Singer configs tend to carry (`true`, `"true"`, `1`,
//! `"1"`). `MISO_API_KEY` and `MISO_API_SERVER` override the file, and a
//! `.env` file in the working directory is read first.

use crate::api::{ClientConfig, RetryPolicy};
use crate::error::{Result, TargetError};
use crate::pipeline::PipelineOptions;
use crate::uploader::UploaderConfig;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::time::Duration;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Production Miso API server.
pub const DEFAULT_API_SERVER: &str = "https://api.askmiso.com";

/// Per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Environment variable overriding `api_key`.
pub const API_KEY_ENV: &str = "MISO_API_KEY";

/// Environment variable overriding `api_server`.
pub const API_SERVER_ENV: &str = "MISO_API_SERVER";

/// Target configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Miso API key
    #[serde(default)]
    pub api_key: String,

    /// Miso API server URL
    #[serde(default = "default_api_server")]
    pub api_server: String,

    /// Folder holding one template per stream
    #[serde(default)]
    pub template_folder: PathBuf,

    /// Ask the server to process uploads asynchronously
    #[serde(default, deserialize_with = "truthy")]
    pub use_async: bool,

    /// Log writes and deletes instead of sending them
    #[serde(default, deserialize_with = "truthy")]
    pub dry_run: bool,

    /// Never delete remote records
    #[serde(default, deserialize_with = "truthy")]
    pub insert_only: bool,

    /// Track user hashes across runs as well as product hashes
    #[serde(default, deserialize_with = "truthy")]
    pub persist_user_hashes: bool,

    /// Per-request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_api_server() -> String {
    DEFAULT_API_SERVER.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Interpret a loosely typed flag
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => matches!(s.to_lowercase().as_str(), "true" | "1"),
        _ => false,
    }
}

fn truthy<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(is_truthy(&value))
}

impl Config {
    /// Parse a config document without touching the environment
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)
            .map_err(|e| TargetError::config(format!("Invalid config file: {}", e)))?;
        Ok(config)
    }

    /// Read, apply environment overrides and validate
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TargetError::config(format!("Unable to read config '{}': {}", path.display(), e))
        })?;

        // A missing .env file is fine
        let _ = dotenvy::dotenv();

        let config = Self::from_json_str(&text)?.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from a variable lookup
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup(API_KEY_ENV).filter(|v| !v.is_empty()) {
            self.api_key = key;
        }
        if let Some(server) = lookup(API_SERVER_ENV).filter(|v| !v.is_empty()) {
            self.api_server = server;
        }
        self
    }

    /// Reject configs the target cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.api_key.trim().is_empty() {
            return Err(TargetError::config(format!(
                "'api_key' is required. Set it in the config file or via {}.",
                API_KEY_ENV
            )));
        }
        if self.api_server.trim().is_empty() {
            return Err(TargetError::config("'api_server' cannot be empty"));
        }
        if self.template_folder.as_os_str().is_empty() {
            return Err(TargetError::config("'template_folder' is required"));
        }
        if self.timeout_secs == 0 {
            return Err(TargetError::config("'timeout_secs' must be greater than zero"));
        }
        Ok(())
    }

    /// Settings for the HTTP client
    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            base_url: self.api_server.trim_end_matches('/').to_string(),
            api_key: self.api_key.clone(),
            use_async: self.use_async,
            timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryPolicy::default(),
        }
    }

    /// Settings for the batching uploader
    pub fn uploader_config(&self) -> UploaderConfig {
        UploaderConfig {
            dry_run: self.dry_run,
            ..UploaderConfig::default()
        }
    }

    /// Settings for the pipeline driver
    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            reconcile: !self.insert_only,
            persist_user_hashes: self.persist_user_hashes,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    #[test]
    fn test_minimal_config_defaults() {
        let config =
            Config::from_json_str(r#"{"api_key": "k", "template_folder": "templates"}"#).unwrap();

        assert_eq!(config.api_server, DEFAULT_API_SERVER);
        assert_eq!(config.timeout_secs, DEFAULT_TIMEOUT_SECS);
        assert!(!config.use_async);
        assert!(!config.dry_run);
        assert!(!config.insert_only);
        assert!(!config.persist_user_hashes);
        config.validate().unwrap();
    }

    #[test]
    fn test_truthy_values() {
        for value in [json!(true), json!(1), json!("true"), json!("TRUE"), json!("1")] {
            assert!(is_truthy(&value), "{} should be truthy", value);
        }
        for value in [json!(false), json!(0), json!("yes"), json!("0"), json!(null), json!([])] {
            assert!(!is_truthy(&value), "{} should be falsy", value);
        }
    }

    #[test]
    fn test_flags_parse_loosely() {
        let config = Config::from_json_str(
            r#"{"api_key": "k", "template_folder": "t", "use_async": "True", "dry_run": 1, "insert_only": "false"}"#,
        )
        .unwrap();
        assert!(config.use_async);
        assert!(config.dry_run);
        assert!(!config.insert_only);
        assert!(config.pipeline_options().reconcile);
        assert!(config.uploader_config().dry_run);
        assert!(config.client_config().use_async);
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> =
            HashMap::from([(API_KEY_ENV, "from-env"), (API_SERVER_ENV, "http://localhost:9000/")]);
        let config = Config::from_json_str(r#"{"api_key": "file", "template_folder": "t"}"#)
            .unwrap()
            .with_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.api_key, "from-env");
        assert_eq!(config.client_config().base_url, "http://localhost:9000");
    }

    #[test]
    fn test_validation_failures() {
        let missing_key = Config::from_json_str(r#"{"template_folder": "t"}"#).unwrap();
        assert!(matches!(missing_key.validate(), Err(TargetError::Config(_))));

        let missing_folder = Config::from_json_str(r#"{"api_key": "k"}"#).unwrap();
        assert!(missing_folder.validate().is_err());

        let zero_timeout =
            Config::from_json_str(r#"{"api_key": "k", "template_folder": "t", "timeout_secs": 0}"#)
                .unwrap();
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            Config::from_json_str("not json"),
            Err(TargetError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"api_key": "k", "template_folder": "t", "timeout_secs": 30}"#,
        )
        .unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.client_config().timeout, Duration::from_secs(30));

        assert!(Config::load(&dir.path().join("missing.json")).is_err());
    }
}
