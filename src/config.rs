//! Configuration Management
//!
//! Connection settings for armtables, persisted under the user config dir.

use crate::azure::auth;
use crate::azure::environment::CloudEnvironment;
use crate::azure::http::RetryPolicy;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_MAX_ERROR_RETRY_ATTEMPTS: u32 = 9;
pub const DEFAULT_MIN_ERROR_RETRY_DELAY_MS: u64 = 25;
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Connection configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub subscription_id: Option<String>,
    #[serde(default)]
    pub tenant_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    /// Cloud name, e.g. `AzurePublicCloud` or `AzureChinaCloud`
    #[serde(default)]
    pub environment: Option<String>,
    /// Authenticate with the instance's managed identity
    #[serde(default)]
    pub use_msi: bool,
    #[serde(default)]
    pub max_error_retry_attempts: Option<u32>,
    /// Milliseconds between retries
    #[serde(default)]
    pub min_error_retry_delay: Option<u64>,
    /// ARM error codes that turn a failed list into an empty result
    #[serde(default)]
    pub ignore_error_codes: Vec<String>,
    /// Hydrate calls in flight per page
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

impl Config {
    /// Get the default config file path
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("armtables").join("config.json"))
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };

        if !path.exists() {
            return Self::default();
        }

        match Self::load_from(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("Ignoring unreadable config {:?}: {:#}", path, e);
                Self::default()
            }
        }
    }

    /// Load configuration from an explicit path (JSON, or YAML by extension)
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        if is_yaml {
            Self::from_yaml(&content)
        } else {
            Self::from_json(&content)
        }
    }

    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).context("Failed to parse JSON config")
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse YAML config")
    }

    /// Save configuration to the default location
    pub fn save(&self) -> Result<()> {
        match Self::config_path() {
            Some(path) => self.save_to(&path),
            None => Ok(()),
        }
    }

    /// Save configuration as JSON at `path`
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file {:?}", path))?;

        Ok(())
    }

    /// Get effective subscription (CLI/config > environment > Azure CLI profile)
    pub fn effective_subscription(&self) -> Option<String> {
        self.subscription_id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .or_else(auth::get_default_subscription)
    }

    /// Get effective cloud environment (config > AZURE_ENVIRONMENT > public cloud)
    pub fn effective_environment(&self) -> Result<CloudEnvironment> {
        let name = self
            .environment
            .clone()
            .or_else(|| std::env::var("AZURE_ENVIRONMENT").ok())
            .unwrap_or_default();

        CloudEnvironment::from_name(&name)
            .ok_or_else(|| anyhow::anyhow!("Unknown Azure environment: {}", name))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_error_retry_attempts
                .unwrap_or(DEFAULT_MAX_ERROR_RETRY_ATTEMPTS),
            Duration::from_millis(
                self.min_error_retry_delay
                    .unwrap_or(DEFAULT_MIN_ERROR_RETRY_DELAY_MS),
            ),
        )
    }

    pub fn effective_max_concurrency(&self) -> usize {
        self.max_concurrency
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
    }

    /// Set subscription and save
    pub fn set_subscription(&mut self, subscription_id: &str) -> Result<()> {
        self.subscription_id = Some(subscription_id.to_string());
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.effective_max_concurrency(), DEFAULT_MAX_CONCURRENCY);
        assert!(config.ignore_error_codes.is_empty());
    }

    #[test]
    fn test_from_json() {
        let config = Config::from_json(
            r#"{
                "subscription_id": "00000000-0000-0000-0000-000000000000",
                "environment": "AzureChinaCloud",
                "max_error_retry_attempts": 3,
                "min_error_retry_delay": 100,
                "ignore_error_codes": ["AuthorizationFailed"]
            }"#,
        )
        .unwrap();
        assert_eq!(
            config.effective_subscription().as_deref(),
            Some("00000000-0000-0000-0000-000000000000")
        );
        assert_eq!(
            config.effective_environment().unwrap(),
            CloudEnvironment::china()
        );
        assert_eq!(
            config.retry_policy(),
            RetryPolicy::new(3, Duration::from_millis(100))
        );
        assert_eq!(config.ignore_error_codes, vec!["AuthorizationFailed"]);
    }

    #[test]
    fn test_from_yaml() {
        let config = Config::from_yaml(
            "tenant_id: t\nclient_id: c\nclient_secret: s\nuse_msi: true\nmax_concurrency: 0\n",
        )
        .unwrap();
        assert_eq!(config.tenant_id.as_deref(), Some("t"));
        assert!(config.use_msi);
        assert_eq!(config.effective_max_concurrency(), DEFAULT_MAX_CONCURRENCY);
    }

    #[test]
    fn test_unknown_environment_is_an_error() {
        let config = Config {
            environment: Some("AzureMoonCloud".to_string()),
            ..Default::default()
        };
        assert!(config.effective_environment().is_err());
    }

    #[test]
    fn test_save_to_creates_parent_dir() {
        let dir = std::env::temp_dir().join(format!("armtables-{}", uuid::Uuid::new_v4()));
        let path = dir.join("nested").join("config.json");
        let config = Config {
            subscription_id: Some("00000000-0000-0000-0000-000000000002".to_string()),
            max_concurrency: Some(4),
            ..Default::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_secret_is_not_serialized_when_absent() {
        let json = serde_json::to_string(&Config::default()).unwrap();
        assert!(!json.contains("client_secret"));
    }
}
