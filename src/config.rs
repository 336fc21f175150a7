//! Configuration management for Quotagate.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::info;

use crate::error::{GateError, Result};
use crate::ratelimit::{Policy, DEFAULT_LOCK_STRIPES, DEFAULT_MAX_ATTEMPTS};

/// Prefix for environment overrides, e.g. `QUOTAGATE__LIMITER__STRATEGY`.
const ENV_PREFIX: &str = "QUOTAGATE";

/// Main configuration for Quotagate.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GateConfig {
    /// Limiter configuration
    #[serde(default)]
    pub limiter: LimiterConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Named policies
    #[serde(default)]
    pub policies: HashMap<String, Policy>,

    /// Policy used when a name has no entry in `policies`
    #[serde(default)]
    pub default_policy: Option<Policy>,
}

/// How same-key consumes are kept from racing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Striped in-process locks
    #[default]
    Striped,
    /// Versioned compare-and-swap against the store
    Optimistic,
}

/// Limiter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimiterConfig {
    #[serde(default)]
    pub strategy: Strategy,

    /// Number of lock stripes for the striped strategy
    #[serde(default = "default_lock_stripes")]
    pub lock_stripes: usize,

    /// Compare-and-swap rounds per consume for the optimistic strategy
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            lock_stripes: default_lock_stripes(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_lock_stripes() -> usize {
    DEFAULT_LOCK_STRIPES
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

/// Storage configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Upper bound on a single load or save, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// How often expired windows are evicted, in seconds (0 disables)
    #[serde(default = "default_purge_interval")]
    pub purge_interval_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    100
}

fn default_purge_interval() -> u64 {
    30
}

impl GateConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml)
            .map_err(|e| GateError::Config(format!("Failed to parse configuration: {}", e)))
    }

    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a file, layering `QUOTAGATE__*` environment
    /// variables on top.
    ///
    /// Keys are matched case-insensitively, so policy names should be
    /// lowercase.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading configuration");

        config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|settings| settings.try_deserialize::<GateConfig>())
            .map_err(|e| GateError::Config(e.to_string()))
    }

    /// Check every policy and limiter setting.
    pub fn validate(&self) -> Result<()> {
        if self.limiter.lock_stripes == 0 {
            return Err(GateError::Config("lock_stripes must be positive".to_string()));
        }
        if self.limiter.max_attempts == 0 {
            return Err(GateError::Config("max_attempts must be positive".to_string()));
        }
        if self.storage.timeout_ms == 0 {
            return Err(GateError::Config("storage timeout_ms must be positive".to_string()));
        }
        for (name, policy) in &self.policies {
            policy
                .validate()
                .map_err(|e| GateError::Config(format!("policy {}: {}", name, e)))?;
        }
        if let Some(policy) = &self.default_policy {
            policy
                .validate()
                .map_err(|e| GateError::Config(format!("default policy: {}", e)))?;
        }
        Ok(())
    }

    /// Resolve a named policy, falling back to the default policy.
    pub fn policy(&self, name: Option<&str>) -> Option<&Policy> {
        name.and_then(|n| self.policies.get(n))
            .or(self.default_policy.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
limiter:
  strategy: optimistic
  max_attempts: 8
storage:
  timeout_ms: 250
policies:
  api:
    limit: 100
    refresh_interval: 60
  billing:
    quota: 30
    refresh_interval: 3600
default_policy:
  limit: 10
"#;

    #[test]
    fn test_parse_full_config() {
        let config = GateConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.limiter.strategy, Strategy::Optimistic);
        assert_eq!(config.limiter.max_attempts, 8);
        assert_eq!(config.limiter.lock_stripes, DEFAULT_LOCK_STRIPES);
        assert_eq!(config.storage.timeout_ms, 250);
        assert_eq!(config.storage.purge_interval_secs, 30);
        assert_eq!(config.policies["billing"].quota, Some(30));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = GateConfig::from_yaml("{}").unwrap();
        assert_eq!(config.limiter.strategy, Strategy::Striped);
        assert!(config.policies.is_empty());
        assert!(config.policy(Some("anything")).is_none());
    }

    #[test]
    fn test_policy_lookup_falls_back_to_default() {
        let config = GateConfig::from_yaml(SAMPLE).unwrap();
        assert_eq!(config.policy(Some("api")).unwrap().limit, Some(100));
        assert_eq!(config.policy(Some("missing")).unwrap().limit, Some(10));
        assert_eq!(config.policy(None).unwrap().limit, Some(10));
    }

    #[test]
    fn test_validate_rejects_bad_policy() {
        let yaml = r#"
policies:
  broken:
    limit: 1
    refresh_interval: 0
"#;
        let config = GateConfig::from_yaml(yaml).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("broken"));
    }

    #[test]
    fn test_validate_rejects_zero_stripes() {
        let mut config = GateConfig::default();
        config.limiter.lock_stripes = 0;
        assert!(matches!(config.validate(), Err(GateError::Config(_))));
    }

    #[test]
    fn test_parse_error_is_config_error() {
        let result = GateConfig::from_yaml("limiter: [not, a, map]");
        assert!(matches!(result, Err(GateError::Config(_))));
    }

    #[test]
    fn test_load_layered_file() {
        let path = std::env::temp_dir().join(format!("quotagate-{}.yaml", std::process::id()));
        std::fs::write(&path, SAMPLE).unwrap();

        let config = GateConfig::load(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(config.limiter.strategy, Strategy::Optimistic);
        assert_eq!(config.policies["api"].limit, Some(100));
        assert_eq!(config.default_policy.unwrap().limit, Some(10));
    }
}
