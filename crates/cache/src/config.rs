//! Cache configuration.
//!
//! The full configuration subsystem lives outside this crate; the engine
//! only consumes the resulting [`CacheConfig`] struct. It deserializes from
//! any serde source and can also be populated from environment variables
//! under a caller-chosen root prefix.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{CacheError, CacheResult};

/// Declarative cache parameters with defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Entry lifetime in seconds (fixed per cache, not per key).
    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u64,

    /// Maximum number of entries expired by a single sweep.
    #[serde(default = "default_expire_limit")]
    pub expire_limit: usize,

    /// Interval between background sweeps, in milliseconds.
    #[serde(default = "default_expire_frequency_ms")]
    pub expire_frequency_ms: u64,

    /// Reset an entry's TTL when it is read.
    #[serde(default)]
    pub deage_on_access: bool,

    /// Collect counter/gauge/histogram metrics for this cache.
    #[serde(default)]
    pub metrics: bool,

    /// Prefix for the metric subsystem name.
    #[serde(default)]
    pub metrics_prefix: String,
}

// Default value functions
fn default_ttl_secs() -> u64 {
    300
}
fn default_expire_limit() -> usize {
    100
}
fn default_expire_frequency_ms() -> u64 {
    30_000
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl_secs(),
            expire_limit: default_expire_limit(),
            expire_frequency_ms: default_expire_frequency_ms(),
            deage_on_access: false,
            metrics: false,
            metrics_prefix: String::new(),
        }
    }
}

impl CacheConfig {
    /// Entry TTL as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Sweep interval as a Duration.
    pub fn expire_frequency(&self) -> Duration {
        Duration::from_millis(self.expire_frequency_ms)
    }

    /// Check the configuration for values the engine cannot run with.
    ///
    /// # Errors
    /// Returns `CacheError::Config` if the sweep batch limit or the sweep
    /// interval is zero.
    pub fn validate(&self) -> CacheResult<()> {
        if self.expire_limit == 0 {
            return Err(CacheError::Config("expire_limit must be at least 1".to_string()));
        }
        if self.expire_frequency_ms == 0 {
            return Err(CacheError::Config("expire_frequency_ms must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Populate a configuration from environment variables under `root`.
    ///
    /// Reads `{root}_TTL_SECS`, `{root}_EXPIRE_LIMIT`,
    /// `{root}_EXPIRE_FREQUENCY_MS`, `{root}_DEAGE_ON_ACCESS`,
    /// `{root}_METRICS` and `{root}_METRICS_PREFIX`. Missing variables keep
    /// their defaults.
    ///
    /// # Errors
    /// Returns `CacheError::Config` if a present variable fails to parse.
    pub fn from_env(root: &str) -> CacheResult<Self> {
        let mut config = Self::default();

        if let Some(ttl_secs) = env_parse(root, "TTL_SECS")? {
            config.ttl_secs = ttl_secs;
        }
        if let Some(expire_limit) = env_parse(root, "EXPIRE_LIMIT")? {
            config.expire_limit = expire_limit;
        }
        if let Some(expire_frequency_ms) = env_parse(root, "EXPIRE_FREQUENCY_MS")? {
            config.expire_frequency_ms = expire_frequency_ms;
        }
        if let Some(deage_on_access) = env_parse(root, "DEAGE_ON_ACCESS")? {
            config.deage_on_access = deage_on_access;
        }
        if let Some(metrics) = env_parse(root, "METRICS")? {
            config.metrics = metrics;
        }
        if let Ok(metrics_prefix) = std::env::var(format!("{root}_METRICS_PREFIX")) {
            config.metrics_prefix = metrics_prefix;
        }

        tracing::debug!(root, "cache configuration loaded from environment");
        Ok(config)
    }
}

fn env_parse<T>(root: &str, name: &str) -> CacheResult<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(format!("{root}_{name}")) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| CacheError::Config(format!("invalid {root}_{name}: {e}"))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for config.
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.ttl(), Duration::from_secs(300));
        assert_eq!(config.expire_limit, 100);
        assert_eq!(config.expire_frequency(), Duration::from_secs(30));
        assert!(!config.deage_on_access);
        assert!(!config.metrics);
        assert!(config.metrics_prefix.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_partial_uses_defaults() {
        let config: CacheConfig =
            serde_json::from_str(r#"{"ttl_secs": 60, "metrics": true}"#).unwrap();

        assert_eq!(config.ttl(), Duration::from_secs(60));
        assert!(config.metrics);
        assert_eq!(config.expire_limit, 100);
        assert_eq!(config.expire_frequency_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let config = CacheConfig { expire_limit: 0, ..CacheConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("expire_limit"));
    }

    #[test]
    fn test_validate_rejects_zero_frequency() {
        let config = CacheConfig { expire_frequency_ms: 0, ..CacheConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("expire_frequency_ms"));
    }

    #[test]
    fn test_from_env_missing_vars_keeps_defaults() {
        let config = CacheConfig::from_env("EPHEMERA_TEST_UNSET").unwrap();
        assert_eq!(config.ttl_secs, 300);
        assert_eq!(config.expire_limit, 100);
    }

    #[test]
    fn test_from_env_reads_overrides() {
        std::env::set_var("EPHEMERA_TEST_OVERRIDE_TTL_SECS", "42");
        std::env::set_var("EPHEMERA_TEST_OVERRIDE_DEAGE_ON_ACCESS", "true");
        std::env::set_var("EPHEMERA_TEST_OVERRIDE_METRICS_PREFIX", "tokens.");

        let config = CacheConfig::from_env("EPHEMERA_TEST_OVERRIDE").unwrap();
        assert_eq!(config.ttl_secs, 42);
        assert!(config.deage_on_access);
        assert_eq!(config.metrics_prefix, "tokens.");
        assert_eq!(config.expire_limit, 100);
    }

    #[test]
    fn test_from_env_invalid_value_is_config_error() {
        std::env::set_var("EPHEMERA_TEST_BROKEN_EXPIRE_LIMIT", "not-a-number");

        let err = CacheConfig::from_env("EPHEMERA_TEST_BROKEN").unwrap_err();
        assert!(matches!(err, CacheError::Config(_)));
        assert!(err.to_string().contains("EPHEMERA_TEST_BROKEN_EXPIRE_LIMIT"));
    }
}
