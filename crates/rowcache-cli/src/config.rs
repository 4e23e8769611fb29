//! # CLI Configuration
//!
//! Environment-based configuration for the `rowcache` binary.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use rowcache_persistence::{CacheConfig, ScyllaConfig};

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Process configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// ScyllaDB configuration
    pub scylla: ScyllaConfig,

    /// Redis configuration
    pub redis: CacheConfig,

    /// Logging level
    pub log_level: String,

    /// Logging format
    pub log_format: LogFormat,
}

impl Config {
    /// Load configuration from environment variables
    ///
    /// # Errors
    ///
    /// Fails if a numeric variable is set but does not parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ScyllaConfig::default();
        let scylla = ScyllaConfig {
            hosts: var("SCYLLA_HOSTS").map_or(defaults.hosts, |hosts| {
                hosts
                    .split(',')
                    .map(str::trim)
                    .filter(|h| !h.is_empty())
                    .map(String::from)
                    .collect()
            }),
            keyspace: var("SCYLLA_KEYSPACE").unwrap_or(defaults.keyspace),
            username: var("SCYLLA_USERNAME"),
            password: var("SCYLLA_PASSWORD"),
            connection_timeout: millis(&var, "SCYLLA_CONNECT_TIMEOUT_MS")?
                .unwrap_or(defaults.connection_timeout),
        };

        let defaults = CacheConfig::default();
        let redis = CacheConfig {
            url: var("REDIS_URL").unwrap_or(defaults.url),
            entry_ttl: var("CACHE_TTL_SECS")
                .map(|v| v.parse::<u64>().context("Invalid CACHE_TTL_SECS"))
                .transpose()?
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs),
            response_timeout: millis(&var, "REDIS_RESPONSE_TIMEOUT_MS")?
                .or(defaults.response_timeout),
        };

        let log_format = match var("LOG_FORMAT").as_deref() {
            Some("json") => LogFormat::Json,
            _ => LogFormat::Pretty,
        };

        Ok(Self {
            scylla,
            redis,
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            log_format,
        })
    }
}

fn millis(var: &impl Fn(&str) -> Option<String>, name: &str) -> Result<Option<Duration>> {
    var(name)
        .map(|v| {
            v.parse::<u64>()
                .map(Duration::from_millis)
                .with_context(|| format!("Invalid {name}"))
        })
        .transpose()
}
