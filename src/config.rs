//! Service configuration, loaded from YAML.
//!
//! Every field has a default, so an empty file (or no file) is a valid
//! configuration for a local ClickHouse and Redis.
//!
//! ```yaml
//! http:
//!   bind: 0.0.0.0:3000
//! clickhouse:
//!   url: http://localhost:8123
//!   database: orderflow
//! cache:
//!   refresh_interval_secs: 86400
//! retry:
//!   max_attempts: 5
//!   exponential: true
//! graph:
//!   top_n: 20
//!   fallback_color: hashed
//!   palette:
//!     MyWallet: "#123456"
//! ```

use crate::cache::expiry::RefreshSchedule;
use crate::cache::retry::RetryPolicy;
use crate::graph::color::{ColorAssigner, FallbackColor, OTHER_COLOR};
use crate::graph::regroup::DEFAULT_TOP_N;
use crate::service::engine::EngineOptions;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub http: HttpConfig,
    pub clickhouse: ClickHouseConfig,
    pub redis: RedisConfig,
    pub cache: CacheConfig,
    pub retry: RetryConfig,
    pub graph: GraphConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub database: String,
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:8123".into(),
            user: "default".into(),
            password: String::new(),
            database: "orderflow".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub url: String,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".into(),
        }
    }
}

/// Data refresh boundaries that cache entries expire on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub refresh_interval_secs: u64,
    pub refresh_offset_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 86_400,
            refresh_offset_secs: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub exponential: bool,
    pub jitter: bool,
    /// Unset retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            base_delay_ms: policy.base_delay.as_millis() as u64,
            max_delay_ms: policy.max_delay.as_millis() as u64,
            exponential: policy.exponential,
            jitter: policy.jitter,
            max_attempts: policy.max_attempts,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    pub top_n: usize,
    pub fallback_color: FallbackColor,
    pub other_color: String,
    /// Extra or overriding canonical colors, label -> `#rrggbb`.
    pub palette: BTreeMap<String, String>,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            fallback_color: FallbackColor::default(),
            other_color: OTHER_COLOR.into(),
            palette: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self, ConfigError> {
        // an empty document deserializes as null
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&text)
    }

    /// Defaults when `path` is `None`.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.graph.top_n == 0 {
            return Err(ConfigError::Invalid {
                field: "graph.top_n",
                reason: "must keep at least one label per column".into(),
            });
        }
        if self.cache.refresh_interval_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "cache.refresh_interval_secs",
                reason: "must be positive".into(),
            });
        }
        if self.retry.max_attempts == Some(0) {
            return Err(ConfigError::Invalid {
                field: "retry.max_attempts",
                reason: "must allow at least one attempt".into(),
            });
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            base_delay: Duration::from_millis(self.retry.base_delay_ms),
            max_delay: Duration::from_millis(self.retry.max_delay_ms.max(self.retry.base_delay_ms)),
            exponential: self.retry.exponential,
            jitter: self.retry.jitter,
            max_attempts: self.retry.max_attempts,
        }
    }

    pub fn refresh_schedule(&self) -> RefreshSchedule {
        RefreshSchedule::new(
            chrono::Duration::seconds(self.cache.refresh_interval_secs as i64),
            chrono::Duration::seconds(self.cache.refresh_offset_secs as i64),
        )
    }

    pub fn color_assigner(&self) -> ColorAssigner {
        ColorAssigner::new(self.graph.fallback_color)
            .with_palette(self.graph.palette.clone())
            .with_other_color(self.graph.other_color.clone())
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            retry: self.retry_policy(),
            schedule: self.refresh_schedule(),
            top_n: self.graph.top_n,
            colors: self.color_assigner(),
        }
    }
}
