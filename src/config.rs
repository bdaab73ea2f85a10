//! Runtime configuration, read from the environment (after `.env` is loaded).

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::UnknownValue;
use crate::retry::Backoff;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("invalid value '{value}' for {key}: expected {expected}")]
    Invalid {
        key: &'static str,
        value: String,
        expected: &'static str,
    },
}

/// What happens to `resolution` / `feedback` when a resolved complaint is
/// moved to another status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegressionPolicy {
    /// Leave both in place (stale resolution on a non-resolved complaint).
    Keep,
    /// Drop the resolution, keep citizen feedback as history.
    #[default]
    ClearResolution,
    /// Drop both; the complaint can be resolved and rated again.
    ClearAll,
}

impl RegressionPolicy {
    pub fn clears_resolution(self) -> bool {
        !matches!(self, RegressionPolicy::Keep)
    }

    pub fn clears_feedback(self) -> bool {
        matches!(self, RegressionPolicy::ClearAll)
    }
}

impl FromStr for RegressionPolicy {
    type Err = UnknownValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "keep" => Ok(RegressionPolicy::Keep),
            "clear-resolution" => Ok(RegressionPolicy::ClearResolution),
            "clear-all" => Ok(RegressionPolicy::ClearAll),
            _ => Err(UnknownValue { kind: "regression policy", value: s.to_string() }),
        }
    }
}

impl fmt::Display for RegressionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RegressionPolicy::Keep => "keep",
            RegressionPolicy::ClearResolution => "clear-resolution",
            RegressionPolicy::ClearAll => "clear-all",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LifecycleConfig {
    pub regression_policy: RegressionPolicy,
    /// Compare-and-set attempts before an update gives up with `Conflict`.
    pub max_write_attempts: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self { regression_policy: RegressionPolicy::default(), max_write_attempts: 5 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerConfig {
    pub backoff: Backoff,
    /// Largest absolute drift `verify` accepts without reporting a conflict.
    pub drift_tolerance: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self { backoff: Backoff::default(), drift_tolerance: 0 }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub timeout: Duration,
    pub include_empty_categories: bool,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(10), include_empty_categories: false }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub database: DatabaseConfig,
    pub lifecycle: LifecycleConfig,
    pub reconciler: ReconcilerConfig,
    pub analytics: AnalyticsConfig,
}

impl Config {
    /// Reads the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup (tests pass a map).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &'static str| lookup(key).filter(|v| !v.trim().is_empty());

        let backoff = Backoff {
            max_retries: parse_or(&get, "COUNTER_RETRY_MAX", 3, "a non-negative integer")?,
            initial_delay: Duration::from_millis(parse_or(&get, "COUNTER_RETRY_INITIAL_MS", 50, "milliseconds")?),
            max_delay: Duration::from_millis(parse_or(&get, "COUNTER_RETRY_MAX_MS", 2000, "milliseconds")?),
            ..Backoff::default()
        };

        Ok(Self {
            database: DatabaseConfig {
                url: get("DATABASE_URL"),
                max_connections: parse_or(&get, "DATABASE_MAX_CONNECTIONS", 10, "a positive integer")?,
            },
            lifecycle: LifecycleConfig {
                regression_policy: parse_or(
                    &get,
                    "RESOLUTION_REGRESSION_POLICY",
                    RegressionPolicy::default(),
                    "keep | clear-resolution | clear-all",
                )?,
                ..LifecycleConfig::default()
            },
            reconciler: ReconcilerConfig {
                backoff,
                drift_tolerance: parse_or(&get, "RECONCILE_DRIFT_TOLERANCE", 0u32, "a non-negative integer")?,
            },
            analytics: AnalyticsConfig {
                timeout: Duration::from_secs(parse_or(&get, "ANALYTICS_TIMEOUT_SECS", 10, "seconds")?),
                include_empty_categories: parse_or(&get, "ANALYTICS_INCLUDE_EMPTY_CATEGORIES", false, "true | false")?,
            },
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database.url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig { url: None, max_connections: 10 },
            lifecycle: LifecycleConfig::default(),
            reconciler: ReconcilerConfig::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

fn parse_or<T, G>(get: &G, key: &'static str, default: T, expected: &'static str) -> Result<T, ConfigError>
where
    T: FromStr,
    G: Fn(&'static str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { key, value: raw, expected }),
    }
}
