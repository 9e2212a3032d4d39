//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;
use std::time::Duration;

/// Requeue cadence and retry limits for a single reconciliation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleConfig {
    /// Requeue while the Machine's Node has not appeared
    pub registration_requeue: Duration,
    /// Requeue while the bound Node has not converged
    pub initialization_requeue: Duration,
    /// Requeue after in-pass conflict retries are exhausted
    pub conflict_requeue: Duration,
    /// In-pass restarts after a write conflict
    pub max_conflict_retries: u32,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            registration_requeue: Duration::from_secs(5),
            initialization_requeue: Duration::from_secs(5),
            conflict_requeue: Duration::from_secs(1),
            max_conflict_retries: 3,
        }
    }
}

/// Process-level configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    pub lifecycle: LifecycleConfig,
    /// Fibonacci backoff floor for failed passes
    pub error_backoff_min_seconds: u64,
    /// Fibonacci backoff cap for failed passes
    pub error_backoff_max_seconds: u64,
    /// Machines reconciled in parallel
    pub concurrency: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleConfig::default(),
            error_backoff_min_seconds: 1,
            error_backoff_max_seconds: 300,
            concurrency: 10,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup; unset or empty keys keep their defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let config = Self {
            lifecycle: LifecycleConfig {
                registration_requeue: Duration::from_secs(parse_nonzero(
                    &lookup,
                    "REGISTRATION_REQUEUE_SECONDS",
                    defaults.lifecycle.registration_requeue.as_secs(),
                )?),
                initialization_requeue: Duration::from_secs(parse_nonzero(
                    &lookup,
                    "INITIALIZATION_REQUEUE_SECONDS",
                    defaults.lifecycle.initialization_requeue.as_secs(),
                )?),
                conflict_requeue: Duration::from_secs(parse_nonzero(
                    &lookup,
                    "CONFLICT_REQUEUE_SECONDS",
                    defaults.lifecycle.conflict_requeue.as_secs(),
                )?),
                max_conflict_retries: parse(&lookup, "MAX_CONFLICT_RETRIES", defaults.lifecycle.max_conflict_retries)?,
            },
            error_backoff_min_seconds: parse(&lookup, "ERROR_BACKOFF_MIN_SECONDS", defaults.error_backoff_min_seconds)?,
            error_backoff_max_seconds: parse(&lookup, "ERROR_BACKOFF_MAX_SECONDS", defaults.error_backoff_max_seconds)?,
            concurrency: parse_nonzero(&lookup, "RECONCILE_CONCURRENCY", defaults.concurrency)?,
        };

        if config.error_backoff_min_seconds > config.error_backoff_max_seconds {
            return Err(ControllerError::InvalidConfig(format!(
                "ERROR_BACKOFF_MIN_SECONDS ({}) exceeds ERROR_BACKOFF_MAX_SECONDS ({})",
                config.error_backoff_min_seconds, config.error_backoff_max_seconds
            )));
        }
        Ok(config)
    }
}

fn parse<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr,
    T::Err: Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|e| ControllerError::InvalidConfig(format!("{key}={raw:?}: {e}"))),
        _ => Ok(default),
    }
}

/// Like `parse`, but zero is an error.
fn parse_nonzero<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T, ControllerError>
where
    T: FromStr + Default + PartialEq,
    T::Err: Display,
{
    let value = parse(lookup, key, default)?;
    if value == T::default() {
        return Err(ControllerError::InvalidConfig(format!("{key} must be greater than zero")));
    }
    Ok(value)
}
