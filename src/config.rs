//! Store configuration

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

/// How a busy operation is retried. The whole operation reruns from scratch on
/// each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Never less than 1.
    pub attempts: u32,
    /// Sleep before the first retry; doubled for each one after.
    pub backoff: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, backoff: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff,
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay(&self, retry: u32) -> Duration {
        let factor = 1u32 << retry.saturating_sub(1).min(16);
        self.backoff.saturating_mul(factor)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(5, Duration::from_millis(20))
    }
}

/// Store configuration loaded from environment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file
    pub db_path: PathBuf,
    /// How long SQLite waits on a lock before reporting busy
    pub busy_timeout: Duration,
    pub retry: RetryPolicy,
}

impl StoreConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let db_path = match lookup("TOME_DB_PATH") {
            Some(path) => PathBuf::from(path),
            None => default_db_path()?,
        };

        let busy_timeout_ms: u64 = lookup("TOME_BUSY_TIMEOUT_MS")
            .unwrap_or_else(|| "250".to_string())
            .parse()
            .context("TOME_BUSY_TIMEOUT_MS must be a number of milliseconds")?;

        let attempts: u32 = lookup("TOME_RETRY_ATTEMPTS")
            .unwrap_or_else(|| "5".to_string())
            .parse()
            .context("TOME_RETRY_ATTEMPTS must be a positive integer")?;

        let backoff_ms: u64 = lookup("TOME_RETRY_BACKOFF_MS")
            .unwrap_or_else(|| "20".to_string())
            .parse()
            .context("TOME_RETRY_BACKOFF_MS must be a number of milliseconds")?;

        Ok(Self {
            db_path,
            busy_timeout: Duration::from_millis(busy_timeout_ms),
            retry: RetryPolicy::new(attempts, Duration::from_millis(backoff_ms)),
        })
    }

    pub fn with_db_path(mut self, path: PathBuf) -> Self {
        self.db_path = path;
        self
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    let dirs = directories::ProjectDirs::from("", "", "tome-keeper")
        .ok_or_else(|| anyhow::anyhow!("Could not determine data directory"))?;
    Ok(dirs.data_dir().join("tome.db"))
}
