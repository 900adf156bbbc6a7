//! Session options and validation.
//!
//! These are pure configuration types with no infrastructure dependencies.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{GameId, RetryPolicy};
use crate::error::{ModError, ModResult};

/// Default number of attempts an entry gets per session.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default scheduler idle interval.
pub const DEFAULT_IDLE_INTERVAL_MS: u64 = 1_000;

/// Default number of loop waits between background reconciliations.
pub const DEFAULT_RECONCILE_EVERY: u32 = 15;

/// Catalog environment the session talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    #[default]
    Live,
    Test,
}

/// Minimum severity of log lines forwarded to the host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warning,
    Error,
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Self::TRACE,
            LogLevel::Debug => Self::DEBUG,
            LogLevel::Info => Self::INFO,
            LogLevel::Warning => Self::WARN,
            LogLevel::Error => Self::ERROR,
        }
    }
}

impl From<&tracing::Level> for LogLevel {
    fn from(level: &tracing::Level) -> Self {
        match *level {
            tracing::Level::TRACE => Self::Trace,
            tracing::Level::DEBUG => Self::Debug,
            tracing::Level::INFO => Self::Info,
            tracing::Level::WARN => Self::Warning,
            tracing::Level::ERROR => Self::Error,
        }
    }
}

/// Options a session is initialized with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    pub game_id: GameId,
    pub api_key: String,
    pub environment: Environment,
    /// Root for per-install metadata and mod content. Defaults to
    /// `<local data dir>/modsync/<game id>`.
    pub root_directory: Option<PathBuf>,
    /// Override for per-user data. Defaults to `<root>/user`.
    pub user_data_directory: Option<PathBuf>,
    /// Bytes installed mods may occupy. `None` means unlimited.
    pub mod_storage_quota: Option<u64>,
    /// Bytes temporary mods may occupy. `None` means unlimited.
    pub temp_mod_storage_quota: Option<u64>,
    pub max_retries: u32,
    pub retry_backoff_base_ms: u64,
    pub idle_interval_ms: u64,
    /// Loop iterations between background reconciliations.
    pub reconcile_every: u32,
    pub rate_limit_cooldown_secs: u64,
    pub log_level: LogLevel,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            game_id: GameId::new(0),
            api_key: String::new(),
            environment: Environment::Live,
            root_directory: None,
            user_data_directory: None,
            mod_storage_quota: None,
            temp_mod_storage_quota: None,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_backoff_base_ms: 2_000,
            idle_interval_ms: DEFAULT_IDLE_INTERVAL_MS,
            reconcile_every: DEFAULT_RECONCILE_EVERY,
            rate_limit_cooldown_secs: 60,
            log_level: LogLevel::Info,
        }
    }
}

impl SessionOptions {
    /// Options for `game_id` authenticated with `api_key`.
    pub fn new(game_id: GameId, api_key: impl Into<String>) -> Self {
        Self {
            game_id,
            api_key: api_key.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub const fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    #[must_use]
    pub fn with_root_directory(mut self, root: impl Into<PathBuf>) -> Self {
        self.root_directory = Some(root.into());
        self
    }

    #[must_use]
    pub fn with_user_data_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.user_data_directory = Some(dir.into());
        self
    }

    #[must_use]
    pub const fn with_mod_storage_quota(mut self, bytes: u64) -> Self {
        self.mod_storage_quota = Some(bytes);
        self
    }

    #[must_use]
    pub const fn with_temp_mod_storage_quota(mut self, bytes: u64) -> Self {
        self.temp_mod_storage_quota = Some(bytes);
        self
    }

    #[must_use]
    pub const fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    #[must_use]
    pub const fn with_retry_backoff_base(mut self, base: Duration) -> Self {
        self.retry_backoff_base_ms = duration_ms(base);
        self
    }

    #[must_use]
    pub const fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.idle_interval_ms = duration_ms(interval);
        self
    }

    #[must_use]
    pub const fn with_reconcile_every(mut self, slots: u32) -> Self {
        self.reconcile_every = slots;
        self
    }

    #[must_use]
    pub const fn with_rate_limit_cooldown(mut self, cooldown: Duration) -> Self {
        self.rate_limit_cooldown_secs = cooldown.as_secs();
        self
    }

    #[must_use]
    pub const fn with_log_level(mut self, level: LogLevel) -> Self {
        self.log_level = level;
        self
    }

    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.retry_backoff_base_ms),
        }
    }

    pub const fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    pub const fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

#[allow(clippy::cast_possible_truncation)]
const fn duration_ms(d: Duration) -> u64 {
    d.as_millis() as u64
}

/// Validate options before a session is started.
pub fn validate_options(options: &SessionOptions) -> ModResult<()> {
    if !options.game_id.is_valid() {
        return Err(ModError::invalid_parameters(format!(
            "invalid game id {}",
            options.game_id
        )));
    }

    if options.api_key.trim().is_empty() {
        return Err(ModError::invalid_parameters("api key is empty"));
    }

    if options.mod_storage_quota == Some(0) {
        return Err(ModError::invalid_parameters("mod storage quota is zero"));
    }

    if options.temp_mod_storage_quota == Some(0) {
        return Err(ModError::invalid_parameters(
            "temp mod storage quota is zero",
        ));
    }

    if options.reconcile_every == 0 {
        return Err(ModError::invalid_parameters(
            "reconciliation cadence must be at least one wait slot",
        ));
    }

    Ok(())
}
