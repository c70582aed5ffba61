//! Configuration for the outbox.

use crate::{OutboxError, OutboxResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::warn;

/// Default delay before resending a rate-limited message.
pub const DEFAULT_RESEND_DELAY_MS: u64 = 5000;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

const ENV_RESEND_DELAY_MS: &str = "RADIO_OUTBOX_RESEND_DELAY_MS";
const ENV_MAX_RATE_LIMIT_RETRIES: &str = "RADIO_OUTBOX_MAX_RATE_LIMIT_RETRIES";
const ENV_LOG_LEVEL: &str = "RADIO_OUTBOX_LOG_LEVEL";

/// Outbox configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// Fixed delay before resending after a rate-limit rejection.
    #[serde(default = "default_resend_delay_ms")]
    pub resend_delay_ms: u64,
    /// Rate-limit rejections tolerated per message before it is failed.
    /// `None` retries forever.
    #[serde(default)]
    pub max_rate_limit_retries: Option<u32>,
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_resend_delay_ms() -> u64 {
    DEFAULT_RESEND_DELAY_MS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            resend_delay_ms: DEFAULT_RESEND_DELAY_MS,
            max_rate_limit_retries: None,
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl OutboxConfig {
    /// Create a new config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from `path` if it exists, falling back to defaults.
    /// Environment variables win over both.
    pub fn load(path: &Path) -> OutboxResult<Self> {
        let mut config = if path.exists() {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.load_from_env();
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific JSON file.
    pub fn load_from_file(path: &Path) -> OutboxResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: OutboxConfig = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration as pretty JSON, creating parent directories.
    pub fn save(&self, path: &Path) -> OutboxResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn resend_delay(&self) -> Duration {
        Duration::from_millis(self.resend_delay_ms)
    }

    pub fn validate(&self) -> OutboxResult<()> {
        if self.resend_delay_ms == 0 {
            return Err(OutboxError::Config(
                "resend_delay_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    fn load_from_env(&mut self) {
        if let Some(delay) = parse_env::<u64>(ENV_RESEND_DELAY_MS) {
            self.resend_delay_ms = delay;
        }
        if let Some(max) = parse_env::<u32>(ENV_MAX_RATE_LIMIT_RETRIES) {
            self.max_rate_limit_retries = Some(max);
        }
        if let Ok(level) = std::env::var(ENV_LOG_LEVEL) {
            let level = level.trim();
            if !level.is_empty() {
                self.log_level = level.to_string();
            }
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str) -> Option<T> {
    let raw = std::env::var(name).ok()?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %trimmed, "Ignoring unparsable environment override");
            None
        }
    }
}
