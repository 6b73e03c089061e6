use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use vcs::{ClientConfig, StatusFormat};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid model config: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("invalid model config: {0}")]
    Invalid(String),
}

/// Bounded exponential backoff used while the lock marker exists
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct LockBackoff {
    pub initial_delay_ms: u64,
    pub multiplier: f64,
    pub max_attempts: u32,
}

impl Default for LockBackoff {
    fn default() -> Self {
        Self {
            initial_delay_ms: 100,
            multiplier: 1.4,
            max_attempts: 10,
        }
    }
}

impl LockBackoff {
    /// Delay before re-polling after `attempt` failed polls (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let ms = self.initial_delay_ms as f64 * self.multiplier.powi(attempt as i32);
        Duration::from_millis(ms.round() as u64)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub executable: String,
    pub status_format: StatusFormat,
    /// Metadata directory name under the working-copy root
    pub metadata_dir: String,
    /// Lock marker file name inside the metadata directory
    pub lock_file: String,
    pub refresh_debounce_ms: u64,
    pub refresh_cooldown_ms: u64,
    pub annotation_invalidate_debounce_ms: u64,
    pub lock_backoff: LockBackoff,
    pub watch_filesystem: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            executable: "git".to_string(),
            status_format: StatusFormat::TwoColumn,
            metadata_dir: ".git".to_string(),
            lock_file: "index.lock".to_string(),
            refresh_debounce_ms: 1000,
            refresh_cooldown_ms: 5000,
            annotation_invalidate_debounce_ms: 1000,
            lock_backoff: LockBackoff::default(),
            watch_filesystem: true,
        }
    }
}

impl ModelConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.executable.trim().is_empty() {
            return Err(ConfigError::Invalid("executable must not be empty".into()));
        }
        if self.metadata_dir.is_empty() || self.lock_file.is_empty() {
            return Err(ConfigError::Invalid(
                "metadata_dir and lock_file must not be empty".into(),
            ));
        }
        if self.lock_backoff.multiplier < 1.0 {
            return Err(ConfigError::Invalid(
                "lock_backoff.multiplier must be at least 1.0".into(),
            ));
        }
        Ok(())
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            executable: self.executable.clone(),
            status_format: self.status_format,
            ..ClientConfig::default()
        }
    }

    pub fn refresh_debounce(&self) -> Duration {
        Duration::from_millis(self.refresh_debounce_ms)
    }

    pub fn refresh_cooldown(&self) -> Duration {
        Duration::from_millis(self.refresh_cooldown_ms)
    }

    pub fn annotation_invalidate_debounce(&self) -> Duration {
        Duration::from_millis(self.annotation_invalidate_debounce_ms)
    }
}
