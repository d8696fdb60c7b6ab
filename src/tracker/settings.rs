use std::fmt::Display;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Smallest idle timeout idle providers accept.
pub const MIN_IDLE_TIMEOUT_SECONDS: u64 = 15;

/// User facing feature flags. Persisted as the `settings` object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub enable_time_limits: bool,
    pub enable_idle_detection: bool,
    /// Seconds without input before the user is considered idle.
    #[serde(alias = "idleTimeout")]
    pub idle_timeout_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            enable_time_limits: false,
            enable_idle_detection: true,
            idle_timeout_seconds: 300,
        }
    }
}

/// Partial settings sent by `updateSettings`. Missing fields keep their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsPatch {
    #[serde(default)]
    pub enable_time_limits: Option<bool>,
    #[serde(default)]
    pub enable_idle_detection: Option<bool>,
    #[serde(default, alias = "idleTimeout")]
    pub idle_timeout_seconds: Option<u64>,
}

impl Settings {
    pub fn merge(&mut self, patch: SettingsPatch) -> Result<()> {
        if let Some(timeout) = patch.idle_timeout_seconds {
            if timeout < MIN_IDLE_TIMEOUT_SECONDS {
                bail!("Idle timeout must be at least {MIN_IDLE_TIMEOUT_SECONDS} seconds, got {timeout}");
            }
            self.idle_timeout_seconds = timeout;
        }
        if let Some(v) = patch.enable_time_limits {
            self.enable_time_limits = v;
        }
        if let Some(v) = patch.enable_idle_detection {
            self.enable_idle_detection = v;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Work,
    Social,
    Entertainment,
    #[default]
    Other,
}

impl Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Work => write!(f, "work"),
            Category::Social => write!(f, "social"),
            Category::Entertainment => write!(f, "entertainment"),
            Category::Other => write!(f, "other"),
        }
    }
}
