//! Configuration management for AutoPrompter
//!
//! Holds the shared [`Settings`] record owned by the coordinator and the
//! process-level [`AppConfig`] read from the platform config directory.
//! Supports Windows, macOS, and Linux.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Prompt used when none is configured
pub const DEFAULT_PROMPT: &str = "continue";

/// Upper bound accepted for the session time limit, in minutes
pub const MAX_TIME_LIMIT_MINUTES: u32 = 1440;

/// Upper bound accepted for the per-session prompt limit
pub const MAX_PROMPT_LIMIT: u32 = 100;

/// Errors raised when a settings record fails validation
#[derive(Debug, Error, PartialEq)]
pub enum SettingsError {
    /// Time limit outside 1..=1440 minutes
    #[error("Time limit must be between 1 and 1440 minutes, got {0}")]
    TimeLimitOutOfRange(u32),

    /// Prompt limit outside 1..=100
    #[error("Prompt limit must be between 1 and 100, got {0}")]
    PromptLimitOutOfRange(u32),
}

/// The single settings record shared by every component
///
/// Stored wholesale; callers read, modify and write back the full record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    /// Text injected into the chat input
    pub custom_prompt: String,
    /// Master switch; automation is a no-op when false
    pub is_enabled: bool,
    /// Session duration ceiling in minutes
    #[serde(rename = "timeLimit", alias = "timeLimitMinutes")]
    pub time_limit_minutes: u32,
    /// Maximum submissions per session
    pub prompt_limit: u32,
    /// Stored for the settings surfaces; the agent always submits
    pub auto_submit: bool,
    /// URL prefixes on which automation may run
    #[serde(default)]
    pub allowed_sites: Vec<String>,
}

/// Chat sites allowed out of the box
pub fn default_allowed_sites() -> Vec<String> {
    [
        "https://chat.openai.com",
        "https://bard.google.com",
        "https://claude.ai",
        "https://chat.anthropic.com",
        "https://poe.com",
        "https://you.com",
        "https://chat.bing.com",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            custom_prompt: DEFAULT_PROMPT.to_string(),
            is_enabled: false,
            time_limit_minutes: 60,
            prompt_limit: 10,
            auto_submit: true,
            allowed_sites: default_allowed_sites(),
        }
    }
}

impl Settings {
    /// Session time limit in milliseconds
    pub fn time_limit_ms(&self) -> i64 {
        i64::from(self.time_limit_minutes) * 60 * 1000
    }

    /// Prompt to inject, falling back to [`DEFAULT_PROMPT`] when blank
    pub fn effective_prompt(&self) -> &str {
        if self.custom_prompt.is_empty() {
            DEFAULT_PROMPT
        } else {
            &self.custom_prompt
        }
    }

    /// Checks the limits the settings surfaces allow
    pub fn validate(&self) -> Result<(), SettingsError> {
        if !(1..=MAX_TIME_LIMIT_MINUTES).contains(&self.time_limit_minutes) {
            return Err(SettingsError::TimeLimitOutOfRange(self.time_limit_minutes));
        }
        if !(1..=MAX_PROMPT_LIMIT).contains(&self.prompt_limit) {
            return Err(SettingsError::PromptLimitOutOfRange(self.prompt_limit));
        }
        Ok(())
    }

    /// Adds a site prefix. Blank and duplicate entries are ignored.
    ///
    /// Returns true if the list changed.
    pub fn add_allowed_site(&mut self, site: &str) -> bool {
        let site = site.trim();
        if site.is_empty() || self.allowed_sites.iter().any(|s| s == site) {
            return false;
        }
        self.allowed_sites.push(site.to_string());
        true
    }

    /// Removes an exact site prefix; returns true if it was present
    pub fn remove_allowed_site(&mut self, site: &str) -> bool {
        let before = self.allowed_sites.len();
        self.allowed_sites.retain(|s| s != site);
        self.allowed_sites.len() != before
    }
}

/// Process configuration for the coordinator daemon
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    /// Directory holding the persisted storage areas
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,
    /// Seconds between time-limit evaluations
    #[serde(default = "default_quota_check_interval")]
    pub quota_check_interval_secs: u64,
    /// Seconds between injection cycles of a page agent
    #[serde(default = "default_injection_interval")]
    pub injection_interval_secs: u64,
}

fn default_quota_check_interval() -> u64 {
    60
}

fn default_injection_interval() -> u64 {
    5
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            quota_check_interval_secs: default_quota_check_interval(),
            injection_interval_secs: default_injection_interval(),
        }
    }
}

impl AppConfig {
    /// Gets the config directory path (cross-platform)
    pub fn config_dir() -> Option<PathBuf> {
        #[cfg(target_os = "windows")]
        {
            std::env::var("APPDATA")
                .ok()
                .map(|p| PathBuf::from(p).join("AutoPrompter"))
        }

        #[cfg(target_os = "macos")]
        {
            std::env::var("HOME")
                .ok()
                .map(|p| PathBuf::from(p).join("Library/Application Support/AutoPrompter"))
        }

        #[cfg(target_os = "linux")]
        {
            std::env::var("XDG_CONFIG_HOME")
                .ok()
                .map(PathBuf::from)
                .or_else(|| std::env::var("HOME").ok().map(|p| PathBuf::from(p).join(".config")))
                .map(|p| p.join("autoprompter"))
        }

        #[cfg(not(any(target_os = "windows", target_os = "macos", target_os = "linux")))]
        {
            None
        }
    }

    /// Gets the config file path
    fn config_path() -> Option<PathBuf> {
        let config_dir = Self::config_dir()?;

        if !config_dir.exists() {
            fs::create_dir_all(&config_dir).ok()?;
        }

        Some(config_dir.join("config.json"))
    }

    /// Loads `config.json` from the config directory, falling back to defaults
    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Loads a config file; a missing or malformed file yields the defaults
    pub fn load_from(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        serde_json::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Ignoring malformed config {}: {}", path.display(), e);
            Self::default()
        })
    }

    /// Writes `config.json` to the config directory and returns its path
    pub fn save(&self) -> Result<PathBuf, String> {
        let path = Self::config_path().ok_or("Could not determine config path")?;
        self.save_to(&path)?;
        Ok(path)
    }

    /// Writes the config pretty-printed to `path`
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| format!("Failed to serialize config: {}", e))?;
        fs::write(path, content)
            .map_err(|e| format!("Failed to write {}: {}", path.display(), e))
    }

    /// Directory for the storage areas: the configured one, else `<config dir>/data`
    pub fn resolved_data_dir(&self) -> Option<PathBuf> {
        self.data_dir
            .clone()
            .or_else(|| Self::config_dir().map(|p| p.join("data")))
    }
}
