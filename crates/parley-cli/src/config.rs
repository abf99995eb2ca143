//! Configuration file support

use parley_api::{ListOptions, client::BASE_URL_ENV_VAR, identity::TOKEN_ENV_VAR};
use parley_session::{SessionConfig, ThreadChangePolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for parley
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Backend base URL
    pub base_url: Option<String>,
    /// Bearer token (alternative to PARLEY_TOKEN)
    pub token: Option<String>,
    /// Upper bound on each backend request, in seconds
    pub request_timeout_secs: Option<u64>,
    /// Messages fetched per history page
    pub page_size: Option<u32>,
    /// Label stored as the model of saved conversations
    pub model_label: Option<String>,
    /// What to do when the assistant switches threads (reject, adopt)
    pub thread_policy: Option<ThreadChangePolicy>,
    /// Conversations shown by /history
    pub history_limit: Option<u32>,
}

impl Config {
    /// Get the config directory
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("parley")
    }

    /// Get the config file path
    pub fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("PARLEY_CONFIG_PATH") {
            return PathBuf::from(path);
        }
        Self::config_dir().join("config.toml")
    }

    /// Load config from file
    pub fn load() -> Self {
        let path = Self::config_path();
        if !path.exists() {
            return Self::default();
        }

        match fs::read_to_string(&path) {
            Ok(content) => Self::parse(&content).unwrap_or_else(|e| {
                eprintln!("Warning: Failed to parse config file: {}", e);
                Self::default()
            }),
            Err(e) => {
                eprintln!("Warning: Failed to read config file: {}", e);
                Self::default()
            }
        }
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Save config to file
    pub fn save(&self) -> std::io::Result<()> {
        let path = Self::config_path();
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }

        let content = toml::to_string_pretty(self).map_err(std::io::Error::other)?;
        fs::write(path, content)
    }

    /// Create a default config file if it doesn't exist
    pub fn init() -> std::io::Result<PathBuf> {
        let path = Self::config_path();
        if path.exists() {
            return Ok(path);
        }

        let default_config = Config {
            base_url: Some("http://localhost:3000/api".to_string()),
            token: None,
            request_timeout_secs: Some(60),
            page_size: Some(25),
            model_label: Some("assistant".to_string()),
            thread_policy: Some(ThreadChangePolicy::Reject),
            history_limit: Some(15),
        };

        default_config.save()?;
        Ok(path)
    }

    /// Base URL: CLI flag, then config, then PARLEY_BASE_URL
    pub fn base_url(&self, cli: Option<String>) -> Option<String> {
        pick(cli, self.base_url.clone(), std::env::var(BASE_URL_ENV_VAR).ok())
    }

    /// Bearer token: CLI flag, then config, then PARLEY_TOKEN
    pub fn token(&self, cli: Option<String>) -> Option<String> {
        pick(cli, self.token.clone(), std::env::var(TOKEN_ENV_VAR).ok())
    }

    /// Session settings, with CLI overrides applied
    pub fn session_config(
        &self,
        timeout_secs: Option<u64>,
        page_size: Option<u32>,
    ) -> SessionConfig {
        let defaults = SessionConfig::default();
        let mut list_options = ListOptions::default();
        if let Some(limit) = self.history_limit {
            list_options.limit = limit;
        }

        SessionConfig {
            page_size: page_size.or(self.page_size).unwrap_or(defaults.page_size),
            request_timeout: timeout_secs
                .or(self.request_timeout_secs)
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            thread_policy: self.thread_policy.unwrap_or_default(),
            model_label: self.model_label.clone().unwrap_or(defaults.model_label),
            list_options,
        }
    }
}

/// First non-blank value in precedence order
fn pick(cli: Option<String>, config: Option<String>, env: Option<String>) -> Option<String> {
    [cli, config, env]
        .into_iter()
        .flatten()
        .find(|v| !v.trim().is_empty())
}

/// Generate example config content
pub fn example_config() -> &'static str {
    r#"# parley configuration file
# Place at ~/.config/parley/config.toml (Linux/Mac) or %APPDATA%\parley\config.toml (Windows)

# Backend base URL (or set PARLEY_BASE_URL)
base_url = "http://localhost:3000/api"

# Bearer token (optional - PARLEY_TOKEN is used when unset)
# token = "..."

# Seconds to wait for any backend request
request_timeout_secs = 60

# Messages fetched per history page
page_size = 25

# Recorded as the model of saved conversations
model_label = "assistant"

# When the assistant answers on a different thread: reject or adopt
thread_policy = "reject"

# Conversations listed by /history
history_limit = 15
"#
}
