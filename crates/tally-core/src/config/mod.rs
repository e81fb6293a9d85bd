//! Engine configuration.
//!
//! Read from a JSON file, then overridden by `TALLY_*` environment variables.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::remote::{HttpRemote, RemoteService, UnconfiguredRemote};
use crate::sync::DEFAULT_STUCK_AFTER_ATTEMPTS;
use crate::util::{is_http_url, normalize_text_option};

pub const CONFIG_FILE_NAME: &str = "config.json";

pub const ENV_API_URL: &str = "TALLY_API_URL";
pub const ENV_HTTP_TIMEOUT_SECS: &str = "TALLY_HTTP_TIMEOUT_SECS";
pub const ENV_STUCK_AFTER: &str = "TALLY_STUCK_AFTER";
pub const ENV_OFFLINE: &str = "TALLY_OFFLINE";

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Base URL of the finance API; without it the engine runs local-only
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Failed replays after which an operation is reported as stuck
    #[serde(default = "default_stuck_after_attempts")]
    pub stuck_after_attempts: u32,
    #[serde(default)]
    pub start_offline: bool,
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_stuck_after_attempts() -> u32 {
    DEFAULT_STUCK_AFTER_ATTEMPTS
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_base_url: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            stuck_after_attempts: DEFAULT_STUCK_AFTER_ATTEMPTS,
            start_offline: false,
        }
    }
}

impl EngineConfig {
    /// Load the file at `path` (defaults when missing) and apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = Self::load_from_path(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            Error::Config(format!(
                "Failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        let mut config = serde_json::from_str::<Self>(&raw).map_err(|error| {
            Error::Config(format!(
                "Failed to parse config at {}: {error}",
                path.display()
            ))
        })?;
        config.normalize()?;
        Ok(config)
    }

    pub fn save_to_path(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut normalized = self.clone();
        normalized.normalize()?;
        std::fs::write(path, serde_json::to_string_pretty(&normalized)?)?;
        Ok(())
    }

    /// Apply `TALLY_*` overrides using `lookup` to read variables.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(url) = normalize_text_option(lookup(ENV_API_URL)) {
            self.api_base_url = Some(url);
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_HTTP_TIMEOUT_SECS)) {
            self.request_timeout_secs = parse_env(ENV_HTTP_TIMEOUT_SECS, &raw)?;
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_STUCK_AFTER)) {
            self.stuck_after_attempts = parse_env(ENV_STUCK_AFTER, &raw)?;
        }
        if let Some(raw) = normalize_text_option(lookup(ENV_OFFLINE)) {
            self.start_offline = parse_flag(&raw).ok_or_else(|| {
                Error::Config(format!("{ENV_OFFLINE} must be true or false, got '{raw}'"))
            })?;
        }
        self.normalize()
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// HTTP remote when an API URL is configured, otherwise a remote that always fails.
    pub fn build_remote(&self) -> Result<Arc<dyn RemoteService>> {
        match &self.api_base_url {
            Some(url) => Ok(Arc::new(HttpRemote::new(url, self.request_timeout())?)),
            None => {
                tracing::debug!("No API base URL configured; running local-only");
                Ok(Arc::new(UnconfiguredRemote))
            }
        }
    }

    fn normalize(&mut self) -> Result<()> {
        self.api_base_url = normalize_text_option(self.api_base_url.take())
            .map(|url| url.trim_end_matches('/').to_string());
        if let Some(url) = &self.api_base_url {
            if !is_http_url(url) {
                return Err(Error::Config(format!(
                    "api_base_url must start with http:// or https://, got '{url}'"
                )));
            }
        }
        if self.request_timeout_secs == 0 {
            return Err(Error::Config(
                "request_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.stuck_after_attempts == 0 {
            return Err(Error::Config(
                "stuck_after_attempts must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{key} has an invalid value '{raw}'")))
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
