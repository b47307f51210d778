//! Client configuration management.
//!
//! This module handles loading and saving the client configuration: the
//! backend base URL, request timeout, retry policy, authentication routes
//! and where the session token is kept.
//!
//! Configuration is stored at `~/.config/the-librarian/config.json`.
//! `LIBRARIAN_API_URL` and `LIBRARIAN_TOKEN_STORAGE` override the file.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

/// Application name used for config/data directory paths
pub const APP_NAME: &str = "the-librarian";

/// Config file name
const CONFIG_FILE: &str = "config.json";

const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// HTTP request timeout in seconds.
/// Generous enough to ride out a backend cold start.
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Attempts for login/register/refresh calls
const AUTH_MAX_ATTEMPTS: u32 = 3;

/// Attempts for every other call
const MAX_ATTEMPTS: u32 = 2;

/// Initial backoff delay in milliseconds, doubled per retry
const INITIAL_BACKOFF_MS: u64 = 1000;

const ENV_API_URL: &str = "LIBRARIAN_API_URL";
const ENV_TOKEN_STORAGE: &str = "LIBRARIAN_TOKEN_STORAGE";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
    pub retry: RetryPolicy,
    pub routes: AuthRoutes,
    pub token_storage: TokenStorage,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout_secs: REQUEST_TIMEOUT_SECS,
            retry: RetryPolicy::default(),
            routes: AuthRoutes::default(),
            token_storage: TokenStorage::default(),
        }
    }
}

/// Transport retry budgets. The numbers are tuning, not contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts for authentication endpoints
    pub auth_max_attempts: u32,
    /// Total attempts for general endpoints
    pub max_attempts: u32,
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            auth_max_attempts: AUTH_MAX_ATTEMPTS,
            max_attempts: MAX_ATTEMPTS,
            base_delay_ms: INITIAL_BACKOFF_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthRoutes {
    pub login: String,
    pub register: String,
    pub refresh: String,
    pub logout: String,
    pub me: String,
}

impl Default for AuthRoutes {
    fn default() -> Self {
        Self {
            login: "/auth/login".to_string(),
            register: "/auth/register".to_string(),
            refresh: "/auth/refresh".to_string(),
            logout: "/auth/logout".to_string(),
            me: "/auth/me".to_string(),
        }
    }
}

impl AuthRoutes {
    /// Login, register and refresh: never repaired by a refresh, and given
    /// the larger retry budget.
    pub fn is_auth_endpoint(&self, path: &str) -> bool {
        let route = path.split(['?', '#']).next().unwrap_or(path);
        let route = route.trim_end_matches('/');
        [&self.login, &self.register, &self.refresh]
            .iter()
            .any(|r| r.trim_end_matches('/') == route)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStorage {
    /// `session.json` in the data directory
    #[default]
    File,
    /// OS keychain
    Keyring,
    /// Process memory only
    Memory,
}

impl FromStr for TokenStorage {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(TokenStorage::File),
            "keyring" => Ok(TokenStorage::Keyring),
            "memory" => Ok(TokenStorage::Memory),
            other => bail!("Unknown token storage '{}' (expected file, keyring or memory)", other),
        }
    }
}

impl ClientConfig {
    /// Load from the default location, falling back to defaults, then apply
    /// environment overrides.
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse config file {}", path.display()))
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Apply overrides from a key lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_URL).filter(|v| !v.trim().is_empty()) {
            self.base_url = url.trim().to_string();
        }
        if let Some(storage) = lookup(ENV_TOKEN_STORAGE).filter(|v| !v.trim().is_empty()) {
            self.token_storage = storage
                .parse()
                .with_context(|| format!("Invalid {}", ENV_TOKEN_STORAGE))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.as_str();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            bail!("base_url must be an absolute http(s) URL, got '{}'", url);
        }
        if reqwest::Url::parse(url).is_err() {
            bail!("base_url '{}' is not a valid URL", url);
        }
        if self.retry.auth_max_attempts == 0 || self.retry.max_attempts == 0 {
            bail!("retry attempt budgets must be at least 1");
        }
        if self.request_timeout_secs == 0 {
            bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Absolute URL for a relative API route.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find config directory"))?;
        Ok(config_dir.join(APP_NAME).join(CONFIG_FILE))
    }

    /// Directory holding the file-backed session token
    pub fn data_dir() -> Result<PathBuf> {
        let data_dir = dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?;
        Ok(data_dir.join(APP_NAME))
    }
}
