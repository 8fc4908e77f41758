use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub credentials: CredentialConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the gallery service
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// How the session credential is attached to requests
    #[serde(default = "default_auth_scheme")]
    pub auth_scheme: AuthScheme,
    /// Cookie name used when `auth_scheme = "cookie"`
    #[serde(default = "default_cookie_name")]
    pub cookie_name: String,
    /// Request timeout in seconds (default: 30)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            auth_scheme: default_auth_scheme(),
            cookie_name: default_cookie_name(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:3001".to_string()
}

fn default_auth_scheme() -> AuthScheme {
    AuthScheme::Bearer
}

fn default_cookie_name() -> String {
    "session".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

/// How the session credential travels with each request.
///
/// Deployments behind a cookie-issuing reverse proxy use `cookie`;
/// everything else uses the `Authorization: Bearer` header.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    Bearer,
    Cookie,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    /// Where the session token is persisted between runs
    #[serde(default = "default_token_file")]
    pub token_file: PathBuf,
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            token_file: default_token_file(),
        }
    }
}

fn default_token_file() -> PathBuf {
    PathBuf::from("./data/token")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            let config: Config = toml::from_str(&content)
                .with_context(|| "Failed to parse configuration file")?;
            Ok(config)
        } else {
            info!("No config file found, using defaults");
            Ok(Config::default())
        }
    }

    pub fn default() -> Self {
        Self {
            api: ApiConfig::default(),
            credentials: CredentialConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
