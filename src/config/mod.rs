use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub assistant: AssistantConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            data_dir: default_data_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./data")
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthConfig {
    /// Email for the bootstrap admin account (created on first start)
    pub admin_email: Option<String>,
    /// Password for the bootstrap admin account
    pub admin_password: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistantConfig {
    /// API key for the external text-generation service. Falls back to the
    /// TICKETR_ASSISTANT_API_KEY environment variable. When absent, the
    /// assistant channel is disabled and message sending works normally.
    pub api_key: Option<String>,
    #[serde(default = "default_assistant_base_url")]
    pub base_url: String,
    #[serde(default = "default_assistant_model")]
    pub model: String,
    /// Request timeout in seconds; expiry is treated as a soft failure
    #[serde(default = "default_assistant_timeout")]
    pub timeout_secs: u64,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_assistant_base_url(),
            model: default_assistant_model(),
            timeout_secs: default_assistant_timeout(),
        }
    }
}

fn default_assistant_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_assistant_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_assistant_timeout() -> u64 {
    15
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
        let mut config = if path.exists() {
            info!("Loading configuration from {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            toml::from_str(&content).with_context(|| "Failed to parse configuration file")?
        } else {
            info!("No config file found, using defaults");
            Config::default()
        };

        // Environment variable wins over the config file for the secret
        if let Ok(key) = std::env::var("TICKETR_ASSISTANT_API_KEY") {
            if !key.is_empty() {
                config.assistant.api_key = Some(key);
            }
        }

        Ok(config)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            auth: AuthConfig::default(),
            assistant: AssistantConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
