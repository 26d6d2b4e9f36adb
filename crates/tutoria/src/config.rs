//! Layered configuration: defaults, then the TOML file, then `TUTORIA__*`
//! environment variables.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::api::{AppState, DEFAULT_MAX_MESSAGE_BYTES};
use crate::ws::{ConnectionOptions, DEFAULT_SEND_TIMEOUT};

pub const APP_NAME: &str = "tutoria";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub connection: ConnectionConfig,
}

impl AppConfig {
    /// Shared handler state for a server built from this configuration.
    pub fn app_state(&self) -> AppState {
        AppState::new(self.connection.options())
            .with_max_message_bytes(self.connection.max_message_bytes)
            .with_cors_origins(self.server.cors_origins.clone())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Allowed CORS origins. Empty allows any origin.
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Send a confirmation frame when a connection is accepted.
    pub send_confirmation: bool,
    /// Seconds between server pings; 0 disables the heartbeat.
    pub ping_interval_secs: u64,
    /// Seconds a silent peer is tolerated after a missed ping.
    pub pong_timeout_secs: u64,
    /// Seconds a single write to a peer may take before it is dropped.
    pub send_timeout_secs: u64,
    /// Largest inbound WebSocket message in bytes.
    pub max_message_bytes: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            send_confirmation: true,
            ping_interval_secs: 20,
            pong_timeout_secs: 10,
            send_timeout_secs: DEFAULT_SEND_TIMEOUT.as_secs(),
            max_message_bytes: DEFAULT_MAX_MESSAGE_BYTES,
        }
    }
}

impl ConnectionConfig {
    pub fn options(&self) -> ConnectionOptions {
        ConnectionOptions {
            send_confirmation: self.send_confirmation,
            ping_interval: (self.ping_interval_secs > 0)
                .then_some(Duration::from_secs(self.ping_interval_secs)),
            pong_timeout: Duration::from_secs(self.pong_timeout_secs),
            send_timeout: Duration::from_secs(self.send_timeout_secs.max(1)),
        }
    }
}

/// Load the configuration, layering the file at `path` (if present) and
/// the environment over the built-in defaults.
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let defaults = AppConfig::default();
    let built = Config::builder()
        .set_default("logging.level", defaults.logging.level)?
        .set_default("server.host", defaults.server.host)?
        .set_default("server.port", i64::from(defaults.server.port))?
        .add_source(
            File::from(path)
                .format(FileFormat::Toml)
                .required(false),
        )
        .add_source(
            Environment::with_prefix(env_prefix().as_str())
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("server.cors_origins"),
        )
        .build()
        .with_context(|| format!("loading configuration from {}", path.display()))?;

    built
        .try_deserialize()
        .context("deserializing configuration")
}

/// Load the configuration, writing a default file first if none exists.
pub fn load_or_init_config(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        write_default_config(path)?;
    }
    load_config(path)
}

pub fn write_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating config directory {parent:?}"))?;
    }

    let config = AppConfig::default();
    let toml = toml::to_string_pretty(&config).context("serializing default config to TOML")?;
    let mut body = default_config_header(path);
    body.push_str(&toml);
    fs::write(path, body).with_context(|| format!("writing config file to {}", path.display()))
}

fn default_config_header(path: &Path) -> String {
    let mut buffer = String::new();
    buffer.push_str("# Configuration for ");
    buffer.push_str(APP_NAME);
    buffer.push('\n');
    buffer.push_str("# File: ");
    buffer.push_str(&path.display().to_string());
    buffer.push('\n');
    buffer.push_str("# Environment overrides: ");
    buffer.push_str(&env_prefix());
    buffer.push_str("__SECTION__KEY\n");
    buffer.push('\n');
    buffer
}

/// Config file path: `override_path` (with `~` and variables expanded) or
/// the default location.
pub fn config_file_path(override_path: Option<&Path>) -> Result<PathBuf> {
    match override_path {
        Some(path) => match path.to_str() {
            Some(text) => expand_str_path(text),
            None => Ok(path.to_path_buf()),
        },
        None => Ok(default_config_dir()?.join("config.toml")),
    }
}

pub fn expand_str_path(text: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(text).context("expanding path")?;
    Ok(PathBuf::from(expanded.to_string()))
}

pub fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        let mut path = PathBuf::from(dir);
        path.push(APP_NAME);
        return Ok(path);
    }

    if let Some(mut dir) = dirs::config_dir() {
        dir.push(APP_NAME);
        return Ok(dir);
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

pub fn env_prefix() -> String {
    APP_NAME
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}
