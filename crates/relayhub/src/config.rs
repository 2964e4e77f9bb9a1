//! Configuration loading.
//!
//! Layered as: built-in defaults, then `config.toml`, then `RELAYHUB__*`
//! environment variables (`RELAYHUB__RELAY__PENDING_TTL_SECS=30`).

use std::env;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use config::{Config, Environment, File, FileFormat};
use log::info;
use serde::{Deserialize, Serialize};

use crate::relay::RequestIdStrategy;

pub const APP_NAME: &str = "relayhub";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub logging: LoggingConfig,
    pub server: ServerConfig,
    pub relay: RelayConfig,
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
    /// Host address to bind to
    pub host: String,
    /// Port to listen on
    pub port: u16,
    /// Seconds between WebSocket pings
    pub ping_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
            ping_interval_secs: 30,
        }
    }
}

impl ServerConfig {
    pub fn ping_interval(&self) -> Duration {
        Duration::from_secs(self.ping_interval_secs.max(1))
    }
}

/// Relay core settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    /// Seconds a forwarded request may wait for its response; 0 keeps requests forever.
    pub pending_ttl_secs: u64,
    /// Seconds between sweeps for expired requests.
    pub sweep_interval_secs: u64,
    /// Send `request_timeout` to the requester when a request expires.
    pub notify_on_timeout: bool,
    /// Correlation id format.
    pub request_ids: RequestIdStrategy,
    /// Upper bound for each agent's keylog buffer; 0 for none.
    pub max_keylog_bytes: usize,
    /// Outbound queue length per connection.
    pub connection_buffer: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            pending_ttl_secs: 60,
            sweep_interval_secs: 5,
            notify_on_timeout: true,
            request_ids: RequestIdStrategy::Uuid,
            max_keylog_bytes: 1024 * 1024,
            connection_buffer: 64,
        }
    }
}

impl RelayConfig {
    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

// ============================================================================
// Paths
// ============================================================================

#[derive(Debug, Clone)]
pub struct AppPaths {
    pub config_file: PathBuf,
}

impl AppPaths {
    pub fn discover(override_path: Option<PathBuf>) -> Result<Self> {
        let config_file = match override_path {
            Some(path) => {
                let expanded = expand_path(path)?;
                if expanded.is_dir() {
                    expanded.join("config.toml")
                } else {
                    expanded
                }
            }
            None => default_config_dir()?.join("config.toml"),
        };

        if config_file.parent().is_none() {
            return Err(anyhow!("invalid config file path: {config_file:?}"));
        }

        Ok(Self { config_file })
    }
}

impl fmt::Display for AppPaths {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "config: {}", self.config_file.display())
    }
}

// ============================================================================
// Loading
// ============================================================================

/// Load the effective configuration, writing a default file first if none exists.
pub fn load_or_init_config(paths: &AppPaths, dry_run: bool) -> Result<AppConfig> {
    if !paths.config_file.exists() {
        if dry_run {
            info!(
                "dry-run: would create default config at {}",
                paths.config_file.display()
            );
        } else {
            write_default_config(&paths.config_file)?;
        }
    }

    load_config(&paths.config_file, &env_prefix())
}

/// Load configuration from `file` (optional) and environment variables under `prefix`.
pub fn load_config(file: &Path, prefix: &str) -> Result<AppConfig> {
    let defaults = RelayConfig::default();
    let built = Config::builder()
        .set_default("logging.level", "info")?
        .set_default("relay.pending_ttl_secs", defaults.pending_ttl_secs as i64)?
        .set_default("relay.sweep_interval_secs", defaults.sweep_interval_secs as i64)?
        .add_source(File::from(file).format(FileFormat::Toml).required(false))
        .add_source(Environment::with_prefix(prefix).separator("__"))
        .build()
        .context("building configuration")?;

    built
        .try_deserialize()
        .context("deserializing configuration")
}

/// Write the default configuration to `path`, refusing to replace an existing
/// file unless `force` is set.
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(anyhow!(
            "config already exists at {} (use --force to overwrite)",
            path.display()
        ));
    }
    write_default_config(path)
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
    buffer.push_str("\n\n");
    buffer
}

fn expand_path(path: PathBuf) -> Result<PathBuf> {
    if let Some(text) = path.to_str() {
        let expanded = shellexpand::full(text).context("expanding path")?;
        Ok(PathBuf::from(expanded.to_string()))
    } else {
        Ok(path)
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Some(dir) = env::var_os("XDG_CONFIG_HOME").filter(|v| !v.is_empty()) {
        return Ok(PathBuf::from(dir).join(APP_NAME));
    }

    if let Some(dir) = dirs::config_dir() {
        return Ok(dir.join(APP_NAME));
    }

    dirs::home_dir()
        .map(|home| home.join(".config").join(APP_NAME))
        .ok_or_else(|| anyhow!("unable to determine configuration directory"))
}

/// Environment variable prefix derived from the app name.
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
