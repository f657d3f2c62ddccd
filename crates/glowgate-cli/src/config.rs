//! Configuration – reads/writes `~/.glowgate/config.toml`.

use glowgate_runtime::{LogFormat, TelemetryConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("failed to write config at {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Persisted gateway configuration stored in `~/.glowgate/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// HTTP port of the gateway.
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_bind_address")]
    pub bind_address: IpAddr,

    /// Directory holding the remembered credentials, the boot marker and
    /// the last TNGL program.
    #[serde(default = "default_assets_dir")]
    pub assets_dir: PathBuf,

    /// Firmware image pushed by `/upload-fw`.
    #[serde(default = "default_firmware_path")]
    pub firmware_path: PathBuf,

    /// Delay between a restart request and process exit.
    #[serde(default = "default_restart_grace_ms")]
    pub restart_grace_ms: u64,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    #[serde(default)]
    pub log_format: LogFormat,

    /// Log filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// OTLP/HTTP collector base URL; spans are exported only when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otlp_endpoint: Option<String>,
}

fn default_port() -> u16 {
    8888
}
fn default_bind_address() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}
fn default_assets_dir() -> PathBuf {
    PathBuf::from("assets")
}
fn default_firmware_path() -> PathBuf {
    PathBuf::from("/home/pi/spectoda/fw.enc")
}
fn default_restart_grace_ms() -> u64 {
    10
}
fn default_keep_alive_secs() -> u64 {
    15
}
fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind_address: default_bind_address(),
            assets_dir: default_assets_dir(),
            firmware_path: default_firmware_path(),
            restart_grace_ms: default_restart_grace_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            log_format: LogFormat::default(),
            log_filter: default_log_filter(),
            otlp_endpoint: None,
        }
    }
}

impl Config {
    pub fn restart_grace(&self) -> Duration {
        Duration::from_millis(self.restart_grace_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.keep_alive_secs.max(1))
    }

    /// Telemetry settings for this build of the gateway.
    pub fn telemetry(&self) -> TelemetryConfig {
        TelemetryConfig {
            log_format: self.log_format,
            default_filter: self.log_filter.clone(),
            otlp_endpoint: self.otlp_endpoint.clone(),
            ..TelemetryConfig::new("glowgate", env!("CARGO_PKG_VERSION"))
        }
    }
}

/// Return the path to `~/.glowgate/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".glowgate").join("config.toml")
}

/// Load the config from disk. Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, ConfigError> {
    load_from(&config_path())
}

/// Load the config from a specific path.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let cfg = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(Some(cfg))
}

/// Apply environment variable overrides to `cfg`. Values that do not parse
/// are ignored.
///
/// | Variable | Config field |
/// |---|---|
/// | `PORT` | `port` |
/// | `GLOWGATE_PORT` | `port` (wins over `PORT`) |
/// | `GLOWGATE_BIND_ADDRESS` | `bind_address` |
/// | `GLOWGATE_ASSETS_DIR` | `assets_dir` |
/// | `GLOWGATE_FIRMWARE_PATH` | `firmware_path` |
/// | `GLOWGATE_LOG_FORMAT` | `log_format` (`compact` / `json`) |
/// | `OTEL_EXPORTER_OTLP_ENDPOINT` | `otlp_endpoint` |
pub fn apply_env_overrides(cfg: &mut Config) {
    for var in ["PORT", "GLOWGATE_PORT"] {
        if let Ok(v) = std::env::var(var)
            && let Ok(port) = v.trim().parse::<u16>()
        {
            cfg.port = port;
        }
    }
    if let Ok(v) = std::env::var("GLOWGATE_BIND_ADDRESS")
        && let Ok(address) = v.trim().parse::<IpAddr>()
    {
        cfg.bind_address = address;
    }
    if let Ok(v) = std::env::var("GLOWGATE_ASSETS_DIR") {
        cfg.assets_dir = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("GLOWGATE_FIRMWARE_PATH") {
        cfg.firmware_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("GLOWGATE_LOG_FORMAT")
        && let Ok(format) = v.parse::<LogFormat>()
    {
        cfg.log_format = format;
    }
    if let Ok(v) = std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
        && !v.trim().is_empty()
    {
        cfg.otlp_endpoint = Some(v.trim().to_string());
    }
}

/// Save the config to disk, creating `~/.glowgate/` if necessary.
pub fn save(cfg: &Config) -> Result<(), ConfigError> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let write_err = |source| ConfigError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(write_err)?;
    }
    let raw = toml::to_string_pretty(cfg)?;
    fs::write(path, raw).map_err(write_err)
}
