//! Runtime configuration loading.
//!
//! Values come from an optional TOML file named by `MSGPORT_CONFIG`, then
//! from `MSGPORT_*` environment variables, which win. Invalid environment
//! values fall back to the file or built-in value without crashing.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |---|---|---|
//! | `MSGPORT_CONFIG` | unset | TOML file with `[server]` and `[log]` tables |
//! | `MSGPORT_BIND_IP` | 127.0.0.1 | Comma-separated bind addresses |
//! | `MSGPORT_PORT` | 27017 | Listen port (0 = ephemeral) |
//! | `MSGPORT_QUIET` | false | Suppress end-of-connection lines |
//! | `MSGPORT_MAX_CONNECTIONS` | 819 | Max concurrent connections |
//! | `MSGPORT_FRAME_LIMIT` | 50331648 | Max frame size (bytes) |
//! | `MSGPORT_REJECT_BACKOFF_MS` | 2 | Pause after a rejected connection |
//! | `MSGPORT_TIME_TRACKER` | true | First listener refreshes the coarse clock |
//! | `MSGPORT_SHUTDOWN_TIMEOUT_MS` | 10000 | Drain wait on shutdown |
//! | `MSGPORT_LOG` | info | Log filter directive |
//! | `MSGPORT_LOG_FORMAT` | json | `json` or `pretty` |

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::net::ServerConfig;
use crate::telemetry::{LogConfig, LogFormat};

pub use crate::net::port::MIN_FRAME_LIMIT;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Layout of the TOML file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FileConfig {
    pub server: ServerConfig,
    pub log: LogConfig,
}

/// Effective runtime configuration summary (serializable).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveConfig {
    pub bind_ip: String,
    pub port: u16,
    pub quiet: bool,
    pub max_connections: usize,
    pub frame_limit: usize,
    pub reject_backoff_ms: u64,
    pub time_tracker: bool,
    pub shutdown_timeout_ms: u64,
    pub log_level: String,
    pub log_format: LogFormat,
}

/// All runtime configuration.
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub config_file: Option<PathBuf>,
    pub server: ServerConfig,
    pub log: LogConfig,
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parse a `usize` env var, returning `default` on missing or invalid.
fn parse_usize(key: &str, default: usize) -> usize {
    match env_var(key) {
        Some(val) => val.trim().parse::<usize>().unwrap_or(default),
        None => default,
    }
}

fn parse_u16(key: &str, default: u16) -> u16 {
    match env_var(key) {
        Some(val) => val.trim().parse::<u16>().unwrap_or(default),
        None => default,
    }
}

fn parse_u64(key: &str, default: u64) -> u64 {
    match env_var(key) {
        Some(val) => val.trim().parse::<u64>().unwrap_or(default),
        None => default,
    }
}

/// Accepts `1/0`, `true/false`, `yes/no`, `on/off`.
fn parse_bool(key: &str, default: bool) -> bool {
    match env_var(key).map(|v| v.trim().to_ascii_lowercase()) {
        Some(v) if matches!(v.as_str(), "1" | "true" | "yes" | "on") => true,
        Some(v) if matches!(v.as_str(), "0" | "false" | "no" | "off") => false,
        _ => default,
    }
}

/// Read and parse a TOML config file.
pub fn load_file(path: &Path) -> Result<FileConfig, ConfigError> {
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&text).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Apply `MSGPORT_*` overrides and floors on top of `server`.
fn apply_server_env(mut server: ServerConfig) -> ServerConfig {
    if let Some(ips) = env_var("MSGPORT_BIND_IP") {
        server.bind_addresses = ips
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
    }
    server.port = parse_u16("MSGPORT_PORT", server.port);
    server.quiet = parse_bool("MSGPORT_QUIET", server.quiet);

    server.admission.max_connections =
        parse_usize("MSGPORT_MAX_CONNECTIONS", server.admission.max_connections);
    server.max_frame_size = parse_usize("MSGPORT_FRAME_LIMIT", server.max_frame_size);

    let backoff_ms = parse_u64("MSGPORT_REJECT_BACKOFF_MS", server.reject_backoff.as_millis() as u64);
    server.reject_backoff = Duration::from_millis(backoff_ms);

    server.time_tracker = parse_bool("MSGPORT_TIME_TRACKER", server.time_tracker);

    let timeout_ms = parse_u64(
        "MSGPORT_SHUTDOWN_TIMEOUT_MS",
        server.shutdown_timeout.as_millis() as u64,
    );
    server.shutdown_timeout = Duration::from_millis(timeout_ms);
    server.clamp_limits();
    server
}

fn apply_log_env(mut log: LogConfig) -> LogConfig {
    if let Some(level) = env_var("MSGPORT_LOG") {
        log.level = level;
    }
    if let Some(format) = env_var("MSGPORT_LOG_FORMAT").and_then(|f| LogFormat::parse(&f)) {
        log.format = format;
    }
    log
}

/// Load configuration: optional file first, environment on top.
///
/// Only an unreadable or malformed config file is an error; bad environment
/// values fall back silently.
pub fn load() -> Result<EnvConfig, ConfigError> {
    let config_file = env_var("MSGPORT_CONFIG").map(PathBuf::from);
    let file = match &config_file {
        Some(path) => load_file(path)?,
        None => FileConfig::default(),
    };

    Ok(EnvConfig {
        config_file,
        server: apply_server_env(file.server),
        log: apply_log_env(file.log),
    })
}

impl EnvConfig {
    /// Return a flat summary of all effective values.
    pub fn effective_config(&self) -> EffectiveConfig {
        EffectiveConfig {
            bind_ip: self.server.bind_addresses.join(","),
            port: self.server.port,
            quiet: self.server.quiet,
            max_connections: self.server.admission.max_connections,
            frame_limit: self.server.max_frame_size,
            reject_backoff_ms: self.server.reject_backoff.as_millis() as u64,
            time_tracker: self.server.time_tracker,
            shutdown_timeout_ms: self.server.shutdown_timeout.as_millis() as u64,
            log_level: self.log.level.clone(),
            log_format: self.log.format,
        }
    }
}
