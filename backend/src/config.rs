//! Configuration management.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::state::DEFAULT_KEEPALIVE;

/// Name of the per-directory config file.
pub const LOCAL_CONFIG_FILE: &str = ".ha-logs-proxy.toml";

/// Configuration structure that matches the TOML file format.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    server: ServerConfig,
    #[serde(default)]
    command: CommandConfig,
    #[serde(default)]
    limits: LimitsConfig,
    #[serde(default)]
    logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ServerConfig {
    #[serde(default = "default_port")]
    port: u16,
    #[serde(default = "default_bind")]
    bind: IpAddr,
    /// Allowed CORS origins (empty means any origin)
    #[serde(default)]
    cors_allowed_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            cors_allowed_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CommandConfig {
    /// Executable invoked for every logs request
    #[serde(default = "default_program")]
    program: String,
    /// Arguments placed before `<category> logs`
    #[serde(default)]
    args: Vec<String>,
}

impl Default for CommandConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            args: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LimitsConfig {
    /// Deadline for one-shot captures, in seconds
    command_timeout_secs: Option<u64>,
    /// Cap on concurrent follow streams
    max_streams: Option<usize>,
    /// Keep-alive ping interval for follow streams, in seconds (0 disables)
    #[serde(default = "default_keepalive_secs")]
    keepalive_secs: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            command_timeout_secs: None,
            max_streams: None,
            keepalive_secs: default_keepalive_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LoggingConfig {
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    log_file: Option<PathBuf>,
    /// Log level filter (e.g. "info", "ha_logs_proxy=debug")
    /// If not set, uses RUST_LOG environment variable or defaults to "info"
    log_level: Option<String>,
}

fn default_port() -> u16 {
    ha_logs_types::DEFAULT_PORT
}

fn default_bind() -> IpAddr {
    IpAddr::V4(Ipv4Addr::UNSPECIFIED)
}

fn default_program() -> String {
    ha_logs_types::DEFAULT_COMMAND.to_string()
}

fn default_keepalive_secs() -> u64 {
    DEFAULT_KEEPALIVE.as_secs()
}

/// Values given on the command line. They override every other source.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub config_file: Option<PathBuf>,
    pub port: Option<u16>,
    pub bind: Option<IpAddr>,
    pub command: Option<String>,
    pub log_level: Option<String>,
    pub log_file: Option<PathBuf>,
}

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port to listen on
    pub port: u16,
    /// Address to bind to
    pub bind: IpAddr,
    /// Allowed CORS origins (empty means any origin)
    pub cors_allowed_origins: Vec<String>,
    /// Executable invoked for every logs request
    pub command: String,
    /// Arguments placed before `<category> logs`
    pub command_args: Vec<String>,
    /// Deadline for one-shot captures
    pub command_timeout: Option<Duration>,
    /// Cap on concurrent follow streams
    pub max_streams: Option<usize>,
    /// Keep-alive ping interval for follow streams
    pub keepalive: Option<Duration>,
    /// Path to log file (if set, logs will be written to file in addition to stdout)
    pub log_file: Option<PathBuf>,
    /// Log level (if set, overrides RUST_LOG environment variable)
    pub log_level: Option<String>,
}

impl Config {
    /// Load configuration with full priority chain: CLI args > env vars > config files > defaults.
    ///
    /// Config files are searched in this order, later ones winning:
    /// 1. `config.toml` in user config directory (~/.config/ha-logs-proxy/ on Linux)
    /// 2. `.ha-logs-proxy.toml` in current directory
    /// 3. the file passed with `--config`
    ///
    /// Environment variables: the bare `PORT` variable is honoured, and any
    /// `HA_LOGS_<SECTION>_<KEY>` variable overrides it (e.g. `HA_LOGS_SERVER_PORT`,
    /// `HA_LOGS_LIMITS_MAX_STREAMS`).
    pub fn from_figment(overrides: Overrides) -> anyhow::Result<Self> {
        let local_config = std::env::current_dir()
            .ok()
            .map(|d| d.join(LOCAL_CONFIG_FILE));
        let user_config = directories::ProjectDirs::from("", "", "ha-logs-proxy")
            .map(|dirs| dirs.config_dir().join("config.toml"));

        // 1. Start with defaults
        let mut figment = Figment::new().merge(Serialized::defaults(ConfigFile {
            server: ServerConfig::default(),
            command: CommandConfig::default(),
            limits: LimitsConfig::default(),
            logging: LoggingConfig::default(),
        }));

        // 2. Merge user config file if it exists
        if let Some(ref path) = user_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 3. Merge local config file if it exists
        if let Some(ref path) = local_config {
            if path.exists() {
                figment = figment.merge(Toml::file(path));
            }
        }

        // 4. An explicit config file must exist
        if let Some(ref path) = overrides.config_file {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            figment = figment.merge(Toml::file(path));
        }

        // 5. Legacy PORT variable, then HA_LOGS_* variables
        figment = figment
            .merge(Env::raw().only(&["PORT"]).map(|_| "server.port".into()))
            .merge(
                Env::prefixed("HA_LOGS_")
                    .map(|key| key.as_str().replacen('_', ".", 1).into()),
            );

        // 6. Merge CLI arguments (highest priority)
        if let Some(p) = overrides.port {
            figment = figment.merge(Serialized::default("server.port", p));
        }
        if let Some(b) = overrides.bind {
            figment = figment.merge(Serialized::default("server.bind", b));
        }
        if let Some(ref c) = overrides.command {
            figment = figment.merge(Serialized::default("command.program", c));
        }
        if let Some(ref l) = overrides.log_level {
            figment = figment.merge(Serialized::default("logging.log_level", l));
        }
        if let Some(ref f) = overrides.log_file {
            figment = figment.merge(Serialized::default("logging.log_file", f));
        }

        let config_file: ConfigFile = figment.extract()?;
        Self::from_file(config_file)
    }

    fn from_file(file: ConfigFile) -> anyhow::Result<Self> {
        if file.command.program.trim().is_empty() {
            anyhow::bail!("command.program must not be empty");
        }
        if file.limits.max_streams == Some(0) {
            anyhow::bail!("limits.max_streams must be at least 1");
        }
        if file.limits.command_timeout_secs == Some(0) {
            anyhow::bail!("limits.command_timeout_secs must be at least 1");
        }

        Ok(Self {
            port: file.server.port,
            bind: file.server.bind,
            cors_allowed_origins: file.server.cors_allowed_origins,
            command: file.command.program,
            command_args: file.command.args,
            command_timeout: file.limits.command_timeout_secs.map(Duration::from_secs),
            max_streams: file.limits.max_streams,
            keepalive: match file.limits.keepalive_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            log_file: file.logging.log_file,
            log_level: file.logging.log_level,
        })
    }

    /// Socket address the server listens on.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind, self.port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            bind: default_bind(),
            cors_allowed_origins: Vec::new(),
            command: default_program(),
            command_args: Vec::new(),
            command_timeout: None,
            max_streams: None,
            keepalive: Some(DEFAULT_KEEPALIVE),
            log_file: None,
            log_level: None,
        }
    }
}
