//! Configuration module for kv-probe.
//!
//! Values come from command-line arguments, `REDIS_*` environment variables
//! and an optional TOML file. Precedence: CLI, then environment, then file,
//! then built-in defaults.

use crate::client::ConnectOptions;
use clap::Parser;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Command-line arguments for the probe
#[derive(Parser, Debug)]
#[command(name = "kv-probe")]
#[command(version)]
#[command(
    about = "Check that a Redis-compatible store is reachable and can store and return a value",
    long_about = None
)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Store hostname or IP address
    #[arg(long, env = "REDIS_HOST")]
    pub host: Option<String>,

    /// Store port
    #[arg(short, long, env = "REDIS_PORT")]
    pub port: Option<u16>,

    /// Password sent with AUTH after connecting
    #[arg(long, env = "REDIS_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// ACL username sent with AUTH (requires a password)
    #[arg(short, long, env = "REDIS_USERNAME")]
    pub username: Option<String>,

    /// Print the retrieved value as raw bytes instead of decoded text
    #[arg(long)]
    pub raw: bool,

    /// Connect timeout in milliseconds (0 = wait for the OS)
    #[arg(long)]
    pub connect_timeout_ms: Option<u64>,

    /// Per-command read/write timeout in milliseconds (0 = none)
    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// Key written and read back
    #[arg(short, long)]
    pub key: Option<String>,

    /// Value written to the key
    #[arg(long)]
    pub value: Option<String>,

    /// Delete the key after reading it back
    #[arg(long)]
    pub cleanup: bool,

    /// Exit with status 1 unless the probe succeeds
    #[arg(long)]
    pub strict: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection-related configuration
#[derive(Debug, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub password: Option<String>,
    pub username: Option<String>,
    #[serde(default = "default_decode_responses")]
    pub decode_responses: bool,
    #[serde(default = "default_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            password: None,
            username: None,
            decode_responses: default_decode_responses(),
            connect_timeout_ms: default_timeout_ms(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

/// What the probe writes and whether it cleans up
#[derive(Debug, Deserialize)]
pub struct ProbeConfig {
    #[serde(default = "default_key")]
    pub key: String,
    #[serde(default = "default_value")]
    pub value: String,
    #[serde(default)]
    pub cleanup: bool,
    #[serde(default)]
    pub strict: bool,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            key: default_key(),
            value: default_value(),
            cleanup: false,
            strict: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
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

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    6379
}

fn default_decode_responses() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_key() -> String {
    "test_key".to_string()
}

fn default_value() -> String {
    "Hello from Python!".to_string()
}

fn default_log_level() -> String {
    "warn".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub connection: ConnectOptions,
    pub key: String,
    pub value: String,
    pub cleanup: bool,
    pub strict: bool,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args, environment and optional TOML file.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Self::merge(cli, toml_config)
    }

    /// Merge parsed CLI args over file values (CLI takes precedence).
    pub fn merge(cli: CliArgs, file: TomlConfig) -> Result<Self, ConfigError> {
        let port = cli.port.unwrap_or(file.connection.port);
        if port == 0 {
            return Err(ConfigError::InvalidPort);
        }

        let password = cli.password.or(file.connection.password);
        let username = cli.username.or(file.connection.username);
        if username.is_some() && password.is_none() {
            return Err(ConfigError::UsernameWithoutPassword);
        }

        let connection = ConnectOptions {
            host: cli.host.unwrap_or(file.connection.host),
            port,
            username,
            password,
            decode_responses: !cli.raw && file.connection.decode_responses,
            connect_timeout: Duration::from_millis(
                cli.connect_timeout_ms
                    .unwrap_or(file.connection.connect_timeout_ms),
            ),
            io_timeout: Duration::from_millis(cli.timeout_ms.unwrap_or(file.connection.timeout_ms)),
        };

        Ok(Config {
            connection,
            key: cli.key.unwrap_or(file.probe.key),
            value: cli.value.unwrap_or(file.probe.value),
            cleanup: cli.cleanup || file.probe.cleanup,
            strict: cli.strict || file.probe.strict,
            log_level: cli.log_level.unwrap_or(file.logging.level),
        })
    }
}

/// Configuration loading errors
#[derive(Debug)]
pub enum ConfigError {
    FileRead(PathBuf, std::io::Error),
    TomlParse(PathBuf, toml::de::Error),
    InvalidPort,
    UsernameWithoutPassword,
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::FileRead(path, e) => {
                write!(f, "Failed to read config file '{}': {}", path.display(), e)
            }
            ConfigError::TomlParse(path, e) => {
                write!(f, "Failed to parse config file '{}': {}", path.display(), e)
            }
            ConfigError::InvalidPort => write!(f, "Port must be between 1 and 65535"),
            ConfigError::UsernameWithoutPassword => {
                write!(f, "A username was given without a password")
            }
        }
    }
}

impl std::error::Error for ConfigError {}
