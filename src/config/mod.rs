//! Typed configuration.
//!
//! Layered once at startup: built-in defaults, then an optional TOML file,
//! then environment variables, then positional command-line overrides.
//! The store password is wrapped in `secrecy::SecretString` so it never
//! lands in a log line.

use crate::error::{Error, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_HOST: &str = "localhost";
pub const DEFAULT_PORT: u16 = 3306;
pub const DEFAULT_USER: &str = "root";
pub const DEFAULT_PASSWORD: &str = "root";
pub const DEFAULT_SCHEMA: &str = "facecom";

pub const DEFAULT_WORK_DIR: &str = "/tmp";
pub const DEFAULT_LOCK_FILE: &str = "queryd.lock";
pub const DEFAULT_LOG_FILE: &str = "queryd.log";
pub const DEFAULT_QUEUE_TABLE: &str = "queue";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_LOG_SIZE_WARN_BYTES: u64 = 10 * 1024 * 1024;

const MAX_IDENTIFIER_LEN: usize = 64;

#[derive(Debug)]
pub struct Config {
    pub connection: ConnectionConfig,
    pub daemon: DaemonConfig,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

/// Where and as whom to connect.
#[derive(Debug)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: SecretString,
    pub schema: String,
}

/// Process and loop settings for `queryd run`.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Directory the daemon changes into before touching any relative path.
    pub work_dir: PathBuf,
    pub lock_file: PathBuf,
    pub log_file: PathBuf,
    pub queue_table: QueueTable,
    pub poll_interval: Duration,
    /// Size above which a warning is logged after each cycle. Nothing rotates.
    pub log_size_warn_bytes: u64,
}

/// Positional overrides from the command line, in `USER PASSWORD SCHEMA HOST` order.
#[derive(Debug, Clone, Default)]
pub struct ConnectionOverrides {
    pub user: Option<String>,
    pub password: Option<String>,
    pub schema: Option<String>,
    pub host: Option<String>,
}

/// A validated queue table name, safe to splice into a statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueTable(String);

impl QueueTable {
    pub fn new(name: &str) -> Result<Self> {
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
        if !valid_start || !valid_rest || name.len() > MAX_IDENTIFIER_LEN {
            return Err(Error::InvalidTableName(name.to_string()));
        }
        Ok(Self(name.to_string()))
    }

    pub fn name(&self) -> &str {
        &self.0
    }

    /// Backtick-quoted form for use in statements.
    pub fn quoted(&self) -> String {
        format!("`{}`", self.0)
    }
}

impl std::fmt::Display for QueueTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            user: DEFAULT_USER.to_string(),
            password: SecretString::from(DEFAULT_PASSWORD.to_string()),
            schema: DEFAULT_SCHEMA.to_string(),
        }
    }
}

impl ConnectionConfig {
    /// Set the host, accepting an optional `:port` suffix.
    pub fn set_host(&mut self, host: &str) -> Result<()> {
        match host.rsplit_once(':') {
            Some((name, port)) if !name.is_empty() && !name.contains(':') => {
                self.port = port
                    .parse()
                    .map_err(|_| Error::Config(format!("invalid port in host {host:?}")))?;
                self.host = name.to_string();
            }
            _ => self.host = host.to_string(),
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: &ConnectionOverrides) -> Result<()> {
        if let Some(ref user) = overrides.user {
            self.user = user.clone();
        }
        if let Some(ref password) = overrides.password {
            self.password = SecretString::from(password.clone());
        }
        if let Some(ref schema) = overrides.schema {
            self.schema = schema.clone();
        }
        if let Some(ref host) = overrides.host {
            self.set_host(host)?;
        }
        Ok(())
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            work_dir: PathBuf::from(DEFAULT_WORK_DIR),
            lock_file: PathBuf::from(DEFAULT_LOCK_FILE),
            log_file: PathBuf::from(DEFAULT_LOG_FILE),
            queue_table: QueueTable(DEFAULT_QUEUE_TABLE.to_string()),
            poll_interval: DEFAULT_POLL_INTERVAL,
            log_size_warn_bytes: DEFAULT_LOG_SIZE_WARN_BYTES,
        }
    }
}

/// On-disk TOML layout. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConfig {
    #[serde(default)]
    connection: FileConnection,
    #[serde(default)]
    daemon: FileDaemon,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileConnection {
    host: Option<String>,
    port: Option<u16>,
    user: Option<String>,
    password: Option<String>,
    schema: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct FileDaemon {
    work_dir: Option<PathBuf>,
    lock_file: Option<PathBuf>,
    log_file: Option<PathBuf>,
    queue_table: Option<String>,
    poll_interval_secs: Option<u64>,
    log_size_warn_bytes: Option<u64>,
}

impl Config {
    /// Load configuration from defaults, an optional TOML file and the
    /// environment.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = Self {
            connection: ConnectionConfig::default(),
            daemon: DaemonConfig::default(),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        };
        if let Some(path) = path {
            let text = std::fs::read_to_string(path).map_err(|e| {
                Error::Config(format!("cannot read config file {}: {e}", path.display()))
            })?;
            config.merge_toml(&text)?;
        }
        Ok(config)
    }

    /// Overlay settings from TOML text onto this config.
    pub fn merge_toml(&mut self, text: &str) -> Result<()> {
        let file: FileConfig =
            toml::from_str(text).map_err(|e| Error::Config(format!("invalid config: {e}")))?;

        let conn = file.connection;
        if let Some(port) = conn.port {
            self.connection.port = port;
        }
        if let Some(host) = conn.host {
            self.connection.set_host(&host)?;
        }
        if let Some(user) = conn.user {
            self.connection.user = user;
        }
        if let Some(password) = conn.password {
            self.connection.password = SecretString::from(password);
        }
        if let Some(schema) = conn.schema {
            self.connection.schema = schema;
        }

        let daemon = file.daemon;
        if let Some(dir) = daemon.work_dir {
            self.daemon.work_dir = dir;
        }
        if let Some(lock) = daemon.lock_file {
            self.daemon.lock_file = lock;
        }
        if let Some(log) = daemon.log_file {
            self.daemon.log_file = log;
        }
        if let Some(table) = daemon.queue_table {
            self.daemon.queue_table = QueueTable::new(&table)?;
        }
        if let Some(secs) = daemon.poll_interval_secs {
            if secs == 0 {
                return Err(Error::Config("poll_interval_secs must be positive".into()));
            }
            self.daemon.poll_interval = Duration::from_secs(secs);
        }
        if let Some(bytes) = daemon.log_size_warn_bytes {
            self.daemon.log_size_warn_bytes = bytes;
        }
        Ok(())
    }
}
