//! Service configuration.
//!
//! Everything the pipeline needs is carried in explicit config objects handed to
//! constructors. [`AppConfig::from_env`] is the only place the process
//! environment is read.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use minerep_reporting::DEFAULT_MAX_ERROR_LEN;
use thiserror::Error;
use tracing::warn;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {message}")]
    Invalid { key: &'static str, message: String },

    #[error("{0} is required when persistent stores are enabled")]
    Missing(&'static str),
}

/// Report pipeline settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportingConfig {
    /// Fixed directory completed artifacts are published into.
    pub results_dir: PathBuf,
    /// Concurrent report jobs.
    pub worker_count: usize,
    /// Jobs that may wait for a worker before new submissions fail fast.
    pub queue_capacity: usize,
    /// Cap on stored error messages, in characters.
    pub max_error_len: usize,
    /// Optional wall-clock limit per job. Unset means no limit.
    pub max_runtime: Option<Duration>,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            results_dir: PathBuf::from("./reports"),
            worker_count: 4,
            queue_capacity: 256,
            max_error_len: DEFAULT_MAX_ERROR_LEN,
            max_runtime: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl DatabaseConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            max_connections: 10,
            acquire_timeout: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    pub jwt_secret: String,
    /// Postgres-backed job records and report data instead of in-memory fixtures.
    pub use_persistent_stores: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            use_persistent_stores: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub reporting: ReportingConfig,
    /// `None` when running on in-memory stores.
    pub database: Option<DatabaseConfig>,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup (the environment in production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut server = ServerConfig::default();
        let mut reporting = ReportingConfig::default();

        if let Some(v) = lookup("BIND_ADDR") {
            server.bind_addr = v.parse().map_err(|e| ConfigError::Invalid {
                key: "BIND_ADDR",
                message: format!("{e}"),
            })?;
        }
        match lookup("JWT_SECRET") {
            Some(v) if !v.is_empty() => server.jwt_secret = v,
            _ => warn!("JWT_SECRET not set; using insecure dev default"),
        }
        if let Some(v) = lookup("USE_PERSISTENT_STORES") {
            server.use_persistent_stores = parse_bool("USE_PERSISTENT_STORES", &v)?;
        }

        if let Some(v) = lookup("REPORTS_DIR") {
            reporting.results_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("REPORT_WORKERS") {
            reporting.worker_count = parse_positive("REPORT_WORKERS", &v)?;
        }
        if let Some(v) = lookup("REPORT_QUEUE_CAPACITY") {
            reporting.queue_capacity = parse_positive("REPORT_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("REPORT_MAX_RUNTIME_SECS") {
            let secs = parse_positive("REPORT_MAX_RUNTIME_SECS", &v)?;
            reporting.max_runtime = Some(Duration::from_secs(secs as u64));
        }

        let database = match lookup("DATABASE_URL") {
            Some(url) if !url.is_empty() => {
                let mut db = DatabaseConfig::new(url);
                if let Some(v) = lookup("DATABASE_MAX_CONNECTIONS") {
                    let n = parse_positive("DATABASE_MAX_CONNECTIONS", &v)?;
                    db.max_connections = u32::try_from(n).map_err(|_| ConfigError::Invalid {
                        key: "DATABASE_MAX_CONNECTIONS",
                        message: format!("must be at most {}", u32::MAX),
                    })?;
                }
                Some(db)
            }
            _ if server.use_persistent_stores => return Err(ConfigError::Missing("DATABASE_URL")),
            _ => None,
        };

        Ok(Self {
            server,
            reporting,
            database,
        })
    }
}

fn parse_positive(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        Ok(_) => Err(ConfigError::Invalid {
            key,
            message: "must be greater than zero".to_string(),
        }),
        Err(e) => Err(ConfigError::Invalid {
            key,
            message: e.to_string(),
        }),
    }
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            key,
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
