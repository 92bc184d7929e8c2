use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;

use chrono::Duration;

const DEFAULT_PENDING_TTL_SECS: i64 = 15 * 60;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the seating service.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub seating: SeatingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let pending_ttl = match env::var("SEATING_PENDING_TTL_SECS") {
            Ok(raw) => parse_pending_ttl(&raw)?,
            Err(_) => Some(Duration::seconds(DEFAULT_PENDING_TTL_SECS)),
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            seating: SeatingConfig {
                pending_ttl,
                registry_path: non_empty_path("SEATING_REGISTRY_PATH"),
                seed_path: non_empty_path("SEATING_SEED_PATH"),
            },
        })
    }
}

fn parse_pending_ttl(raw: &str) -> Result<Option<Duration>, ConfigError> {
    let seconds = raw
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidPendingTtl {
            value: raw.to_string(),
        })?;

    if seconds == 0 {
        Ok(None)
    } else {
        Ok(Some(Duration::seconds(i64::from(seconds))))
    }
}

fn non_empty_path(key: &str) -> Option<PathBuf> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .map(PathBuf::from)
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing and metrics controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Assignment engine settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SeatingConfig {
    /// Lifetime of a staged assignment. `None` keeps it until confirmed or cancelled.
    pub pending_ttl: Option<Duration>,
    /// JSON file backing the assignment registry; in-memory when unset.
    pub registry_path: Option<PathBuf>,
    /// JSON seed for the exam, room and algorithm directories.
    pub seed_path: Option<PathBuf>,
}

impl Default for SeatingConfig {
    fn default() -> Self {
        Self {
            pending_ttl: Some(Duration::seconds(DEFAULT_PENDING_TTL_SECS)),
            registry_path: None,
            seed_path: None,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidPendingTtl { value: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidPendingTtl { value } => write!(
                f,
                "SEATING_PENDING_TTL_SECS must be a whole number of seconds (got '{}')",
                value
            ),
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidPendingTtl { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
