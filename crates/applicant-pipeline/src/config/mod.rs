use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

const DEFAULT_SHORT_ANSWER_MAX: usize = 250;
const DEFAULT_LONG_ANSWER_MAX: usize = 5_000;
const DEFAULT_RATING_LEVELS: u8 = 5;
const DEFAULT_MAX_FILE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_MAX_BULK_ITEMS: usize = 500;

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

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub pipeline: PipelineConfig,
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

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            pipeline: PipelineConfig::from_env()?,
        })
    }
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

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Limits applied by the field catalog and the bulk coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    pub short_answer_max_chars: usize,
    pub long_answer_max_chars: usize,
    pub default_rating_levels: u8,
    pub default_max_file_bytes: u64,
    pub max_bulk_items: usize,
}

impl PipelineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            short_answer_max_chars: read_limit(
                "PIPELINE_SHORT_ANSWER_MAX",
                DEFAULT_SHORT_ANSWER_MAX,
            )?,
            long_answer_max_chars: read_limit("PIPELINE_LONG_ANSWER_MAX", DEFAULT_LONG_ANSWER_MAX)?,
            default_rating_levels: read_limit(
                "PIPELINE_DEFAULT_RATING_LEVELS",
                DEFAULT_RATING_LEVELS,
            )?,
            default_max_file_bytes: read_limit(
                "PIPELINE_DEFAULT_MAX_FILE_BYTES",
                DEFAULT_MAX_FILE_BYTES,
            )?,
            max_bulk_items: read_limit("PIPELINE_MAX_BULK_ITEMS", DEFAULT_MAX_BULK_ITEMS)?,
        })
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            short_answer_max_chars: DEFAULT_SHORT_ANSWER_MAX,
            long_answer_max_chars: DEFAULT_LONG_ANSWER_MAX,
            default_rating_levels: DEFAULT_RATING_LEVELS,
            default_max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_bulk_items: DEFAULT_MAX_BULK_ITEMS,
        }
    }
}

fn read_limit<T>(variable: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + Default,
{
    let Ok(raw) = env::var(variable) else {
        return Ok(default);
    };

    match raw.trim().parse::<T>() {
        Ok(value) if value > T::default() => Ok(value),
        _ => Err(ConfigError::InvalidLimit {
            variable,
            value: raw,
        }),
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost {
        source: std::net::AddrParseError,
    },
    InvalidLimit {
        variable: &'static str,
        value: String,
    },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { source } => {
                write!(f, "APP_HOST must be a valid IP address: {}", source)
            }
            ConfigError::InvalidLimit { variable, value } => {
                write!(f, "{variable} must be a positive number (found '{value}')")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidPort | ConfigError::InvalidLimit { .. } => None,
            ConfigError::InvalidHost { source } => Some(source),
        }
    }
}
