use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use leadflow_core::AppError;
use tracing_subscriber::EnvFilter;

/// Which bucket store implementation backs the limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// Shared Redis store for multi-instance deployments.
    Redis,
    /// Process-local store for single-instance deployments and tests.
    Memory,
}

/// Runtime configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Interface the listener binds to.
    pub api_host: String,
    /// Port the listener binds to.
    pub api_port: u16,
    /// Allowed browser origin for CORS.
    pub frontend_url: String,
    /// Redis connection address.
    pub redis_url: String,
    /// Selected bucket store implementation.
    pub store_backend: StoreBackend,
    /// Idle seconds after which an untouched bucket record expires.
    pub idle_ttl_seconds: u32,
    /// Upper bound on one store round-trip.
    pub store_timeout: Duration,
    /// Global limiter switch; when false every request is admitted.
    pub limiter_enabled: bool,
}

impl ApiConfig {
    /// Loads configuration from the environment with local-dev defaults.
    pub fn load() -> Result<Self, AppError> {
        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());

        let redis_url =
            env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_owned());

        let store_backend = match env::var("RATE_LIMIT_STORE")
            .unwrap_or_else(|_| "redis".to_owned())
            .as_str()
        {
            "redis" => StoreBackend::Redis,
            "memory" => StoreBackend::Memory,
            other => {
                return Err(AppError::Validation(format!(
                    "RATE_LIMIT_STORE must be either 'redis' or 'memory', got '{other}'"
                )));
            }
        };

        let idle_ttl_seconds = parse_env_number("RATE_LIMIT_IDLE_TTL_SECONDS", 1800)?;
        if idle_ttl_seconds == 0 {
            return Err(AppError::Validation(
                "RATE_LIMIT_IDLE_TTL_SECONDS must be greater than zero".to_owned(),
            ));
        }

        let store_timeout_ms: u32 = parse_env_number("RATE_LIMIT_STORE_TIMEOUT_MS", 150)?;
        if store_timeout_ms == 0 {
            return Err(AppError::Validation(
                "RATE_LIMIT_STORE_TIMEOUT_MS must be greater than zero".to_owned(),
            ));
        }

        let limiter_enabled = env::var("RATE_LIMIT_ENABLED")
            .map(|value| !value.eq_ignore_ascii_case("false"))
            .unwrap_or(true);

        Ok(Self {
            api_host,
            api_port,
            frontend_url,
            redis_url,
            store_backend,
            idle_ttl_seconds,
            store_timeout: Duration::from_millis(u64::from(store_timeout_ms)),
            limiter_enabled,
        })
    }

    /// Resolves the listener socket address.
    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

/// Installs the process-wide tracing subscriber.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn parse_env_number(name: &str, default: u32) -> Result<u32, AppError> {
    match env::var(name) {
        Ok(value) => value
            .parse::<u32>()
            .map_err(|error| AppError::Validation(format!("invalid {name}: {error}"))),
        Err(_) => Ok(default),
    }
}
