//! Runtime configuration loaded from the process environment.
//!
//! DESIGN
//! ======
//! Every knob has a default so a bare `cargo run` works against local
//! Postgres and Redis. Values that are present but unparseable are a
//! startup error rather than a silent fallback, since a typo in `PORT`
//! should not bind somewhere unexpected.

use std::str::FromStr;
use std::time::Duration;

const DEFAULT_FRONTEND_URL: &str = "http://localhost:3000";
const DEFAULT_API_URL: &str = "http://localhost:8000";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_ENVIRONMENT: &str = "development";
const DEFAULT_DATABASE_URL: &str = "postgres://localhost:5432/modelverse";
const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";
const DEFAULT_DB_MAX_CONNECTIONS: u32 = 10;
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_RATE_LIMIT_MAX: usize = 100;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 15 * 60;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Where rate-limit counters live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitBackend {
    /// Process-local map. Counts are not shared across instances.
    Memory,
    /// Redis sorted sets, shared by every instance pointed at the same cache.
    Redis,
}

impl FromStr for RateLimitBackend {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Allowed CORS and websocket origin.
    pub frontend_url: String,
    /// Server URL advertised in the `OpenAPI` document.
    pub api_url: String,
    pub port: u16,
    /// Environment name reported by `/health`.
    pub environment: String,
    pub database_url: String,
    pub redis_url: String,
    pub db_max_connections: u32,
    /// Upper bound for each startup dependency connect.
    pub connect_timeout: Duration,
    pub rate_limit_max: usize,
    pub rate_limit_window: Duration,
    pub rate_limit_backend: RateLimitBackend,
    /// Use the first `X-Forwarded-For` hop as the client address.
    pub trust_proxy: bool,
    /// How long shutdown waits for in-flight connections before cutting them off.
    pub shutdown_grace: Duration,
}

impl Config {
    /// Load from the process environment.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set but cannot be parsed.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load using an arbitrary key lookup. Tests pass a map here instead of
    /// mutating the process environment.
    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_owned());

        Ok(Self {
            frontend_url: string("FRONTEND_URL", DEFAULT_FRONTEND_URL),
            api_url: string("API_URL", DEFAULT_API_URL),
            port: parse(&lookup, "PORT", DEFAULT_PORT)?,
            environment: string("NODE_ENV", DEFAULT_ENVIRONMENT),
            database_url: string("DATABASE_URL", DEFAULT_DATABASE_URL),
            redis_url: string("REDIS_URL", DEFAULT_REDIS_URL),
            db_max_connections: parse(&lookup, "DB_MAX_CONNECTIONS", DEFAULT_DB_MAX_CONNECTIONS)?,
            connect_timeout: Duration::from_secs(parse(
                &lookup,
                "DEPENDENCY_CONNECT_TIMEOUT_SECS",
                DEFAULT_CONNECT_TIMEOUT_SECS,
            )?),
            rate_limit_max: parse(&lookup, "RATE_LIMIT_MAX", DEFAULT_RATE_LIMIT_MAX)?,
            rate_limit_window: Duration::from_secs(parse(
                &lookup,
                "RATE_LIMIT_WINDOW_SECS",
                DEFAULT_RATE_LIMIT_WINDOW_SECS,
            )?),
            rate_limit_backend: parse(&lookup, "RATE_LIMIT_STORE", RateLimitBackend::Memory)?,
            trust_proxy: match lookup("TRUST_PROXY") {
                None => false,
                Some(raw) => parse_bool(&raw).ok_or(ConfigError::Invalid { key: "TRUST_PROXY", value: raw })?,
            },
            shutdown_grace: Duration::from_secs(parse(&lookup, "SHUTDOWN_GRACE_SECS", DEFAULT_SHUTDOWN_GRACE_SECS)?),
        })
    }

    /// Session cookies are only marked `Secure` in production.
    #[must_use]
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frontend_url: DEFAULT_FRONTEND_URL.into(),
            api_url: DEFAULT_API_URL.into(),
            port: DEFAULT_PORT,
            environment: DEFAULT_ENVIRONMENT.into(),
            database_url: DEFAULT_DATABASE_URL.into(),
            redis_url: DEFAULT_REDIS_URL.into(),
            db_max_connections: DEFAULT_DB_MAX_CONNECTIONS,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window: Duration::from_secs(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            rate_limit_backend: RateLimitBackend::Memory,
            trust_proxy: false,
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

fn parse<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<T>().map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
