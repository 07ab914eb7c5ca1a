//! Configuration module for the coin playlist service.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Default playlist endpoint.
pub const DEFAULT_REMOTE_URL: &str = "https://android-kotlin-fun-mastery.appspot.com/devbytes";

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key guarding the manual refresh endpoint
    pub api_psk: Option<String>,
    /// Path to SQLite database file holding the offline cache
    pub db_path: PathBuf,
    /// URL of the remote playlist (`{"coins": [...]}`)
    pub remote_url: String,
    /// Request timeout for a single playlist fetch
    pub remote_timeout: Duration,
    /// Extra fetch attempts after an unreachable/timeout failure (0 = no retry)
    pub refresh_max_retries: u32,
    /// Delay before the first retry; doubled for each further attempt
    pub refresh_backoff: Duration,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, String> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("COIN_API_PSK").ok().filter(|s| !s.is_empty());

        let db_path = env::var("COIN_DB_PATH")
            .unwrap_or_else(|_| "./data/coins.sqlite".to_string())
            .into();

        let remote_url =
            env::var("COIN_REMOTE_URL").unwrap_or_else(|_| DEFAULT_REMOTE_URL.to_string());

        let remote_timeout = Duration::from_secs(parse_var("COIN_REMOTE_TIMEOUT_SECS", 10)?);
        let refresh_max_retries = parse_var("COIN_REFRESH_MAX_RETRIES", 0)?;
        let refresh_backoff = Duration::from_millis(parse_var("COIN_REFRESH_BACKOFF_MS", 500)?);

        let bind_addr = parse_var(
            "COIN_BIND_ADDR",
            SocketAddr::from(([127, 0, 0, 1], 8080)),
        )?;

        let log_level = env::var("COIN_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            api_psk,
            db_path,
            remote_url,
            remote_timeout,
            refresh_max_retries,
            refresh_backoff,
            bind_addr,
            log_level,
        })
    }
}

/// Parse an optional environment variable, falling back to `default` when unset.
fn parse_var<T>(name: &str, default: T) -> Result<T, String>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| format!("Invalid {} value {:?}: {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}
