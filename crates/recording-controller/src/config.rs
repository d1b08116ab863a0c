//! Recording Controller configuration.
//!
//! Configuration is loaded from environment variables. All sensitive
//! fields are redacted in Debug output.

use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Default health endpoint bind address.
pub const DEFAULT_HEALTH_BIND_ADDRESS: &str = "0.0.0.0:8081";

/// Default active-recording lock TTL in seconds. Bounds the damage of a
/// crashed holder: the lock auto-expires if never explicitly released.
pub const DEFAULT_LOCK_TTL_SECONDS: u64 = 120;

/// Default time to wait for the engine to confirm activation before the
/// start call fails with a timeout.
pub const DEFAULT_START_TIMEOUT_SECONDS: u64 = 30;

/// Default minimum lock age before the orphaned-lock reaper will consider
/// releasing it. Freshly acquired locks are never reaped.
pub const DEFAULT_LOCK_GRACE_PERIOD_SECONDS: u64 = 300;

/// Default minimum time since the last engine progress update before a
/// recording is considered possibly abandoned.
pub const DEFAULT_STALENESS_THRESHOLD_SECONDS: u64 = 600;

/// Default interval between reaper sweeps.
pub const DEFAULT_REAPER_INTERVAL_SECONDS: u64 = 300;

/// Default bound on concurrently processed rooms within one sweep.
pub const DEFAULT_REAPER_BATCH_SIZE: usize = 10;

/// Default instance ID prefix.
pub const DEFAULT_RC_ID_PREFIX: &str = "rc";

/// Recording Controller configuration.
///
/// Loaded from environment variables with sensible defaults.
/// Sensitive fields are redacted in Debug output.
#[derive(Clone)]
pub struct Config {
    /// Redis connection URL (locks, event bus, recording store).
    /// Protected by `SecretString` to prevent accidental logging.
    pub redis_url: SecretString,

    /// Base URL of the media engine REST API.
    pub engine_api_url: String,

    /// API key for the media engine.
    /// Protected by `SecretString` to prevent accidental logging.
    pub engine_api_key: SecretString,

    /// Health endpoint bind address (default: "0.0.0.0:8081").
    pub health_bind_address: String,

    /// Unique identifier for this controller instance.
    pub rc_id: String,

    /// Active-recording lock TTL.
    pub lock_ttl: Duration,

    /// How long `start` waits for engine activation before timing out.
    pub start_timeout: Duration,

    /// Minimum lock age before the orphaned-lock reaper may release it.
    pub lock_grace_period: Duration,

    /// Minimum silence since last progress update before a recording is
    /// considered possibly abandoned.
    pub staleness_threshold: Duration,

    /// Interval between reaper sweeps.
    pub reaper_interval: Duration,

    /// Bound on concurrently processed rooms within one sweep.
    pub reaper_batch_size: usize,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("redis_url", &"[REDACTED]")
            .field("engine_api_url", &self.engine_api_url)
            .field("engine_api_key", &"[REDACTED]")
            .field("health_bind_address", &self.health_bind_address)
            .field("rc_id", &self.rc_id)
            .field("lock_ttl", &self.lock_ttl)
            .field("start_timeout", &self.start_timeout)
            .field("lock_grace_period", &self.lock_grace_period)
            .field("staleness_threshold", &self.staleness_threshold)
            .field("reaper_interval", &self.reaper_interval)
            .field("reaper_batch_size", &self.reaper_batch_size)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a `HashMap` (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let redis_url = SecretString::from(
            vars.get("REDIS_URL")
                .ok_or_else(|| ConfigError::MissingEnvVar("REDIS_URL".to_string()))?
                .clone(),
        );

        let engine_api_url = vars
            .get("ENGINE_API_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("ENGINE_API_URL".to_string()))?
            .clone();

        let engine_api_key = SecretString::from(
            vars.get("ENGINE_API_KEY")
                .ok_or_else(|| ConfigError::MissingEnvVar("ENGINE_API_KEY".to_string()))?
                .clone(),
        );

        let health_bind_address = vars
            .get("RC_HEALTH_BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_HEALTH_BIND_ADDRESS.to_string());

        let lock_ttl = parse_seconds(vars, "RC_LOCK_TTL_SECONDS", DEFAULT_LOCK_TTL_SECONDS)?;
        let start_timeout =
            parse_seconds(vars, "RC_START_TIMEOUT_SECONDS", DEFAULT_START_TIMEOUT_SECONDS)?;
        let lock_grace_period = parse_seconds(
            vars,
            "RC_LOCK_GRACE_PERIOD_SECONDS",
            DEFAULT_LOCK_GRACE_PERIOD_SECONDS,
        )?;
        let staleness_threshold = parse_seconds(
            vars,
            "RC_STALENESS_THRESHOLD_SECONDS",
            DEFAULT_STALENESS_THRESHOLD_SECONDS,
        )?;
        let reaper_interval = parse_seconds(
            vars,
            "RC_REAPER_INTERVAL_SECONDS",
            DEFAULT_REAPER_INTERVAL_SECONDS,
        )?;

        let reaper_batch_size = match vars.get("RC_REAPER_BATCH_SIZE") {
            Some(raw) => raw.parse().map_err(|_| {
                ConfigError::InvalidValue(format!("RC_REAPER_BATCH_SIZE: {raw}"))
            })?,
            None => DEFAULT_REAPER_BATCH_SIZE,
        };
        if reaper_batch_size == 0 {
            return Err(ConfigError::InvalidValue(
                "RC_REAPER_BATCH_SIZE must be at least 1".to_string(),
            ));
        }

        // Generate instance ID
        let rc_id = vars.get("RC_ID").cloned().unwrap_or_else(|| {
            let hostname = std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string());
            let uuid_suffix = uuid::Uuid::new_v4().to_string();
            let short_suffix = uuid_suffix.get(..8).unwrap_or("00000000");
            format!("{DEFAULT_RC_ID_PREFIX}-{hostname}-{short_suffix}")
        });

        Ok(Config {
            redis_url,
            engine_api_url,
            engine_api_key,
            health_bind_address,
            rc_id,
            lock_ttl,
            start_timeout,
            lock_grace_period,
            staleness_threshold,
            reaper_interval,
            reaper_batch_size,
        })
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    name: &str,
    default_seconds: u64,
) -> Result<Duration, ConfigError> {
    match vars.get(name) {
        Some(raw) => {
            let seconds: u64 = raw
                .parse()
                .map_err(|_| ConfigError::InvalidValue(format!("{name}: {raw}")))?;
            Ok(Duration::from_secs(seconds))
        }
        None => Ok(Duration::from_secs(default_seconds)),
    }
}
