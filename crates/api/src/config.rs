use std::str::FromStr;

use chrono::Duration;
use rotor_core::allocation::DEFAULT_MAX_POINTS_PER_SYSTEM;
use rotor_core::hashing::sha256_hex;
use rotor_core::renewal::{
    RenewalPolicy, DEFAULT_FAILURE_COOLDOWN_MINUTES, DEFAULT_LEASE_TIMEOUT_SECS,
    DEFAULT_RENEWAL_COOLDOWN_MINUTES, DEFAULT_RENEWAL_VALIDITY_HOURS,
    DEFAULT_CREATION_VALIDITY_HOURS,
};

/// Errors raised while reading configuration from the environment.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{var} has invalid value '{value}': {reason}")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Log output format selected by `LOG_FORMAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines.
    Pretty,
    /// One JSON object per line.
    Json,
}

/// Server configuration loaded from environment variables.
///
/// Runtime-tunable automation settings (enable switch, batch size,
/// generation interval, advance window) live in the database instead.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Time allowed for background loops to stop on shutdown (default: `30`).
    pub shutdown_timeout_secs: u64,
    /// SHA-256 hex digest of the shared `AUTOMATION_KEY`.
    pub automation_key_digest: String,
    /// Renewal timing windows. The advance window is replaced at runtime by
    /// the value stored in `automation_config`.
    pub policy: RenewalPolicy,
    /// Renewal detector period in seconds.
    pub detector_tick_secs: u64,
    /// Lease reaper period in seconds.
    pub reaper_tick_secs: u64,
    /// Generation scheduler period in seconds.
    pub generation_tick_secs: u64,
    /// Upper bound for `pointsPerSystem` in fixed-capacity distributions.
    pub max_points_per_system: i32,
    /// Base URL of the external directory. `None` disables mirroring.
    pub directory_url: Option<String>,
    /// Bearer token for the directory.
    pub directory_token: Option<String>,
    /// Directory reconciler period in seconds.
    pub directory_sync_interval_secs: u64,
    /// Operator webhook for failure notifications.
    pub notify_webhook_url: Option<String>,
    /// Log output format.
    pub log_format: LogFormat,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `HOST`                         | `0.0.0.0`               |
    /// | `PORT`                         | `3000`                  |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS`        | `30`                    |
    /// | `AUTOMATION_KEY`               | required                |
    /// | `DETECTOR_TICK_SECS`           | `60`                    |
    /// | `REAPER_TICK_SECS`             | `60`                    |
    /// | `GENERATION_TICK_SECS`         | `60`                    |
    /// | `LEASE_TIMEOUT_SECS`           | `900`                   |
    /// | `RENEWAL_COOLDOWN_MINUTES`     | `30`                    |
    /// | `FAILURE_COOLDOWN_MINUTES`     | `15`                    |
    /// | `RENEWAL_VALIDITY_HOURS`       | `6`                     |
    /// | `CREATION_VALIDITY_HOURS`      | `168`                   |
    /// | `MAX_POINTS_PER_SYSTEM`        | `50`                    |
    /// | `DIRECTORY_URL`                | unset (mirroring off)   |
    /// | `DIRECTORY_TOKEN`              | unset                   |
    /// | `DIRECTORY_SYNC_INTERVAL_SECS` | `120`                   |
    /// | `NOTIFY_WEBHOOK_URL`           | unset                   |
    /// | `LOG_FORMAT`                   | `pretty` (or `json`)    |
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());
        let port: u16 = parse_var("PORT", 3000)?;

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let automation_key = optional_var("AUTOMATION_KEY").ok_or(ConfigError::Missing("AUTOMATION_KEY"))?;

        let policy = RenewalPolicy {
            cooldown: Duration::minutes(parse_var(
                "RENEWAL_COOLDOWN_MINUTES",
                DEFAULT_RENEWAL_COOLDOWN_MINUTES,
            )?),
            failure_cooldown: Duration::minutes(parse_var(
                "FAILURE_COOLDOWN_MINUTES",
                DEFAULT_FAILURE_COOLDOWN_MINUTES,
            )?),
            renewal_validity: Duration::hours(parse_var(
                "RENEWAL_VALIDITY_HOURS",
                DEFAULT_RENEWAL_VALIDITY_HOURS,
            )?),
            creation_validity: Duration::hours(parse_var(
                "CREATION_VALIDITY_HOURS",
                DEFAULT_CREATION_VALIDITY_HOURS,
            )?),
            lease_timeout: Duration::seconds(parse_var(
                "LEASE_TIMEOUT_SECS",
                DEFAULT_LEASE_TIMEOUT_SECS,
            )?),
            ..RenewalPolicy::default()
        };
        policy.validate().map_err(|e| ConfigError::Invalid {
            var: "renewal windows",
            value: format!("{policy:?}"),
            reason: e.to_string(),
        })?;

        let max_points_per_system: i32 =
            parse_var("MAX_POINTS_PER_SYSTEM", DEFAULT_MAX_POINTS_PER_SYSTEM)?;
        if max_points_per_system < 1 {
            return Err(ConfigError::Invalid {
                var: "MAX_POINTS_PER_SYSTEM",
                value: max_points_per_system.to_string(),
                reason: "must be at least 1".into(),
            });
        }

        let log_format = match optional_var("LOG_FORMAT").as_deref() {
            None | Some("pretty") => LogFormat::Pretty,
            Some("json") => LogFormat::Json,
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "LOG_FORMAT",
                    value: other.to_string(),
                    reason: "expected 'pretty' or 'json'".into(),
                })
            }
        };

        Ok(Self {
            host,
            port,
            cors_origins,
            request_timeout_secs: parse_var("REQUEST_TIMEOUT_SECS", 30)?,
            shutdown_timeout_secs: parse_var("SHUTDOWN_TIMEOUT_SECS", 30)?,
            automation_key_digest: sha256_hex(automation_key.as_bytes()),
            policy,
            detector_tick_secs: parse_positive("DETECTOR_TICK_SECS", 60)?,
            reaper_tick_secs: parse_positive("REAPER_TICK_SECS", 60)?,
            generation_tick_secs: parse_positive("GENERATION_TICK_SECS", 60)?,
            max_points_per_system,
            directory_url: optional_var("DIRECTORY_URL"),
            directory_token: optional_var("DIRECTORY_TOKEN"),
            directory_sync_interval_secs: parse_positive("DIRECTORY_SYNC_INTERVAL_SECS", 120)?,
            notify_webhook_url: optional_var("NOTIFY_WEBHOOK_URL"),
            log_format,
        })
    }
}

/// A set, non-blank environment variable.
fn optional_var(var: &'static str) -> Option<String> {
    std::env::var(var)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Parse an environment variable, falling back to `default` when unset.
fn parse_var<T>(var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match optional_var(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError::Invalid {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

/// Parse a period in seconds that must be non-zero (interval timers panic
/// on a zero period).
fn parse_positive(var: &'static str, default: u64) -> Result<u64, ConfigError> {
    let value = parse_var(var, default)?;
    if value == 0 {
        return Err(ConfigError::Invalid {
            var,
            value: value.to_string(),
            reason: "must be greater than zero".into(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_var_uses_default_when_unset() {
        let value: u64 = parse_var("ROTOR_TEST_SURELY_UNSET_VAR", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn config_error_messages() {
        assert_eq!(
            ConfigError::Missing("AUTOMATION_KEY").to_string(),
            "AUTOMATION_KEY must be set"
        );
        let err = ConfigError::Invalid {
            var: "PORT",
            value: "x".into(),
            reason: "invalid digit found in string".into(),
        };
        assert_eq!(
            err.to_string(),
            "PORT has invalid value 'x': invalid digit found in string"
        );
    }
}
