use crate::error::{Error, Result};
use crate::lockdown::enforcer::DEFAULT_MONITOR_INTERVAL;
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_address: String,
    pub database_url: String,
    pub jwt_secret: String,
    pub authorize_attempts_per_minute: u32,
    pub session_cookie_secure: bool,
    pub policy: LockdownPolicy,
}

/// Lifetimes and lockout thresholds for the authorization and launch flow.
#[derive(Debug, Clone)]
pub struct LockdownPolicy {
    pub authorization_ttl_minutes: i64,
    pub session_grace_minutes: i64,
    pub session_min_minutes: i64,
    pub lockout_max_failures: i32,
    pub lockout_minutes: i64,
}

impl Default for LockdownPolicy {
    fn default() -> Self {
        Self {
            authorization_ttl_minutes: 15,
            session_grace_minutes: 10,
            session_min_minutes: 5,
            lockout_max_failures: 5,
            lockout_minutes: 5,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();
        let defaults = LockdownPolicy::default();

        Ok(Self {
            server_address: get_env("SERVER_ADDRESS")?,
            database_url: get_env("DATABASE_URL")?,
            jwt_secret: get_env("JWT_SECRET")?,
            authorize_attempts_per_minute: get_env_parse_or("AUTHORIZE_ATTEMPTS_PER_MINUTE", 10)?,
            session_cookie_secure: get_env_parse_or("SESSION_COOKIE_SECURE", false)?,
            policy: LockdownPolicy {
                authorization_ttl_minutes: get_env_parse_or(
                    "AUTHORIZATION_TTL_MINUTES",
                    defaults.authorization_ttl_minutes,
                )?,
                session_grace_minutes: get_env_parse_or(
                    "SESSION_GRACE_MINUTES",
                    defaults.session_grace_minutes,
                )?,
                session_min_minutes: get_env_parse_or(
                    "SESSION_MIN_MINUTES",
                    defaults.session_min_minutes,
                )?,
                lockout_max_failures: get_env_parse_or(
                    "LOCKOUT_MAX_FAILURES",
                    defaults.lockout_max_failures,
                )?,
                lockout_minutes: get_env_parse_or("LOCKOUT_MINUTES", defaults.lockout_minutes)?,
            },
        })
    }
}

/// Settings for the desktop client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub server_url: url::Url,
    pub monitor_interval: Duration,
    pub http_timeout: Duration,
}

impl ClientConfig {
    pub fn from_env() -> Result<Self> {
        dotenv().ok();

        let raw_url = get_env("EXAM_SERVER_URL")?;
        let server_url = url::Url::parse(&raw_url)
            .map_err(|e| Error::Config(format!("Invalid value for EXAM_SERVER_URL: {}", e)))?;

        Ok(Self {
            server_url,
            monitor_interval: monitor_interval(get_env_parse_or(
                "EXAM_MONITOR_INTERVAL_MS",
                DEFAULT_MONITOR_INTERVAL.as_millis() as u64,
            )?)?,
            http_timeout: Duration::from_secs(get_env_parse_or("EXAM_HTTP_TIMEOUT_SECS", 30u64)?),
        })
    }
}

/// The self-healing tick needs a non-zero period.
fn monitor_interval(millis: u64) -> Result<Duration> {
    if millis == 0 {
        return Err(Error::Config(
            "Invalid value for EXAM_MONITOR_INTERVAL_MS: must be greater than zero".to_string(),
        ));
    }
    Ok(Duration::from_millis(millis))
}

fn get_env(name: &str) -> Result<String> {
    env::var(name).map_err(|_| Error::Config(format!("Missing environment variable: {}", name)))
}

fn get_env_parse_or<T>(name: &str, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| Error::Config(format!("Invalid value for {}: {}", name, e))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_monitor_interval_is_rejected() {
        let err = monitor_interval(0).unwrap_err();
        assert!(matches!(err, Error::Config(ref msg) if msg.contains("EXAM_MONITOR_INTERVAL_MS")));
    }

    #[test]
    fn monitor_interval_is_taken_in_milliseconds() {
        assert_eq!(monitor_interval(250).unwrap(), Duration::from_millis(250));
    }
}
