//! Process settings
//!
//! Values come from the environment, optionally seeded from `.env` files.
//! Precedence (highest first): variables already set, `./.env`,
//! `~/.runhook/.env`.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{CoreError, Result};

pub const DATABASE_URL: &str = "DATABASE_URL";
pub const DATABASE_CONNECTION_LIMIT: &str = "DATABASE_CONNECTION_LIMIT";
pub const DATABASE_POOL_TIMEOUT: &str = "DATABASE_POOL_TIMEOUT";
pub const NOTIFICATION_TIMEOUT_MS: &str = "NOTIFICATION_TIMEOUT_MS";

const DEFAULT_CONNECTION_LIMIT: u32 = 10;
const DEFAULT_POOL_TIMEOUT_SECS: u64 = 60;

/// Settings consumed at process start
#[derive(Clone, PartialEq)]
pub struct Settings {
    /// Base connection string, may embed credentials
    pub database_url: String,
    /// Maximum pooled connections
    pub connection_limit: u32,
    /// Seconds to wait for a pooled connection
    pub pool_timeout_secs: u64,
    /// Outbound notification deadline; `None` keeps the transport default
    pub notification_timeout: Option<Duration>,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("database_url", &"<hidden>")
            .field("connection_limit", &self.connection_limit)
            .field("pool_timeout_secs", &self.pool_timeout_secs)
            .field("notification_timeout", &self.notification_timeout)
            .finish()
    }
}

impl Settings {
    /// Read settings from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read settings through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(DATABASE_URL)
            .filter(|value| !value.trim().is_empty())
            .ok_or(CoreError::MissingVar { name: DATABASE_URL })?;

        let connection_limit = parse_var(&lookup, DATABASE_CONNECTION_LIMIT)?
            .unwrap_or(DEFAULT_CONNECTION_LIMIT);
        if connection_limit == 0 {
            return Err(CoreError::invalid_var(
                DATABASE_CONNECTION_LIMIT,
                "must be at least 1",
            ));
        }

        let pool_timeout_secs =
            parse_var(&lookup, DATABASE_POOL_TIMEOUT)?.unwrap_or(DEFAULT_POOL_TIMEOUT_SECS);
        let notification_timeout =
            parse_var::<u64, _>(&lookup, NOTIFICATION_TIMEOUT_MS)?.map(Duration::from_millis);

        Ok(Self {
            database_url,
            connection_limit,
            pool_timeout_secs,
            notification_timeout,
        })
    }
}

fn parse_var<T, F>(lookup: &F, name: &'static str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    match lookup(name) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|err| CoreError::invalid_var(name, format!("'{}': {}", raw, err))),
    }
}

/// Get the runhook config directory path (~/.runhook)
pub fn config_dir() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".runhook"))
}

/// Load environment variables from .env files.
///
/// dotenvy never overwrites variables that are already set, so the current
/// directory is read first and the global file only fills gaps.
pub fn load_dotenv() {
    let mut loaded_from = Vec::new();

    if let Ok(path) = dotenvy::dotenv() {
        debug!("Loaded .env from current directory: {}", path.display());
        loaded_from.push(path.display().to_string());
    }

    if let Some(env_file) = config_dir().map(|dir| dir.join(".env")) {
        if env_file.exists() {
            match dotenvy::from_path(&env_file) {
                Ok(()) => {
                    debug!("Loaded .env from ~/.runhook: {}", env_file.display());
                    loaded_from.push(env_file.display().to_string());
                }
                Err(e) => debug!("Failed to load {}: {}", env_file.display(), e),
            }
        }
    }

    if loaded_from.is_empty() {
        debug!("No .env files found (current dir or ~/.runhook)");
    } else {
        info!("Loaded configuration from: {}", loaded_from.join(", "));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_defaults_apply() {
        let settings =
            Settings::from_lookup(lookup(&[(DATABASE_URL, "postgres://localhost/runs")])).unwrap();
        assert_eq!(settings.connection_limit, 10);
        assert_eq!(settings.pool_timeout_secs, 60);
        assert_eq!(settings.notification_timeout, None);
    }

    #[test]
    fn test_missing_database_url() {
        let err = Settings::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, CoreError::MissingVar { name: DATABASE_URL }));

        let err = Settings::from_lookup(lookup(&[(DATABASE_URL, "  ")])).unwrap_err();
        assert!(matches!(err, CoreError::MissingVar { .. }));
    }

    #[test]
    fn test_overrides_and_invalid_numbers() {
        let settings = Settings::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://localhost/runs"),
            (DATABASE_CONNECTION_LIMIT, "3"),
            (DATABASE_POOL_TIMEOUT, "5"),
            (NOTIFICATION_TIMEOUT_MS, "1500"),
        ]))
        .unwrap();
        assert_eq!(settings.connection_limit, 3);
        assert_eq!(settings.pool_timeout_secs, 5);
        assert_eq!(
            settings.notification_timeout,
            Some(Duration::from_millis(1500))
        );

        let err = Settings::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://localhost/runs"),
            (DATABASE_CONNECTION_LIMIT, "lots"),
        ]))
        .unwrap_err();
        assert!(err.to_string().contains(DATABASE_CONNECTION_LIMIT));

        let err = Settings::from_lookup(lookup(&[
            (DATABASE_URL, "postgres://localhost/runs"),
            (DATABASE_CONNECTION_LIMIT, "0"),
        ]))
        .unwrap_err();
        assert!(matches!(err, CoreError::InvalidVar { .. }));
    }

    #[test]
    fn test_debug_hides_database_url() {
        let settings = Settings::from_lookup(lookup(&[(
            DATABASE_URL,
            "postgres://app:hunter2@db/runs",
        )]))
        .unwrap();
        assert!(!format!("{:?}", settings).contains("hunter2"));
    }

    #[test]
    fn test_config_dir_returns_path() {
        if let Some(path) = config_dir() {
            assert!(path.ends_with(".runhook"));
        }
    }
}
