//! Database connection target and pool setup
//!
//! The base `DATABASE_URL` is normalized into a [`ConnectionTarget`] that
//! records the pool limits as `connection_limit` / `pool_timeout` query
//! parameters. Only the password-free rendering is ever logged.

use std::time::Duration;

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use tracing::info;
use url::Url;

use crate::error::{DbError, DbResult};
use crate::transaction::PgStore;

pub const CONNECTION_LIMIT_PARAM: &str = "connection_limit";
pub const POOL_TIMEOUT_PARAM: &str = "pool_timeout";

/// A database URL with pool limits applied
#[derive(Clone)]
pub struct ConnectionTarget {
    url: Url,
    connection_limit: u32,
    pool_timeout: Duration,
}

impl std::fmt::Debug for ConnectionTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionTarget")
            .field("url", &self.redacted())
            .field("connection_limit", &self.connection_limit)
            .field("pool_timeout", &self.pool_timeout)
            .finish()
    }
}

impl ConnectionTarget {
    /// Parse `database_url` and set the pool parameters, replacing any
    /// values already present and keeping every other query parameter.
    pub fn new(database_url: &str, connection_limit: u32, pool_timeout_secs: u64) -> DbResult<Self> {
        // The parse error never echoes the input, so credentials stay out of it
        let mut url = Url::parse(database_url).map_err(|e| DbError::InvalidUrl(e.to_string()))?;

        let retained = query_without_pool_params(&url);
        url.query_pairs_mut()
            .clear()
            .extend_pairs(retained.iter())
            .append_pair(CONNECTION_LIMIT_PARAM, &connection_limit.to_string())
            .append_pair(POOL_TIMEOUT_PARAM, &pool_timeout_secs.to_string());

        Ok(Self {
            url,
            connection_limit,
            pool_timeout: Duration::from_secs(pool_timeout_secs),
        })
    }

    pub fn from_settings(settings: &runhook_core::Settings) -> DbResult<Self> {
        Self::new(
            &settings.database_url,
            settings.connection_limit,
            settings.pool_timeout_secs,
        )
    }

    pub fn connection_limit(&self) -> u32 {
        self.connection_limit
    }

    pub fn pool_timeout(&self) -> Duration {
        self.pool_timeout
    }

    /// The full URL, credentials included. Never log this.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The URL with its password removed, safe for diagnostics
    pub fn redacted(&self) -> String {
        let mut url = self.url.clone();
        if url.password().is_some() {
            // Fails only for cannot-be-a-base URLs, which have no password
            let _ = url.set_password(None);
        }
        url.to_string()
    }

    /// Driver options. Pool sizing is applied to the pool, not forwarded to
    /// the server as connection parameters.
    pub fn connect_options(&self) -> DbResult<PgConnectOptions> {
        let mut url = self.url.clone();
        let retained = query_without_pool_params(&url);
        if retained.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(retained.iter());
        }

        url.as_str()
            .parse::<PgConnectOptions>()
            .map_err(DbError::from)
    }
}

fn query_without_pool_params(url: &Url) -> Vec<(String, String)> {
    url.query_pairs()
        .filter(|(key, _)| key != CONNECTION_LIMIT_PARAM && key != POOL_TIMEOUT_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect()
}

/// Open the pool eagerly: the first connection is established before this
/// returns, so a bad target fails at startup instead of on first query.
pub async fn connect(target: &ConnectionTarget) -> DbResult<PgStore> {
    info!(url = %target.redacted(), "setting up database pool");

    let pool = PgPoolOptions::new()
        .max_connections(target.connection_limit)
        .acquire_timeout(target.pool_timeout)
        .connect_with(target.connect_options()?)
        .await?;

    info!(
        max_connections = target.connection_limit,
        "database pool connected"
    );
    Ok(PgStore::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(target: &ConnectionTarget) -> Vec<(String, String)> {
        target
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    #[test]
    fn adds_pool_params() {
        let target = ConnectionTarget::new("postgres://app:secret@db:5432/runs", 10, 60).unwrap();
        assert_eq!(
            params(&target),
            vec![
                ("connection_limit".to_string(), "10".to_string()),
                ("pool_timeout".to_string(), "60".to_string()),
            ]
        );
        assert_eq!(target.connection_limit(), 10);
        assert_eq!(target.pool_timeout(), Duration::from_secs(60));
    }

    #[test]
    fn keeps_existing_params_and_replaces_pool_params() {
        let target = ConnectionTarget::new(
            "postgres://app:secret@db/runs?sslmode=require&connection_limit=99&schema=public",
            5,
            30,
        )
        .unwrap();

        let params = params(&target);
        assert!(params.contains(&("sslmode".to_string(), "require".to_string())));
        assert!(params.contains(&("schema".to_string(), "public".to_string())));
        assert!(params.contains(&("connection_limit".to_string(), "5".to_string())));
        assert!(params.contains(&("pool_timeout".to_string(), "30".to_string())));
        assert_eq!(
            params.iter().filter(|(k, _)| k == "connection_limit").count(),
            1
        );
    }

    #[test]
    fn redacted_drops_password() {
        let target = ConnectionTarget::new("postgres://app:s3cr3t@db/runs", 10, 60).unwrap();
        let redacted = target.redacted();
        assert!(!redacted.contains("s3cr3t"));
        assert!(redacted.starts_with("postgres://app@db/runs"));
        assert!(redacted.contains("connection_limit=10"));
        assert!(!format!("{:?}", target).contains("s3cr3t"));
    }

    #[test]
    fn connect_options_strip_pool_params() {
        let target = ConnectionTarget::new("postgres://app:secret@db:6543/runs", 10, 60).unwrap();
        let options = target.connect_options().unwrap();
        assert_eq!(options.get_host(), "db");
        assert_eq!(options.get_port(), 6543);
        assert_eq!(options.get_database(), Some("runs"));
    }

    #[test]
    fn invalid_url_does_not_echo_input() {
        let err = ConnectionTarget::new("not a url with hunter2", 10, 60).unwrap_err();
        assert!(matches!(err, DbError::InvalidUrl(_)));
        assert!(!err.to_string().contains("hunter2"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn connects_eagerly() {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        let target = ConnectionTarget::new(&url, 2, 5).unwrap();
        let store = connect(&target).await.expect("connect failed");

        let result: (i32,) = sqlx::query_as("SELECT 1")
            .fetch_one(store.pool())
            .await
            .expect("query failed");
        assert_eq!(result.0, 1);
    }
}
