//! Transaction-or-passthrough execution
//!
//! A [`StoreClient`] is either the root store, which can open
//! transactions, or a connection already inside one. [`run_in_transaction`]
//! accepts both: a scoped connection runs the callback directly, a root
//! store wraps it in a fresh transaction.

use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::{PgConnection, PgPool};
use tracing::{debug, warn};

use crate::error::{DbError, DbResult, KnownStoreError};

/// Wait for a transaction to start when no `max_wait` is given
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_millis(2_000);
/// Transaction run time when no `timeout` is given
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    /// Statement that applies this level to the current transaction
    pub fn set_statement(&self) -> &'static str {
        match self {
            IsolationLevel::ReadUncommitted => "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
            IsolationLevel::RepeatableRead => "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
            IsolationLevel::Serializable => "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
        }
    }
}

impl std::str::FromStr for IsolationLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "readuncommitted" => Ok(IsolationLevel::ReadUncommitted),
            "readcommitted" => Ok(IsolationLevel::ReadCommitted),
            "repeatableread" => Ok(IsolationLevel::RepeatableRead),
            "serializable" => Ok(IsolationLevel::Serializable),
            _ => Err(format!("unknown isolation level '{}'", s)),
        }
    }
}

/// Options for [`run_in_transaction`]. Ignored for scoped clients.
#[derive(Debug, Clone, Default)]
pub struct TransactionOptions {
    /// How long to wait for the transaction to start
    pub max_wait: Option<Duration>,
    /// How long the transaction may run before it is rolled back
    pub timeout: Option<Duration>,
    /// Database default when unset
    pub isolation_level: Option<IsolationLevel>,
    /// Propagate known store errors instead of returning `Ok(None)`
    pub rethrow_known_errors: bool,
}

impl TransactionOptions {
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_isolation_level(mut self, level: IsolationLevel) -> Self {
        self.isolation_level = Some(level);
        self
    }

    pub fn rethrowing(mut self) -> Self {
        self.rethrow_known_errors = true;
        self
    }
}

/// Future returned by transaction callbacks, borrowing the scoped connection
pub type ScopedFuture<'t, R> = BoxFuture<'t, DbResult<R>>;

/// A store that can run a callback inside a new transaction
pub trait TransactionalStore: Send + Sync {
    /// Connection handed to callbacks while the transaction is open
    type Conn: Send;

    /// Start a transaction, run `callback` in it, commit on `Ok` and roll
    /// back on `Err`.
    fn transaction<'a, R, F>(
        &'a self,
        options: &'a TransactionOptions,
        callback: F,
    ) -> BoxFuture<'a, DbResult<R>>
    where
        R: Send + 'a,
        F: for<'t> FnOnce(&'t mut Self::Conn) -> ScopedFuture<'t, R> + Send + 'a;
}

/// Either a store able to begin transactions or a connection already in one
pub enum StoreClient<'a, S: TransactionalStore> {
    Root(&'a S),
    Scoped(&'a mut S::Conn),
}

/// Run `callback` transactionally.
///
/// - Scoped client: the callback runs on that connection, no nested
///   transaction is started, `options` is ignored and errors propagate
///   unchanged.
/// - Root client: a transaction is started with `options`. A known store
///   error is logged once and yields `Ok(None)` unless
///   `rethrow_known_errors` is set. Other errors always propagate.
///
/// `Ok(None)` means the transaction aborted and was logged; a callback
/// returning an empty value still yields `Ok(Some(..))`.
pub async fn run_in_transaction<'a, S, R, F>(
    client: StoreClient<'a, S>,
    callback: F,
    options: &'a TransactionOptions,
) -> DbResult<Option<R>>
where
    S: TransactionalStore,
    R: Send + 'a,
    F: for<'t> FnOnce(&'t mut S::Conn) -> ScopedFuture<'t, R> + Send + 'a,
{
    let store = match client {
        StoreClient::Scoped(conn) => return callback(conn).await.map(Some),
        StoreClient::Root(store) => store,
    };

    match store.transaction(options, callback).await {
        Ok(value) => Ok(Some(value)),
        Err(DbError::Known(err)) => {
            debug!(
                code = %err.code,
                meta = %err.meta,
                store_message = %err.message,
                error = ?err,
                "transaction failed with known store error"
            );

            if options.rethrow_known_errors {
                Err(DbError::Known(err))
            } else {
                Ok(None)
            }
        }
        Err(err) => Err(err),
    }
}

/// Root store client over a PostgreSQL pool. Cloning shares the pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// This store as a root [`StoreClient`]
    pub fn client(&self) -> StoreClient<'_, Self> {
        StoreClient::Root(self)
    }
}

impl TransactionalStore for PgStore {
    type Conn = PgConnection;

    fn transaction<'a, R, F>(
        &'a self,
        options: &'a TransactionOptions,
        callback: F,
    ) -> BoxFuture<'a, DbResult<R>>
    where
        R: Send + 'a,
        F: for<'t> FnOnce(&'t mut PgConnection) -> ScopedFuture<'t, R> + Send + 'a,
    {
        Box::pin(async move {
            let max_wait = options.max_wait.unwrap_or(DEFAULT_MAX_WAIT);
            let timeout = options.timeout.unwrap_or(DEFAULT_TIMEOUT);

            let mut tx = match tokio::time::timeout(max_wait, self.pool.begin()).await {
                Ok(tx) => tx?,
                Err(_) => {
                    return Err(KnownStoreError::timeout(format!(
                        "unable to start a transaction within {} ms",
                        max_wait.as_millis()
                    ))
                    .into())
                }
            };

            if let Some(level) = options.isolation_level {
                sqlx::query(level.set_statement()).execute(&mut *tx).await?;
            }

            let outcome = match tokio::time::timeout(timeout, callback(&mut *tx)).await {
                Ok(outcome) => outcome,
                Err(_) => Err(KnownStoreError::timeout(format!(
                    "transaction exceeded its timeout of {} ms",
                    timeout.as_millis()
                ))
                .into()),
            };

            match outcome {
                Ok(value) => {
                    tx.commit().await?;
                    Ok(value)
                }
                Err(err) => {
                    if let Err(rollback) = tx.rollback().await {
                        warn!(error = %rollback, "transaction rollback failed");
                    }
                    Err(err)
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::QUERY_CANCELED;
    use crate::test_support::Captured;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct MemoryConn {
        id: usize,
        statements: Vec<String>,
    }

    /// Counts the transactions it starts and hands out connection 1
    #[derive(Default)]
    struct MemoryStore {
        started: AtomicUsize,
        committed: AtomicUsize,
    }

    impl TransactionalStore for MemoryStore {
        type Conn = MemoryConn;

        fn transaction<'a, R, F>(
            &'a self,
            _options: &'a TransactionOptions,
            callback: F,
        ) -> BoxFuture<'a, DbResult<R>>
        where
            R: Send + 'a,
            F: for<'t> FnOnce(&'t mut MemoryConn) -> ScopedFuture<'t, R> + Send + 'a,
        {
            Box::pin(async move {
                self.started.fetch_add(1, Ordering::SeqCst);
                let mut conn = MemoryConn {
                    id: 1,
                    statements: Vec::new(),
                };
                let value = callback(&mut conn).await?;
                self.committed.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            })
        }
    }

    fn unique_violation() -> DbError {
        KnownStoreError::new(
            "23505",
            "duplicate key value violates unique constraint \"job_runs_pkey\"",
        )
        .into()
    }

    #[tokio::test]
    async fn scoped_client_runs_callback_on_same_connection() {
        let mut conn = MemoryConn {
            id: 7,
            statements: Vec::new(),
        };

        let seen = run_in_transaction(
            StoreClient::<MemoryStore>::Scoped(&mut conn),
            |c| {
                Box::pin(async move {
                    c.statements.push("UPDATE job_runs".into());
                    Ok(c.id)
                })
            },
            &TransactionOptions::default().with_isolation_level(IsolationLevel::Serializable),
        )
        .await
        .unwrap();

        assert_eq!(seen, Some(7));
        assert_eq!(conn.statements, vec!["UPDATE job_runs".to_string()]);
    }

    #[tokio::test]
    async fn nested_call_on_scoped_client_does_not_start_transaction() {
        let store = MemoryStore::default();
        let options = TransactionOptions::default();

        let seen = run_in_transaction(
            store.client_for_test(),
            |outer| {
                Box::pin(async move {
                    let outer_id = outer.id;
                    let inner_id = run_in_transaction(
                        StoreClient::<MemoryStore>::Scoped(outer),
                        |inner| Box::pin(async move { Ok(inner.id) }),
                        &TransactionOptions::default(),
                    )
                    .await?;
                    Ok::<_, DbError>((outer_id, inner_id))
                })
            },
            &options,
        )
        .await
        .unwrap();

        assert_eq!(seen, Some((1, Some(1))));
        assert_eq!(store.started.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn root_client_commits_and_returns_value() {
        let store = MemoryStore::default();
        let options = TransactionOptions::default();

        let value = run_in_transaction(
            store.client_for_test(),
            |_| Box::pin(async move { Ok(()) }),
            &options,
        )
        .await
        .unwrap();

        // An empty result is still a result
        assert_eq!(value, Some(()));
        assert_eq!(store.committed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn known_error_is_logged_once_and_absorbed() {
        let captured = Captured::default();
        let _guard = captured.install();

        let store = MemoryStore::default();
        let options = TransactionOptions::default();
        let value: Option<u32> = run_in_transaction(
            store.client_for_test(),
            |_| Box::pin(async move { Err(unique_violation()) }),
            &options,
        )
        .await
        .unwrap();

        assert_eq!(value, None);
        let lines = captured.lines();
        assert_eq!(lines.len(), 1, "{:?}", lines);
        assert!(lines[0].contains("23505"));
        assert_eq!(store.committed.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn known_error_propagates_when_rethrow_requested() {
        let store = MemoryStore::default();
        let options = TransactionOptions::default().rethrowing();

        let err = run_in_transaction::<_, u32, _>(
            store.client_for_test(),
            |_| Box::pin(async move { Err(unique_violation()) }),
            &options,
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), Some("23505"));
    }

    #[tokio::test]
    async fn unknown_errors_always_propagate() {
        for options in [
            TransactionOptions::default(),
            TransactionOptions::default().rethrowing(),
        ] {
            let store = MemoryStore::default();
            let err = run_in_transaction::<_, u32, _>(
                store.client_for_test(),
                |_| Box::pin(async move { Err(DbError::Sqlx(sqlx::Error::PoolClosed)) }),
                &options,
            )
            .await
            .unwrap_err();

            assert!(matches!(err, DbError::Sqlx(sqlx::Error::PoolClosed)));
        }
    }

    #[tokio::test]
    async fn scoped_client_propagates_known_errors() {
        let mut conn = MemoryConn::default();
        let err = run_in_transaction::<MemoryStore, u32, _>(
            StoreClient::Scoped(&mut conn),
            |_| Box::pin(async move { Err(unique_violation()) }),
            &TransactionOptions::default(),
        )
        .await
        .unwrap_err();

        assert!(err.is_known());
    }

    #[test]
    fn isolation_level_parsing() {
        assert_eq!(
            "repeatable-read".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::RepeatableRead
        );
        assert_eq!(
            "Serializable".parse::<IsolationLevel>().unwrap(),
            IsolationLevel::Serializable
        );
        assert!("snapshot".parse::<IsolationLevel>().is_err());
        assert!(IsolationLevel::ReadCommitted
            .set_statement()
            .ends_with("READ COMMITTED"));
    }

    impl MemoryStore {
        fn client_for_test(&self) -> StoreClient<'_, Self> {
            StoreClient::Root(self)
        }
    }

    async fn pg_store() -> PgStore {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL required");
        PgStore::new(PgPool::connect(&url).await.expect("pool creation failed"))
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pg_applies_isolation_level() {
        let store = pg_store().await;
        let options = TransactionOptions::default().with_isolation_level(IsolationLevel::Serializable);

        let level = run_in_transaction(
            store.client(),
            |conn| {
                Box::pin(async move {
                    let level: String =
                        sqlx::query_scalar("SELECT current_setting('transaction_isolation')")
                            .fetch_one(&mut *conn)
                            .await?;
                    Ok::<_, DbError>(level)
                })
            },
            &options,
        )
        .await
        .unwrap();

        assert_eq!(level.as_deref(), Some("serializable"));
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pg_classifies_and_absorbs_constraint_violation() {
        let store = pg_store().await;
        let options = TransactionOptions::default();

        let value = run_in_transaction(
            store.client(),
            |conn| {
                Box::pin(async move {
                    sqlx::query("CREATE TEMP TABLE uniq (id INT PRIMARY KEY)")
                        .execute(&mut *conn)
                        .await?;
                    sqlx::query("INSERT INTO uniq VALUES (1), (1)")
                        .execute(&mut *conn)
                        .await?;
                    Ok::<_, DbError>(())
                })
            },
            &options,
        )
        .await
        .unwrap();

        assert_eq!(value, None);
    }

    #[tokio::test]
    #[ignore = "requires database"]
    async fn pg_timeout_is_known_error() {
        let store = pg_store().await;
        let options = TransactionOptions::default()
            .with_timeout(Duration::from_millis(50))
            .rethrowing();

        let err = run_in_transaction(
            store.client(),
            |conn| {
                Box::pin(async move {
                    sqlx::query("SELECT pg_sleep(1)").execute(&mut *conn).await?;
                    Ok::<_, DbError>(())
                })
            },
            &options,
        )
        .await
        .unwrap_err();

        assert_eq!(err.code(), Some(QUERY_CANCELED));
    }
}
