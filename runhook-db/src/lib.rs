//! runhook-db: PostgreSQL store client for run records
//!
//! - [`pool`]: connection target and eager pool setup
//! - [`transaction`]: run a callback in a transaction, or pass through when
//!   already inside one
//! - [`repos`]: run repository and its write-notification decorator
//! - [`migrations`]: schema

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repos;
pub mod transaction;

#[cfg(test)]
mod test_support;

pub use error::{DbError, DbResult, KnownStoreError, QUERY_CANCELED};
pub use pool::{connect, ConnectionTarget};
pub use repos::{NotifyingRunRepository, PgRunRepository, RunRepository, WriteOperation};
pub use transaction::{
    run_in_transaction, IsolationLevel, PgStore, ScopedFuture, StoreClient, TransactionOptions,
    TransactionalStore,
};
