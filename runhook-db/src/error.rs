//! Store error taxonomy
//!
//! Errors carrying a SQLSTATE code are *known*: the transaction executor
//! may log and absorb them. Everything else is unclassified and always
//! propagates.

use runhook_notify::NotifyError;
use serde_json::{json, Value};
use thiserror::Error;

/// SQLSTATE `query_canceled`, also used when the store client itself gives
/// up on a transaction deadline.
pub const QUERY_CANCELED: &str = "57014";

pub type DbResult<T> = Result<T, DbError>;

/// An error reported by the store with a classification code
#[derive(Debug, Error)]
#[error("store error {code}: {message}")]
pub struct KnownStoreError {
    pub code: String,
    pub message: String,
    /// Constraint, table and detail, when the store reported them
    pub meta: Value,
    #[source]
    pub source: Option<sqlx::Error>,
}

impl KnownStoreError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            meta: Value::Null,
            source: None,
        }
    }

    /// Deadline exceeded while acquiring or running a transaction
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(QUERY_CANCELED, message)
    }

    /// Classify a driver error. Only database errors with a SQLSTATE qualify.
    pub fn classify(err: sqlx::Error) -> Result<Self, sqlx::Error> {
        let classified = match &err {
            sqlx::Error::Database(db) => db.code().map(|code| {
                let detail = db
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .map(str::to_owned);
                let meta = json!({
                    "kind": format!("{:?}", db.kind()),
                    "constraint": db.constraint(),
                    "table": db.table(),
                    "detail": detail,
                });
                (code.into_owned(), db.message().to_owned(), meta)
            }),
            _ => None,
        };

        match classified {
            Some((code, message, meta)) => Ok(Self {
                code,
                message,
                meta,
                source: Some(err),
            }),
            None => Err(err),
        }
    }
}

/// Main error type for runhook-db operations
#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Known(#[from] KnownStoreError),

    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    /// Notification delivery failed after the write went through
    #[error(transparent)]
    Notify(#[from] NotifyError),

    #[error("invalid database url: {0}")]
    InvalidUrl(String),
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match KnownStoreError::classify(err) {
            Ok(known) => DbError::Known(known),
            Err(other) => DbError::Sqlx(other),
        }
    }
}

impl DbError {
    /// Classification code of a known store error
    pub fn code(&self) -> Option<&str> {
        match self {
            DbError::Known(known) => Some(&known.code),
            _ => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, DbError::Known(_))
    }
}
