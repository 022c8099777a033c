//! # Database Error Types
//!
//! Error types for database operations.
//!
//! ## Error Flow
//! ```text
//! sqlx::Error ──► DbError (this module) ──► ApiError (apps/api) ──► envelope
//! ```
//!
//! `DbError::Core` lets a transaction body abort with a domain error
//! (insufficient stock, invalid transition); the enclosing transaction is
//! dropped and rolled back, so no partial write survives the error.

use thiserror::Error;

use bindery_core::CoreError;

/// Database operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Entity not found in database.
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// Unique constraint violation.
    #[error("Duplicate {field}: '{value}' already exists")]
    UniqueViolation { field: String, value: String },

    /// Foreign key constraint violation.
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// Database connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// The storage engine could not complete the transaction (lock
    /// contention, timeout). Nothing partial survives; safe to retry
    /// with the same idempotency key.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A business rule aborted the operation. The transaction that
    /// carried it has been rolled back.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// Internal database error.
    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    /// Creates a NotFound error for a given entity type and ID.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// True when retrying the same request (same idempotency key) is
    /// safe and may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DbError::TransactionFailed(_)
                | DbError::PoolExhausted
                | DbError::Core(CoreError::DuplicateCheckout)
        )
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound     → DbError::NotFound
/// sqlx::Error::Database(busy)  → DbError::TransactionFailed (retryable)
/// sqlx::Error::Database(other) → constraint analysis
/// sqlx::Error::PoolTimedOut    → DbError::PoolExhausted
/// Other                        → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::NotFound {
                entity: "Record".to_string(),
                id: "unknown".to_string(),
            },

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message().to_string();

                // SQLITE_BUSY / SQLITE_LOCKED surface as lock contention;
                // the enclosing transaction rolled back cleanly.
                if msg.contains("database is locked") || msg.contains("database table is locked")
                {
                    return DbError::TransactionFailed(msg);
                }

                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::UniqueViolation {
                        field,
                        value: "unknown".to_string(),
                    }
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ForeignKeyViolation { message: msg }
                } else {
                    DbError::QueryFailed(msg)
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(DbError::TransactionFailed("locked".into()).is_retryable());
        assert!(DbError::PoolExhausted.is_retryable());
        assert!(DbError::Core(CoreError::DuplicateCheckout).is_retryable());

        assert!(!DbError::not_found("Order", "o1").is_retryable());
        assert!(!DbError::Core(CoreError::EmptyCart).is_retryable());
    }
}
