//! # Persistence Errors
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sqlx::Error ─────────────┐                                             │
//! │  MigrateError ────────────┤                                             │
//! │  devis.toml / DEVIS_* ────┼──► DbError ──► caller (CLI, HTTP handler)   │
//! │  EngineError (bad tree) ──┘                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use devis_core::config::ConfigError;
use devis_core::EngineError;
use sqlx::error::ErrorKind as SqlErrorKind;
use thiserror::Error;

/// Everything that can go wrong between the engine and the database.
#[derive(Debug, Error)]
pub enum DbError {
    /// ## When This Occurs
    /// - Loading or deleting a quote id that is not stored
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// ## When This Occurs
    /// - The same item id appears twice in one saved quote
    #[error("Duplicate value violates {constraint}")]
    UniqueViolation { constraint: String },

    /// ## When This Occurs
    /// - An item row names a parent or quote that is not stored
    #[error("Foreign key violation: {message}")]
    ForeignKeyViolation { message: String },

    /// NOT NULL or CHECK constraint (bad item type, position 0, ...).
    #[error("Constraint violation: {message}")]
    ConstraintViolation { message: String },

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Every connection stayed busy past the acquire timeout.
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// A stored column could not be turned back into a domain value.
    #[error("Cannot decode {column}: {message}")]
    Decode { column: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    /// A stored tree was refused by the engine on load.
    #[error("Stored quote is inconsistent: {0}")]
    Engine(#[from] EngineError),

    #[error("Internal database error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        DbError::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    pub fn decode(column: impl Into<String>, message: impl ToString) -> Self {
        DbError::Decode {
            column: column.into(),
            message: message.to_string(),
        }
    }
}

/// ## Mapping
/// ```text
/// RowNotFound                 → NotFound
/// Database (by ErrorKind)     → UniqueViolation / ForeignKeyViolation /
///                               ConstraintViolation / QueryFailed
/// PoolTimedOut                → PoolExhausted
/// PoolClosed                  → ConnectionFailed
/// ColumnDecode                → Decode
/// anything else               → Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::not_found("Row", "unknown"),

            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                match db_err.kind() {
                    SqlErrorKind::UniqueViolation => DbError::UniqueViolation {
                        // SQLite: "UNIQUE constraint failed: quote_items.id"
                        constraint: message
                            .rsplit(": ")
                            .next()
                            .unwrap_or(message.as_str())
                            .to_string(),
                    },
                    SqlErrorKind::ForeignKeyViolation => DbError::ForeignKeyViolation { message },
                    SqlErrorKind::NotNullViolation | SqlErrorKind::CheckViolation => {
                        DbError::ConstraintViolation { message }
                    }
                    _ => DbError::QueryFailed(message),
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("pool is closed".to_string()),

            sqlx::Error::ColumnDecode { index, source } => DbError::decode(index, source),

            other => DbError::Internal(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<ConfigError> for DbError {
    fn from(err: ConfigError) -> Self {
        DbError::Config(err.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
