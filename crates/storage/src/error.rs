//! Error types for grid table and catalog storage.

use thiserror::Error;

/// SQLSTATE for unique constraint violations.
const UNIQUE_VIOLATION: &str = "23505";

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Batch does not match schema of table {table}: {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("Duplicate key in {table}: {detail}")]
    DuplicateKey { table: String, detail: String },

    #[error("Lookup of {entity} '{key}' matched {count} rows, expected at most one")]
    AmbiguousLookup {
        entity: &'static str,
        key: String,
        count: usize,
    },

    #[error("Invalid identifier '{name}': {reason}")]
    InvalidIdentifier { name: String, reason: String },

    #[error("Unknown contextual layer category '{category}'")]
    UnknownCategory { category: String },

    #[error("{0} is not initialized")]
    NotInitialized(String),
}

impl StorageError {
    /// Map a database error raised while writing `table`, turning unique
    /// violations into `DuplicateKey`.
    pub fn from_sqlx(err: sqlx::Error, table: &str) -> Self {
        if let sqlx::Error::Database(db) = &err {
            if db.code().as_deref() == Some(UNIQUE_VIOLATION) {
                let detail = db
                    .try_downcast_ref::<sqlx::postgres::PgDatabaseError>()
                    .and_then(|pg| pg.detail())
                    .unwrap_or_else(|| db.message())
                    .to_string();
                return StorageError::DuplicateKey {
                    table: table.to_string(),
                    detail,
                };
            }
        }
        StorageError::Database(err)
    }

    pub fn invalid_identifier(name: &str, reason: impl Into<String>) -> Self {
        StorageError::InvalidIdentifier {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
