//! Database-specific error types and conversions.

use scopegate_core::error::ScopegateError;

/// Database-layer error type.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SurrealDB error: {0}")]
    Surreal(#[from] surrealdb::Error),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Invalid stored record: {0}")]
    InvalidRecord(String),

    #[error("Record not found: {entity} with id {id}")]
    NotFound { entity: String, id: String },
}

impl From<DbError> for ScopegateError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ScopegateError::NotFound { entity, id },
            other => ScopegateError::Database(other.to_string()),
        }
    }
}
