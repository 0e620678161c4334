use thiserror::Error;

use crate::Version;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record addressed by a replace or delete does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The stored version did not match the version being replaced.
    #[error("Concurrency conflict for {entity} {id}: expected version {expected}")]
    ConcurrencyConflict {
        entity: &'static str,
        id: String,
        expected: Version,
    },

    /// A unique constraint rejected the write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// A foreign key constraint rejected the write.
    #[error("Foreign key constraint violated: {constraint}")]
    ForeignKeyViolation { constraint: String },

    /// A stored value could not be decoded into its domain type.
    #[error("Corrupt row: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Constraint name of the partial unique index on active customer emails.
pub const ACTIVE_EMAIL_CONSTRAINT: &str = "customers_active_email_key";

impl StoreError {
    /// Returns true if this error is the active-email uniqueness violation.
    pub fn is_duplicate_email(&self) -> bool {
        matches!(self, StoreError::UniqueViolation { constraint } if constraint == ACTIVE_EMAIL_CONSTRAINT)
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
