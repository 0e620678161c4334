//! Domain error types.

use store::{CustomerId, ProductId, StoreError};
use thiserror::Error;

/// Flat classification of domain failures, used by outer layers to pick a
/// response without matching on every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    ValidationFailed,
    InvalidReference,
    InsufficientStock,
    DuplicateEmail,
    InvalidState,
    ConcurrencyConflict,
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "NotFound",
            ErrorKind::ValidationFailed => "ValidationFailed",
            ErrorKind::InvalidReference => "InvalidReference",
            ErrorKind::InsufficientStock => "InsufficientStock",
            ErrorKind::DuplicateEmail => "DuplicateEmail",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::ConcurrencyConflict => "ConcurrencyConflict",
            ErrorKind::Internal => "Internal",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors that can occur during domain operations.
#[derive(Debug, Error)]
pub enum DomainError {
    /// The addressed entity does not exist or is not visible.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// Input failed field validation.
    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The referenced customer is missing or deactivated.
    #[error("Customer {0} does not exist or is not active")]
    InvalidCustomer(CustomerId),

    /// Some referenced products are missing or deactivated.
    #[error("Products do not exist or are not active: {}", join_ids(.missing))]
    InvalidProduct { missing: Vec<ProductId> },

    #[error(
        "Insufficient stock for {product_name} ({product_id}): available {available}, requested {requested}"
    )]
    InsufficientStock {
        product_id: ProductId,
        product_name: String,
        available: i32,
        requested: i32,
    },

    /// Another active customer already uses this email.
    #[error("An active customer already uses email {email}")]
    DuplicateEmail { email: String },

    /// The entity is in a state that does not allow the operation.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The entity was modified since it was read.
    #[error("Concurrency conflict for {entity} {id}")]
    ConcurrencyConflict { entity: &'static str, id: String },

    /// An unexpected store failure.
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl DomainError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Returns the flat kind of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            DomainError::NotFound { .. } => ErrorKind::NotFound,
            DomainError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            DomainError::InvalidCustomer(_) | DomainError::InvalidProduct { .. } => {
                ErrorKind::InvalidReference
            }
            DomainError::InsufficientStock { .. } => ErrorKind::InsufficientStock,
            DomainError::DuplicateEmail { .. } => ErrorKind::DuplicateEmail,
            DomainError::InvalidState(_) => ErrorKind::InvalidState,
            DomainError::ConcurrencyConflict { .. } => ErrorKind::ConcurrencyConflict,
            DomainError::Store(_) => ErrorKind::Internal,
        }
    }
}

impl From<StoreError> for DomainError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { entity, id } => DomainError::NotFound { entity, id },
            StoreError::ConcurrencyConflict { entity, id, .. } => {
                DomainError::ConcurrencyConflict { entity, id }
            }
            other => DomainError::Store(other),
        }
    }
}

fn join_ids(ids: &[ProductId]) -> String {
    ids.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
