//! Error taxonomy for ledger operations
//!
//! Store failures arrive as [`StoreError`] and are mapped into [`LedgerError`],
//! the only error type the business operations return. Validation problems are
//! never raised mid-operation; they are collected and surface as a single
//! [`LedgerError::FailedValidation`].

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;
use crate::validation::FieldErrors;

/// Outcome of a failed business operation
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Validation failed: {0}")]
    FailedValidation(FieldErrors),

    #[error("The requested resource could not be found")]
    NotFound,

    #[error("Duplicate key: {0}")]
    DuplicateKey(String),

    #[error("Edit conflict: the record was modified concurrently, please try again")]
    EditConflict,

    #[error("Invalid or expired token")]
    InvalidToken,

    /// A transfer debited the sender, failed to credit the recipient, and the
    /// re-credit of the sender failed as well. Requires manual reconciliation.
    #[error(
        "Compensation failed: {amount} debited from account {sender_id} was not restored \
         after the credit to account {recipient_id} failed"
    )]
    CompensationFailed {
        sender_id: Uuid,
        recipient_id: Uuid,
        amount: Decimal,
        #[source]
        cause: StoreError,
    },

    /// Unrecoverable fault. The detail is logged, never displayed.
    #[error("The server encountered an error and could not resolve your request")]
    Internal,
}

impl LedgerError {
    /// Stable error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            LedgerError::FailedValidation(_) => "VALIDATION_ERROR",
            LedgerError::NotFound => "NOT_FOUND",
            LedgerError::DuplicateKey(_) => "DUPLICATE_KEY",
            LedgerError::EditConflict => "EDIT_CONFLICT",
            LedgerError::InvalidToken => "INVALID_TOKEN",
            LedgerError::CompensationFailed { .. } => "COMPENSATION_FAILED",
            LedgerError::Internal => "INTERNAL_ERROR",
        }
    }

    /// Whether the caller, rather than the system, is at fault
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            LedgerError::FailedValidation(_)
                | LedgerError::NotFound
                | LedgerError::DuplicateKey(_)
                | LedgerError::EditConflict
                | LedgerError::InvalidToken
        )
    }

    /// Field errors when this is a validation failure
    pub fn field_errors(&self) -> Option<&FieldErrors> {
        match self {
            LedgerError::FailedValidation(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<FieldErrors> for LedgerError {
    fn from(errors: FieldErrors) -> Self {
        LedgerError::FailedValidation(errors)
    }
}

impl From<StoreError> for LedgerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => LedgerError::NotFound,
            StoreError::DuplicateKey(key) => LedgerError::DuplicateKey(key),
            StoreError::EditConflict => LedgerError::EditConflict,
            other => {
                tracing::error!(error = %other, "Record store failure");
                LedgerError::Internal
            }
        }
    }
}

/// Result type alias using LedgerError
pub type LedgerResult<T> = Result<T, LedgerError>;
