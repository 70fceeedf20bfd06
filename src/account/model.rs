//! Account models

use std::borrow::Cow;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// Account row, the unit the ledger debits and credits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Account {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub balance: Decimal,
    pub activated: bool,
    /// Optimistic-concurrency token, bumped by every successful update
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// Account to be inserted; the store assigns balance and version
///
/// The id is chosen by the caller so rows referencing the account can be
/// written in the same unit of work.
#[derive(Debug, Clone)]
pub struct NewAccount {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub password_hash: String,
}

/// Registration input, checked with the `validator` derive
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterInput {
    #[validate(length(min = 1, max = 500, message = "must be between 1 and 500 characters"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(
        length(min = 8, message = "must be at least 8 characters long"),
        custom = "validate_password_bytes"
    )]
    pub password: String,
}

/// bcrypt only reads the first 72 bytes of a password
pub const MAX_PASSWORD_BYTES: usize = 72;

fn validate_password_bytes(password: &str) -> Result<(), ValidationError> {
    if password.len() > MAX_PASSWORD_BYTES {
        let mut err = ValidationError::new("length");
        err.message = Some(Cow::Borrowed("must not be more than 72 bytes long"));
        return Err(err);
    }
    Ok(())
}

/// Token scopes
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "token_scope", rename_all = "lowercase")]
pub enum TokenScope {
    Activation,
}

/// Stored token; only the hash of the plaintext is persisted
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Token {
    pub hash: String,
    pub account_id: Uuid,
    pub scope: TokenScope,
    pub expiry: DateTime<Utc>,
}

/// Result of a registration: the account plus the one-time token plaintext
#[derive(Debug, Clone)]
pub struct Registration {
    pub account: Account,
    pub activation_token: String,
}
