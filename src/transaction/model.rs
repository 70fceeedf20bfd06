//! Deposit and withdrawal audit models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Account;

/// Transaction kinds
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "transaction_action", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum TransactionAction {
    Deposit,
    Withdraw,
}

/// Immutable deposit/withdraw audit entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transaction {
    pub id: Uuid,
    pub user_id: Uuid,
    pub action: TransactionAction,
    pub amount: Decimal,
    /// Actor identity; differs from the account owner for staff-initiated operations
    pub performed_by: String,
    pub created_at: DateTime<Utc>,
}

/// Transaction entry to be inserted
#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub user_id: Uuid,
    pub action: TransactionAction,
    pub amount: Decimal,
    pub performed_by: String,
}

/// Recorded entry plus the account it was applied to
#[derive(Debug, Clone, Serialize)]
pub struct TransactionReceipt {
    pub transaction: Transaction,
    pub account: Account,
}
