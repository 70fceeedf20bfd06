//! Transfer models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Account;

/// Completed money movement between two accounts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Transfer {
    pub id: Uuid,
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Transfer record to be inserted
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub from_user_id: Uuid,
    pub to_user_id: Uuid,
    pub amount: Decimal,
}

/// Outcome of a transfer: the record and the sender as persisted after the debit
#[derive(Debug, Clone, Serialize)]
pub struct TransferReceipt {
    pub transfer: Transfer,
    pub sender: Account,
}
