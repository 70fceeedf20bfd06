//! Loan models for the ledger core

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MILLIS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Distinguishes origination rows from payment-ledger rows in the loans table
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_action", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanAction {
    Took,
    Paid,
}

/// Loan model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Loan {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub principal_amount: Decimal,
    pub daily_interest_rate: Decimal, // percent per day
    pub remaining_amount: Decimal,
    pub action: LoanAction,
    pub overpayment: Decimal,
    /// Accrual anchor, reset on every payment
    pub last_updated_at: DateTime<Utc>,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// Loan row to be inserted
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub owner_id: Uuid,
    pub principal_amount: Decimal,
    pub daily_interest_rate: Decimal,
    pub remaining_amount: Decimal,
    pub action: LoanAction,
    pub last_updated_at: DateTime<Utc>,
}

impl NewLoan {
    /// Origination row: the whole principal is outstanding
    pub fn took(
        owner_id: Uuid,
        amount: Decimal,
        daily_interest_rate: Decimal,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner_id,
            principal_amount: amount,
            daily_interest_rate,
            remaining_amount: amount,
            action: LoanAction::Took,
            last_updated_at: now,
        }
    }

    /// Payment-ledger row recording `amount` settled against a loan
    pub fn paid(owner_id: Uuid, amount: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            owner_id,
            principal_amount: amount,
            daily_interest_rate: Decimal::ZERO,
            remaining_amount: Decimal::ZERO,
            action: LoanAction::Paid,
            last_updated_at: now,
        }
    }
}

/// Immutable write-off record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanDeletion {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub debtor_id: Uuid,
    pub deleted_by_id: Uuid,
    pub principal_amount: Decimal,
    pub daily_interest_rate: Decimal,
    pub remaining_amount: Decimal,
    pub reason: String,
    pub loan_created_at: DateTime<Utc>,
    pub deleted_at: DateTime<Utc>,
}

/// Write-off snapshot to be inserted
#[derive(Debug, Clone)]
pub struct NewLoanDeletion {
    pub loan_id: Uuid,
    pub debtor_id: Uuid,
    pub deleted_by_id: Uuid,
    pub principal_amount: Decimal,
    pub daily_interest_rate: Decimal,
    pub remaining_amount: Decimal,
    pub reason: String,
    pub loan_created_at: DateTime<Utc>,
}

impl NewLoanDeletion {
    pub fn snapshot(loan: &Loan, deleted_by_id: Uuid, reason: &str) -> Self {
        Self {
            loan_id: loan.id,
            debtor_id: loan.owner_id,
            deleted_by_id,
            principal_amount: loan.principal_amount,
            daily_interest_rate: loan.daily_interest_rate,
            remaining_amount: loan.remaining_amount,
            reason: reason.to_string(),
            loan_created_at: loan.created_at,
        }
    }
}

/// Outcome of a successful payment
#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    /// Loan after the payment was applied
    pub loan: Loan,
    /// Payment-ledger row
    pub entry: Loan,
    pub interest: Decimal,
    pub total_owed: Decimal,
    pub overpayment: Decimal,
}

/// Simple (non-compounding) interest accrued over `elapsed`
///
/// `daily_interest_rate` is a percentage; negative elapsed time accrues nothing.
/// `None` when the result does not fit in a `Decimal`.
pub fn accrued_interest(
    remaining_amount: Decimal,
    daily_interest_rate: Decimal,
    elapsed: Duration,
) -> Option<Decimal> {
    let millis = elapsed.num_milliseconds().max(0);
    let elapsed_days = Decimal::from(millis).checked_div(Decimal::from(MILLIS_PER_DAY))?;
    let rate = daily_interest_rate.checked_div(Decimal::ONE_HUNDRED)?;
    elapsed_days.checked_mul(remaining_amount)?.checked_mul(rate)
}

/// Amounts resulting from applying `payment` to `total_owed`
///
/// Returns `(new_remaining, settled, overpayment)`.
pub fn settle(total_owed: Decimal, payment: Decimal) -> (Decimal, Decimal, Decimal) {
    let new_remaining = (total_owed - payment).max(Decimal::ZERO);
    let settled = payment.min(total_owed);
    let overpayment = (payment - total_owed).max(Decimal::ZERO);
    (new_remaining, settled, overpayment)
}
