//! Loan request models

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::account::Account;
use crate::loan::Loan;

/// Approval state of a loan request
///
/// `Pending` is the only state a request can leave.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_request_status", rename_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum LoanRequestStatus {
    Pending,
    Accepted,
    Declined,
}

impl LoanRequestStatus {
    /// Whether a request in this state may move to `next`
    pub fn can_transition_to(&self, next: LoanRequestStatus) -> bool {
        matches!(
            (self, next),
            (LoanRequestStatus::Pending, LoanRequestStatus::Accepted)
                | (LoanRequestStatus::Pending, LoanRequestStatus::Declined)
        )
    }
}

/// Loan request model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LoanRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    pub amount: Decimal,
    pub daily_interest_rate: Decimal,
    pub status: LoanRequestStatus,
    pub version: i32,
    pub created_at: DateTime<Utc>,
}

/// Loan request to be inserted, always `Pending`
#[derive(Debug, Clone)]
pub struct NewLoanRequest {
    pub user_id: Uuid,
    pub amount: Decimal,
    pub daily_interest_rate: Decimal,
}

/// Everything an accepted request wrote
#[derive(Debug, Clone, Serialize)]
pub struct Acceptance {
    pub request: LoanRequest,
    /// Borrower after the amount was credited
    pub account: Account,
    pub loan: Loan,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_pending_can_transition() {
        use LoanRequestStatus::*;

        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Declined));
        assert!(!Pending.can_transition_to(Pending));
        for terminal in [Accepted, Declined] {
            for next in [Pending, Accepted, Declined] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn test_status_serialization() {
        let json = serde_json::to_string(&LoanRequestStatus::Accepted).unwrap();
        assert_eq!(json, "\"ACCEPTED\"");
    }
}
