//! Loan service
//!
//! Loans are principal-only: originating one or paying it down never touches
//! an account balance. Interest is simple and accrues from `last_updated_at`,
//! which every payment resets.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{RecordStore, UnitOfWork};
use crate::validation::Validator;

use super::{
    accrued_interest, settle, Loan, LoanAction, LoanDeletion, NewLoan, NewLoanDeletion,
    PaymentReceipt,
};

/// Checks shared by loan origination and loan requests
pub(crate) fn check_terms(v: &mut Validator, amount: Decimal, daily_interest_rate: Decimal) {
    v.check(!amount.is_zero(), "amount", "must be given")
        .check(amount > Decimal::ZERO, "amount", "must be more than 0")
        .check(
            daily_interest_rate >= Decimal::ZERO,
            "daily_interest_rate",
            "cannot be less than 0",
        );
}

#[derive(Clone)]
pub struct LoanService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl LoanService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record a new loan of `amount` owed by `owner_id`
    pub async fn originate(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        daily_interest_rate: Decimal,
    ) -> LedgerResult<Loan> {
        let mut v = Validator::new();
        check_terms(&mut v, amount, daily_interest_rate);
        v.finish()?;

        self.store.get_account(owner_id).await?;

        let loan = self
            .store
            .insert_loan(NewLoan::took(
                owner_id,
                amount,
                daily_interest_rate,
                self.clock.now(),
            ))
            .await?;

        tracing::info!(loan_id = %loan.id, %owner_id, %amount, "Loan originated");
        Ok(loan)
    }

    pub async fn get(&self, loan_id: Uuid, owner_id: Uuid) -> LedgerResult<Loan> {
        Ok(self.store.get_loan(loan_id, owner_id).await?)
    }

    /// Origination and payment rows of `owner_id`, oldest first
    pub async fn list(&self, owner_id: Uuid) -> LedgerResult<Vec<Loan>> {
        Ok(self.store.list_loans(owner_id).await?)
    }

    /// Apply `payment` to an outstanding loan owned by `payer_id`
    pub async fn make_payment(
        &self,
        loan_id: Uuid,
        payer_id: Uuid,
        payment: Decimal,
    ) -> LedgerResult<PaymentReceipt> {
        let mut v = Validator::new();
        v.check(payment > Decimal::ZERO, "amount", "must be more than 0");
        v.finish()?;

        let mut loan = self.outstanding(loan_id, payer_id).await?;

        let mut v = Validator::new();
        v.check(!loan.remaining_amount.is_zero(), "loan", "payment is completed");
        v.finish()?;

        let now = self.clock.now();
        let owed = accrued_interest(
            loan.remaining_amount,
            loan.daily_interest_rate,
            now - loan.last_updated_at,
        )
        .and_then(|interest| Some((interest, loan.remaining_amount.checked_add(interest)?)));

        let mut v = Validator::new();
        let Some((interest, total_owed)) = owed else {
            v.add_error("loan", "accrued interest is too large");
            return Err(v.errors().clone().into());
        };

        // Anything not above the interest would leave the debt where it was or grow it
        v.check(payment > interest, "amount", "must exceed the accrued interest");

        let (new_remaining, settled, overpayment) = settle(total_owed, payment);
        match loan.overpayment.checked_add(overpayment) {
            Some(total) => loan.overpayment = total,
            None => v.add_error("amount", "is too large"),
        }
        v.finish()?;

        loan.remaining_amount = new_remaining;
        loan.last_updated_at = now;

        let committed = self
            .store
            .commit(
                UnitOfWork::new()
                    .update_loan(loan)
                    .insert_loan(NewLoan::paid(payer_id, settled, now)),
            )
            .await?;

        let mut rows = committed.loans.into_iter();
        let (Some(loan), Some(entry)) = (rows.next(), rows.next()) else {
            tracing::error!(%loan_id, "Payment committed without its rows");
            return Err(LedgerError::Internal);
        };

        tracing::info!(
            %loan_id,
            %payer_id,
            %payment,
            %interest,
            remaining = %loan.remaining_amount,
            "Loan payment applied"
        );

        Ok(PaymentReceipt {
            loan,
            entry,
            interest,
            total_owed,
            overpayment,
        })
    }

    /// Write off a loan, keeping an immutable record of it
    pub async fn delete_loan(
        &self,
        loan_id: Uuid,
        debtor_id: Uuid,
        deleted_by_id: Uuid,
        reason: &str,
    ) -> LedgerResult<LoanDeletion> {
        let mut v = Validator::new();
        v.check(!reason.trim().is_empty(), "reason", "must be given");
        v.finish()?;

        let loan = self.outstanding(loan_id, debtor_id).await?;

        let committed = self
            .store
            .commit(
                UnitOfWork::new()
                    .insert_loan_deletion(NewLoanDeletion::snapshot(&loan, deleted_by_id, reason))
                    .delete_loan(&loan),
            )
            .await?;

        let deletion = committed.loan_deletions.into_iter().next().ok_or_else(|| {
            tracing::error!(%loan_id, "Deletion committed without its record");
            LedgerError::Internal
        })?;

        tracing::info!(%loan_id, %debtor_id, %deleted_by_id, "Loan written off");
        Ok(deletion)
    }

    /// Origination row owned by `owner_id`; payment rows are not loans
    async fn outstanding(&self, loan_id: Uuid, owner_id: Uuid) -> LedgerResult<Loan> {
        let loan = self.store.get_loan(loan_id, owner_id).await?;
        if loan.action != LoanAction::Took {
            return Err(LedgerError::NotFound);
        }
        Ok(loan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use std::str::FromStr;

    struct Fixture {
        store: Arc<MemoryStore>,
        clock: Arc<ManualClock>,
        service: LoanService,
        owner: Uuid,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::default());
        let owner = store
            .insert_account(NewAccount {
                id: Uuid::new_v4(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
            .id;
        let service = LoanService::new(store.clone(), clock.clone());
        Fixture {
            store,
            clock,
            service,
            owner,
        }
    }

    #[tokio::test]
    async fn test_originate_does_not_touch_balance() {
        let f = fixture().await;
        let loan = f
            .service
            .originate(f.owner, Decimal::new(100, 0), Decimal::new(5, 0))
            .await
            .unwrap();

        assert_eq!(loan.remaining_amount, Decimal::new(100, 0));
        assert_eq!(loan.action, LoanAction::Took);
        assert_eq!(loan.last_updated_at, f.clock.now());
        assert_eq!(f.store.get_account(f.owner).await.unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_originate_validation() {
        let f = fixture().await;
        let err = f
            .service
            .originate(f.owner, Decimal::ZERO, Decimal::new(-1, 0))
            .await
            .unwrap_err();
        let fields = err.field_errors().unwrap();
        assert!(fields.contains("amount"));
        assert!(fields.contains("daily_interest_rate"));

        let err = f
            .service
            .originate(Uuid::new_v4(), Decimal::ONE, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));
    }

    #[tokio::test]
    async fn test_payment_accrues_two_days_of_interest() {
        let f = fixture().await;
        let loan = f
            .service
            .originate(f.owner, Decimal::new(100, 0), Decimal::new(5, 0))
            .await
            .unwrap();
        f.clock.advance(Duration::days(2));

        let receipt = f
            .service
            .make_payment(loan.id, f.owner, Decimal::new(50, 0))
            .await
            .unwrap();

        assert_eq!(receipt.interest, Decimal::new(10, 0));
        assert_eq!(receipt.total_owed, Decimal::new(110, 0));
        assert_eq!(receipt.loan.remaining_amount, Decimal::new(60, 0));
        assert_eq!(receipt.loan.last_updated_at, f.clock.now());
        assert_eq!(receipt.entry.action, LoanAction::Paid);
        assert_eq!(receipt.entry.principal_amount, Decimal::new(50, 0));
        assert_eq!(receipt.loan.version, loan.version + 1);
    }

    #[tokio::test]
    async fn test_overpayment_settles_the_loan() {
        let f = fixture().await;
        let loan = f
            .service
            .originate(f.owner, Decimal::new(100, 0), Decimal::ZERO)
            .await
            .unwrap();

        let receipt = f
            .service
            .make_payment(loan.id, f.owner, Decimal::new(130, 0))
            .await
            .unwrap();
        assert_eq!(receipt.loan.remaining_amount, Decimal::ZERO);
        assert_eq!(receipt.loan.overpayment, Decimal::new(30, 0));
        assert_eq!(receipt.entry.principal_amount, Decimal::new(100, 0));

        let err = f
            .service
            .make_payment(loan.id, f.owner, Decimal::ONE)
            .await
            .unwrap_err();
        assert_eq!(err.field_errors().unwrap().get("loan"), ["payment is completed"]);
    }

    #[tokio::test]
    async fn test_invalid_payments_leave_the_loan_alone() {
        let f = fixture().await;
        let loan = f
            .service
            .originate(f.owner, Decimal::new(100, 0), Decimal::new(5, 0))
            .await
            .unwrap();
        f.clock.advance(Duration::days(2));

        for payment in [Decimal::ZERO, Decimal::new(-10, 0), Decimal::new(10, 0)] {
            let err = f
                .service
                .make_payment(loan.id, f.owner, payment)
                .await
                .unwrap_err();
            assert!(err.field_errors().unwrap().contains("amount"));
        }

        assert_eq!(f.service.get(loan.id, f.owner).await.unwrap(), loan);
        assert_eq!(f.service.list(f.owner).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_payment_on_foreign_or_ledger_row_is_not_found() {
        let f = fixture().await;
        let loan = f
            .service
            .originate(f.owner, Decimal::new(100, 0), Decimal::ZERO)
            .await
            .unwrap();

        let err = f
            .service
            .make_payment(loan.id, Uuid::new_v4(), Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));

        let receipt = f
            .service
            .make_payment(loan.id, f.owner, Decimal::ONE)
            .await
            .unwrap();
        let err = f
            .service
            .make_payment(receipt.entry.id, f.owner, Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));
    }

    #[tokio::test]
    async fn test_delete_loan() {
        let f = fixture().await;
        let admin = Uuid::new_v4();
        let loan = f
            .service
            .originate(f.owner, Decimal::new(100, 0), Decimal::new(2, 0))
            .await
            .unwrap();

        let err = f
            .service
            .delete_loan(loan.id, f.owner, admin, "  ")
            .await
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("reason"));
        assert!(f.store.list_loan_deletions(f.owner).await.unwrap().is_empty());
        assert!(f.service.get(loan.id, f.owner).await.is_ok());

        let deletion = f
            .service
            .delete_loan(loan.id, f.owner, admin, "debt forgiven")
            .await
            .unwrap();
        assert_eq!(deletion.loan_id, loan.id);
        assert_eq!(deletion.deleted_by_id, admin);
        assert_eq!(deletion.remaining_amount, Decimal::new(100, 0));
        assert_eq!(deletion.loan_created_at, loan.created_at);

        let err = f.service.get(loan.id, f.owner).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));
        assert_eq!(f.store.get_account(f.owner).await.unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_interest_overflow_leaves_the_loan_alone() {
        let f = fixture().await;
        let principal = Decimal::from_str("10000000000000000000000000000").unwrap();
        let loan = f
            .service
            .originate(f.owner, principal, Decimal::ONE_HUNDRED)
            .await
            .unwrap();
        f.clock.advance(Duration::days(100));

        let err = f
            .service
            .make_payment(loan.id, f.owner, Decimal::ONE)
            .await
            .unwrap_err();

        assert_eq!(
            err.field_errors().unwrap().get("loan"),
            ["accrued interest is too large"]
        );
        assert_eq!(f.service.get(loan.id, f.owner).await.unwrap(), loan);
        assert_eq!(f.service.list(f.owner).await.unwrap().len(), 1);
    }
}
