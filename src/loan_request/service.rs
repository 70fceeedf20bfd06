//! Loan request service
//!
//! A request starts `PENDING` and is either accepted or declined, once.
//! Acceptance flips the status, credits the borrower and originates the loan
//! in a single unit of work.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult};
use crate::loan::{check_terms, NewLoan};
use crate::store::{RecordStore, UnitOfWork};
use crate::validation::Validator;

use super::{Acceptance, LoanRequest, LoanRequestStatus, NewLoanRequest};

#[derive(Clone)]
pub struct LoanRequestService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl LoanRequestService {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// File a pending request for `amount` at `daily_interest_rate` percent per day
    pub async fn request(
        &self,
        requester_id: Uuid,
        amount: Decimal,
        daily_interest_rate: Decimal,
    ) -> LedgerResult<LoanRequest> {
        let mut v = Validator::new();
        check_terms(&mut v, amount, daily_interest_rate);
        v.finish()?;

        self.store.get_account(requester_id).await?;

        let request = self
            .store
            .insert_loan_request(NewLoanRequest {
                user_id: requester_id,
                amount,
                daily_interest_rate,
            })
            .await?;

        tracing::info!(request_id = %request.id, user_id = %requester_id, %amount, "Loan requested");
        Ok(request)
    }

    pub async fn get(&self, request_id: Uuid, user_id: Uuid) -> LedgerResult<LoanRequest> {
        Ok(self.store.get_loan_request(request_id, user_id).await?)
    }

    pub async fn accept(&self, request_id: Uuid, user_id: Uuid) -> LedgerResult<Acceptance> {
        let request = self
            .transition(request_id, user_id, LoanRequestStatus::Accepted)
            .await?;
        let mut account = self.store.get_account(user_id).await?;

        let mut v = Validator::new();
        match account.balance.checked_add(request.amount) {
            Some(balance) => account.balance = balance,
            None => v.add_error("amount", "is too large"),
        }
        v.finish()?;

        let loan = NewLoan::took(
            user_id,
            request.amount,
            request.daily_interest_rate,
            self.clock.now(),
        );
        let committed = self
            .store
            .commit(
                UnitOfWork::new()
                    .update_loan_request(request)
                    .update_account(account)
                    .insert_loan(loan),
            )
            .await?;

        let (Some(request), Some(account), Some(loan)) = (
            committed.loan_requests.into_iter().next(),
            committed.accounts.into_iter().next(),
            committed.loans.into_iter().next(),
        ) else {
            tracing::error!(%request_id, "Acceptance committed without its rows");
            return Err(LedgerError::Internal);
        };

        tracing::info!(
            %request_id,
            %user_id,
            loan_id = %loan.id,
            amount = %request.amount,
            "Loan request accepted"
        );

        Ok(Acceptance {
            request,
            account,
            loan,
        })
    }

    pub async fn decline(&self, request_id: Uuid, user_id: Uuid) -> LedgerResult<LoanRequest> {
        let request = self
            .transition(request_id, user_id, LoanRequestStatus::Declined)
            .await?;

        let request = self.store.update_loan_request(&request).await?;

        tracing::info!(%request_id, %user_id, "Loan request declined");
        Ok(request)
    }

    /// Request owned by `user_id`, moved to `next` but not yet persisted
    ///
    /// A request that may not make the move is reported as missing.
    async fn transition(
        &self,
        request_id: Uuid,
        user_id: Uuid,
        next: LoanRequestStatus,
    ) -> LedgerResult<LoanRequest> {
        let mut request = self.store.get_loan_request(request_id, user_id).await?;
        if !request.status.can_transition_to(next) {
            return Err(LedgerError::NotFound);
        }
        request.status = next;
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, LoanRequestService, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let user = store
            .insert_account(NewAccount {
                id: Uuid::new_v4(),
                name: "Ada".to_string(),
                email: "ada@example.com".to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        let service = LoanRequestService::new(store.clone(), Arc::new(ManualClock::default()));
        (store, service, user.id)
    }

    #[tokio::test]
    async fn test_accept_credits_and_originates() {
        let (store, service, user) = setup().await;
        let request = service
            .request(user, Decimal::new(100, 0), Decimal::new(3, 0))
            .await
            .unwrap();
        assert_eq!(request.status, LoanRequestStatus::Pending);

        let acceptance = service.accept(request.id, user).await.unwrap();
        assert_eq!(acceptance.request.status, LoanRequestStatus::Accepted);
        assert_eq!(acceptance.account.balance, Decimal::new(100, 0));
        assert_eq!(acceptance.loan.remaining_amount, Decimal::new(100, 0));
        assert_eq!(acceptance.loan.daily_interest_rate, Decimal::new(3, 0));
        assert_eq!(store.list_loans(user).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_terminal_requests_cannot_move() {
        let (_, service, user) = setup().await;
        let request = service
            .request(user, Decimal::new(100, 0), Decimal::ONE)
            .await
            .unwrap();

        service.accept(request.id, user).await.unwrap();
        assert!(matches!(
            service.accept(request.id, user).await.unwrap_err(),
            LedgerError::NotFound
        ));
        assert!(matches!(
            service.decline(request.id, user).await.unwrap_err(),
            LedgerError::NotFound
        ));
    }

    #[tokio::test]
    async fn test_decline_has_no_side_effects() {
        let (store, service, user) = setup().await;
        let request = service
            .request(user, Decimal::new(100, 0), Decimal::ONE)
            .await
            .unwrap();

        let declined = service.decline(request.id, user).await.unwrap();
        assert_eq!(declined.status, LoanRequestStatus::Declined);
        assert_eq!(store.get_account(user).await.unwrap().balance, Decimal::ZERO);
        assert!(store.list_loans(user).await.unwrap().is_empty());
        assert!(service.accept(request.id, user).await.is_err());
    }

    #[tokio::test]
    async fn test_other_users_request_is_not_found() {
        let (_, service, user) = setup().await;
        let request = service
            .request(user, Decimal::new(100, 0), Decimal::ONE)
            .await
            .unwrap();

        let err = service.accept(request.id, Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));
    }

    #[tokio::test]
    async fn test_failed_credit_rolls_back_acceptance() {
        let (store, service, user) = setup().await;
        let request = service
            .request(user, Decimal::new(100, 0), Decimal::ONE)
            .await
            .unwrap();
        store.conflict_account_updates(user, 1);

        let err = service.accept(request.id, user).await.unwrap_err();
        assert!(matches!(err, LedgerError::EditConflict));

        let stored = service.get(request.id, user).await.unwrap();
        assert_eq!(stored.status, LoanRequestStatus::Pending);
        assert_eq!(stored.version, request.version);
        assert_eq!(store.get_account(user).await.unwrap().balance, Decimal::ZERO);
        assert!(store.list_loans(user).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_request_validation() {
        let (_, service, user) = setup().await;
        let err = service
            .request(user, Decimal::new(-5, 0), Decimal::ONE)
            .await
            .unwrap_err();
        assert_eq!(err.field_errors().unwrap().get("amount"), ["must be more than 0"]);
    }

    #[tokio::test]
    async fn test_credit_overflow_keeps_request_pending() {
        let (store, service, user) = setup().await;
        let mut account = store.get_account(user).await.unwrap();
        account.balance = Decimal::MAX;
        store.update_account(&account).await.unwrap();

        let request = service
            .request(user, Decimal::new(100, 0), Decimal::ONE)
            .await
            .unwrap();
        let err = service.accept(request.id, user).await.unwrap_err();

        assert_eq!(err.field_errors().unwrap().get("amount"), ["is too large"]);
        let stored = service.get(request.id, user).await.unwrap();
        assert_eq!(stored.status, LoanRequestStatus::Pending);
        assert!(store.list_loans(user).await.unwrap().is_empty());
    }
}
