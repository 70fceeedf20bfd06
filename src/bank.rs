//! Entry point bundling every ledger operation
//!
//! `Bank` wires the services onto one record store, clock and notification
//! dispatcher. Each method returns a domain value or a [`LedgerError`].

use std::sync::Arc;

use rust_decimal::Decimal;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::account::{Account, AccountService, RegisterInput, Registration};
use crate::clock::{Clock, SystemClock};
use crate::config::Config;
use crate::db::{self, DbError};
use crate::error::LedgerResult;
use crate::loan::{Loan, LoanDeletion, LoanService, PaymentReceipt};
use crate::loan_request::{Acceptance, LoanRequest, LoanRequestService};
use crate::notification::{NotificationDispatcher, NotificationFailure, Notifier};
use crate::store::RecordStore;
use crate::transaction::{TransactionReceipt, TransactionService};
use crate::transfer::{TransferReceipt, TransferService};

#[derive(Clone)]
pub struct Bank {
    accounts: AccountService,
    transfers: TransferService,
    transactions: TransactionService,
    loans: LoanService,
    loan_requests: LoanRequestService,
}

impl Bank {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
        config: &Config,
    ) -> Self {
        Self {
            accounts: AccountService::new(
                store.clone(),
                clock.clone(),
                notifications,
                config.bcrypt_cost,
                config.activation_token_ttl(),
            ),
            transfers: TransferService::new(store.clone()),
            transactions: TransactionService::new(store.clone()),
            loans: LoanService::new(store.clone(), clock.clone()),
            loan_requests: LoanRequestService::new(store, clock),
        }
    }

    /// Bank over PostgreSQL with wall-clock time
    ///
    /// Must be called inside a Tokio runtime; the notification worker is
    /// spawned onto it.
    pub async fn connect(
        config: &Config,
        notifier: Arc<dyn Notifier>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<NotificationFailure>), DbError> {
        let store = db::connect_store(config).await?;
        let (notifications, failures) =
            NotificationDispatcher::spawn(notifier, config.notification_queue_capacity);

        tracing::info!(environment = config.environment.as_str(), "Ledger core ready");

        let bank = Self::new(Arc::new(store), Arc::new(SystemClock), notifications, config);
        Ok((bank, failures))
    }

    pub fn accounts(&self) -> &AccountService {
        &self.accounts
    }

    pub fn loans(&self) -> &LoanService {
        &self.loans
    }

    pub fn loan_requests(&self) -> &LoanRequestService {
        &self.loan_requests
    }

    pub async fn register(&self, input: RegisterInput) -> LedgerResult<Registration> {
        self.accounts.register(input).await
    }

    pub async fn activate(&self, token: &str) -> LedgerResult<Account> {
        self.accounts.activate(token).await
    }

    pub async fn transfer(
        &self,
        sender: Account,
        recipient_email: &str,
        amount: Decimal,
    ) -> LedgerResult<TransferReceipt> {
        self.transfers.transfer(sender, recipient_email, amount).await
    }

    pub async fn originate_loan(
        &self,
        owner_id: Uuid,
        amount: Decimal,
        daily_interest_rate: Decimal,
    ) -> LedgerResult<Loan> {
        self.loans.originate(owner_id, amount, daily_interest_rate).await
    }

    pub async fn request_loan(
        &self,
        requester_id: Uuid,
        amount: Decimal,
        daily_interest_rate: Decimal,
    ) -> LedgerResult<LoanRequest> {
        self.loan_requests
            .request(requester_id, amount, daily_interest_rate)
            .await
    }

    pub async fn accept_loan_request(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> LedgerResult<Acceptance> {
        self.loan_requests.accept(request_id, user_id).await
    }

    pub async fn decline_loan_request(
        &self,
        request_id: Uuid,
        user_id: Uuid,
    ) -> LedgerResult<LoanRequest> {
        self.loan_requests.decline(request_id, user_id).await
    }

    pub async fn make_payment(
        &self,
        loan_id: Uuid,
        payer_id: Uuid,
        payment: Decimal,
    ) -> LedgerResult<PaymentReceipt> {
        self.loans.make_payment(loan_id, payer_id, payment).await
    }

    pub async fn delete_loan(
        &self,
        loan_id: Uuid,
        debtor_id: Uuid,
        deleted_by_id: Uuid,
        reason: &str,
    ) -> LedgerResult<LoanDeletion> {
        self.loans
            .delete_loan(loan_id, debtor_id, deleted_by_id, reason)
            .await
    }

    pub async fn deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        performed_by: &str,
    ) -> LedgerResult<TransactionReceipt> {
        self.transactions.deposit(user_id, amount, performed_by).await
    }

    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: Decimal,
        performed_by: &str,
    ) -> LedgerResult<TransactionReceipt> {
        self.transactions.withdraw(user_id, amount, performed_by).await
    }
}
