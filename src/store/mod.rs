//! Record store contract
//!
//! The ledger core persists everything through [`RecordStore`]. Reads are
//! per-entity lookups; every write is expressed as a [`UnitOfWork`] that the
//! store commits all-or-nothing. Mutable rows (accounts, loans, loan requests)
//! are only ever written with a compare-and-swap on their `version`.

mod memory;
mod postgres;

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::account::{Account, NewAccount, Token, TokenScope};
use crate::loan::{Loan, LoanDeletion, NewLoan, NewLoanDeletion};
use crate::loan_request::{LoanRequest, NewLoanRequest};
use crate::transaction::{NewTransaction, Transaction};
use crate::transfer::{NewTransfer, Transfer};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Record store errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Duplicate key violates unique constraint {0}")]
    DuplicateKey(String),

    #[error("Edit conflict: stored version does not match")]
    EditConflict,

    #[error("Store call exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// A single write inside a unit of work
#[derive(Debug, Clone)]
pub enum Write {
    InsertAccount(NewAccount),
    /// Compare-and-swap on `(id, version)`; bumps the version
    UpdateAccount(Account),
    InsertLoan(NewLoan),
    /// Compare-and-swap on `(id, version)`; bumps the version
    UpdateLoan(Loan),
    /// Compare-and-swap delete on `(id, version)`
    DeleteLoan { id: Uuid, version: i32 },
    InsertLoanDeletion(NewLoanDeletion),
    InsertLoanRequest(NewLoanRequest),
    /// Compare-and-swap on `(id, version)`; bumps the version
    UpdateLoanRequest(LoanRequest),
    InsertTransfer(NewTransfer),
    InsertTransaction(NewTransaction),
    InsertToken(Token),
    DeleteTokens { account_id: Uuid, scope: TokenScope },
}

/// Ordered batch of writes committed all-or-nothing
#[derive(Debug, Clone, Default)]
pub struct UnitOfWork {
    writes: Vec<Write>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, write: Write) -> Self {
        self.writes.push(write);
        self
    }

    pub fn insert_account(self, account: NewAccount) -> Self {
        self.push(Write::InsertAccount(account))
    }

    pub fn update_account(self, account: Account) -> Self {
        self.push(Write::UpdateAccount(account))
    }

    pub fn insert_loan(self, loan: NewLoan) -> Self {
        self.push(Write::InsertLoan(loan))
    }

    pub fn update_loan(self, loan: Loan) -> Self {
        self.push(Write::UpdateLoan(loan))
    }

    pub fn delete_loan(self, loan: &Loan) -> Self {
        self.push(Write::DeleteLoan {
            id: loan.id,
            version: loan.version,
        })
    }

    pub fn insert_loan_deletion(self, deletion: NewLoanDeletion) -> Self {
        self.push(Write::InsertLoanDeletion(deletion))
    }

    pub fn insert_loan_request(self, request: NewLoanRequest) -> Self {
        self.push(Write::InsertLoanRequest(request))
    }

    pub fn update_loan_request(self, request: LoanRequest) -> Self {
        self.push(Write::UpdateLoanRequest(request))
    }

    pub fn insert_transfer(self, transfer: NewTransfer) -> Self {
        self.push(Write::InsertTransfer(transfer))
    }

    pub fn insert_transaction(self, transaction: NewTransaction) -> Self {
        self.push(Write::InsertTransaction(transaction))
    }

    pub fn insert_token(self, token: Token) -> Self {
        self.push(Write::InsertToken(token))
    }

    pub fn delete_tokens(self, account_id: Uuid, scope: TokenScope) -> Self {
        self.push(Write::DeleteTokens { account_id, scope })
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn into_writes(self) -> Vec<Write> {
        self.writes
    }
}

/// Rows written by a committed unit of work, in write order per kind
#[derive(Debug, Clone, Default)]
pub struct Committed {
    pub accounts: Vec<Account>,
    pub loans: Vec<Loan>,
    pub loan_deletions: Vec<LoanDeletion>,
    pub loan_requests: Vec<LoanRequest>,
    pub transfers: Vec<Transfer>,
    pub transactions: Vec<Transaction>,
}

fn single<T>(rows: Vec<T>) -> Result<T, StoreError> {
    rows.into_iter()
        .next()
        .ok_or_else(|| StoreError::Database("write returned no row".to_string()))
}

/// Durable keyed record store with optimistic-concurrency updates
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn get_account(&self, id: Uuid) -> Result<Account, StoreError>;

    /// Case-insensitive lookup by email
    async fn get_account_by_email(&self, email: &str) -> Result<Account, StoreError>;

    /// Account owning an unexpired token with the given hash and scope
    async fn get_account_for_token(
        &self,
        token_hash: &str,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError>;

    /// Loan row by id, restricted to its owner
    async fn get_loan(&self, id: Uuid, owner_id: Uuid) -> Result<Loan, StoreError>;

    /// All loan rows of an owner, oldest first
    async fn list_loans(&self, owner_id: Uuid) -> Result<Vec<Loan>, StoreError>;

    async fn list_loan_deletions(&self, debtor_id: Uuid) -> Result<Vec<LoanDeletion>, StoreError>;

    /// Loan request by id, restricted to its owner
    async fn get_loan_request(&self, id: Uuid, user_id: Uuid) -> Result<LoanRequest, StoreError>;

    /// Transfers sent or received by a user, oldest first
    async fn list_transfers(&self, user_id: Uuid) -> Result<Vec<Transfer>, StoreError>;

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError>;

    /// Apply every write or none of them
    async fn commit(&self, work: UnitOfWork) -> Result<Committed, StoreError>;

    async fn insert_account(&self, account: NewAccount) -> Result<Account, StoreError> {
        single(self.commit(UnitOfWork::new().insert_account(account)).await?.accounts)
    }

    /// Version-checked update; the returned account carries the new version
    async fn update_account(&self, account: &Account) -> Result<Account, StoreError> {
        single(
            self.commit(UnitOfWork::new().update_account(account.clone()))
                .await?
                .accounts,
        )
    }

    async fn insert_loan(&self, loan: NewLoan) -> Result<Loan, StoreError> {
        single(self.commit(UnitOfWork::new().insert_loan(loan)).await?.loans)
    }

    async fn insert_loan_request(&self, request: NewLoanRequest) -> Result<LoanRequest, StoreError> {
        single(
            self.commit(UnitOfWork::new().insert_loan_request(request))
                .await?
                .loan_requests,
        )
    }

    async fn update_loan_request(&self, request: &LoanRequest) -> Result<LoanRequest, StoreError> {
        single(
            self.commit(UnitOfWork::new().update_loan_request(request.clone()))
                .await?
                .loan_requests,
        )
    }

    async fn insert_transfer(&self, transfer: NewTransfer) -> Result<Transfer, StoreError> {
        single(self.commit(UnitOfWork::new().insert_transfer(transfer)).await?.transfers)
    }
}
