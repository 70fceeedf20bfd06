//! In-memory record store
//!
//! Used by tests and embedders that do not need durability. A unit of work is
//! applied to a staged copy of the tables and swapped in only when every write
//! succeeded, which gives the same all-or-nothing behaviour as a database
//! transaction.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::{Committed, RecordStore, StoreError, UnitOfWork, Write};
use crate::account::{Account, Token, TokenScope};
use crate::loan::{Loan, LoanDeletion};
use crate::loan_request::{LoanRequest, LoanRequestStatus};
use crate::transaction::Transaction;
use crate::transfer::Transfer;

#[derive(Debug, Clone, Default)]
struct Tables {
    accounts: HashMap<Uuid, Account>,
    loans: Vec<Loan>,
    loan_deletions: Vec<LoanDeletion>,
    loan_requests: HashMap<Uuid, LoanRequest>,
    transfers: Vec<Transfer>,
    transactions: Vec<Transaction>,
    tokens: Vec<Token>,
}

#[derive(Debug, Clone, Copy)]
struct Fault {
    skip: usize,
    count: usize,
    conflict: bool,
}

/// Record store kept entirely in process memory
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
    account_faults: Mutex<HashMap<Uuid, Fault>>,
    token_faults: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` updates of `account_id` fail with
    /// [`StoreError::Unavailable`]
    pub fn fail_account_updates(&self, account_id: Uuid, count: usize) {
        self.fail_account_updates_after(account_id, 0, count);
    }

    /// Let `skip` updates of `account_id` through, then fail the next `count`
    pub fn fail_account_updates_after(&self, account_id: Uuid, skip: usize, count: usize) {
        self.account_faults.lock().insert(
            account_id,
            Fault {
                skip,
                count,
                conflict: false,
            },
        );
    }

    /// Make the next `count` updates of `account_id` lose their version check
    pub fn conflict_account_updates(&self, account_id: Uuid, count: usize) {
        self.account_faults.lock().insert(
            account_id,
            Fault {
                skip: 0,
                count,
                conflict: true,
            },
        );
    }

    /// Make the next `count` token writes fail with [`StoreError::Unavailable`]
    pub fn fail_token_writes(&self, count: usize) {
        *self.token_faults.lock() = count;
    }

    fn take_token_fault(&self) -> bool {
        let mut remaining = self.token_faults.lock();
        if *remaining == 0 {
            return false;
        }
        *remaining -= 1;
        true
    }

    fn take_fault(&self, account_id: Uuid) -> Option<StoreError> {
        let mut faults = self.account_faults.lock();
        let fault = faults.get_mut(&account_id)?;
        if fault.skip > 0 {
            fault.skip -= 1;
            return None;
        }
        if fault.count == 0 {
            return None;
        }
        fault.count -= 1;
        Some(if fault.conflict {
            StoreError::EditConflict
        } else {
            StoreError::Unavailable(format!("injected fault updating account {}", account_id))
        })
    }

    fn apply(
        &self,
        tables: &mut Tables,
        write: Write,
        committed: &mut Committed,
        now: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        match write {
            Write::InsertAccount(new) => {
                if tables.accounts.contains_key(&new.id) {
                    return Err(StoreError::DuplicateKey("accounts_pkey".to_string()));
                }
                ensure_unique_email(tables, None, &new.email)?;
                let account = Account {
                    id: new.id,
                    name: new.name,
                    email: new.email,
                    password_hash: new.password_hash,
                    balance: Decimal::ZERO,
                    activated: false,
                    version: 1,
                    created_at: now,
                };
                tables.accounts.insert(account.id, account.clone());
                committed.accounts.push(account);
            }
            Write::UpdateAccount(mut account) => {
                if let Some(fault) = self.take_fault(account.id) {
                    return Err(fault);
                }
                let stored = tables.accounts.get(&account.id).ok_or(StoreError::NotFound)?;
                if stored.version != account.version {
                    return Err(StoreError::EditConflict);
                }
                if account.balance < Decimal::ZERO {
                    return Err(StoreError::Database(
                        "new row violates check constraint \"accounts_balance_check\"".to_string(),
                    ));
                }
                ensure_unique_email(tables, Some(account.id), &account.email)?;
                account.version += 1;
                tables.accounts.insert(account.id, account.clone());
                committed.accounts.push(account);
            }
            Write::InsertLoan(new) => {
                let loan = Loan {
                    id: Uuid::new_v4(),
                    owner_id: new.owner_id,
                    principal_amount: new.principal_amount,
                    daily_interest_rate: new.daily_interest_rate,
                    remaining_amount: new.remaining_amount,
                    action: new.action,
                    overpayment: Decimal::ZERO,
                    last_updated_at: new.last_updated_at,
                    version: 1,
                    created_at: now,
                };
                tables.loans.push(loan.clone());
                committed.loans.push(loan);
            }
            Write::UpdateLoan(mut loan) => {
                let stored = tables
                    .loans
                    .iter_mut()
                    .find(|l| l.id == loan.id)
                    .ok_or(StoreError::NotFound)?;
                if stored.version != loan.version {
                    return Err(StoreError::EditConflict);
                }
                loan.version += 1;
                *stored = loan.clone();
                committed.loans.push(loan);
            }
            Write::DeleteLoan { id, version } => {
                let index = tables
                    .loans
                    .iter()
                    .position(|l| l.id == id)
                    .ok_or(StoreError::NotFound)?;
                if tables.loans[index].version != version {
                    return Err(StoreError::EditConflict);
                }
                tables.loans.remove(index);
            }
            Write::InsertLoanDeletion(new) => {
                let deletion = LoanDeletion {
                    id: Uuid::new_v4(),
                    loan_id: new.loan_id,
                    debtor_id: new.debtor_id,
                    deleted_by_id: new.deleted_by_id,
                    principal_amount: new.principal_amount,
                    daily_interest_rate: new.daily_interest_rate,
                    remaining_amount: new.remaining_amount,
                    reason: new.reason,
                    loan_created_at: new.loan_created_at,
                    deleted_at: now,
                };
                tables.loan_deletions.push(deletion.clone());
                committed.loan_deletions.push(deletion);
            }
            Write::InsertLoanRequest(new) => {
                let request = LoanRequest {
                    id: Uuid::new_v4(),
                    user_id: new.user_id,
                    amount: new.amount,
                    daily_interest_rate: new.daily_interest_rate,
                    status: LoanRequestStatus::Pending,
                    version: 1,
                    created_at: now,
                };
                tables.loan_requests.insert(request.id, request.clone());
                committed.loan_requests.push(request);
            }
            Write::UpdateLoanRequest(mut request) => {
                let stored = tables
                    .loan_requests
                    .get(&request.id)
                    .ok_or(StoreError::NotFound)?;
                if stored.version != request.version {
                    return Err(StoreError::EditConflict);
                }
                request.version += 1;
                tables.loan_requests.insert(request.id, request.clone());
                committed.loan_requests.push(request);
            }
            Write::InsertTransfer(new) => {
                let transfer = Transfer {
                    id: Uuid::new_v4(),
                    from_user_id: new.from_user_id,
                    to_user_id: new.to_user_id,
                    amount: new.amount,
                    created_at: now,
                };
                tables.transfers.push(transfer.clone());
                committed.transfers.push(transfer);
            }
            Write::InsertTransaction(new) => {
                let transaction = Transaction {
                    id: Uuid::new_v4(),
                    user_id: new.user_id,
                    action: new.action,
                    amount: new.amount,
                    performed_by: new.performed_by,
                    created_at: now,
                };
                tables.transactions.push(transaction.clone());
                committed.transactions.push(transaction);
            }
            Write::InsertToken(token) => {
                if self.take_token_fault() {
                    return Err(StoreError::Unavailable("injected fault writing token".to_string()));
                }
                if !tables.accounts.contains_key(&token.account_id) {
                    return Err(StoreError::Database(
                        "insert on table \"tokens\" violates foreign key constraint".to_string(),
                    ));
                }
                if tables.tokens.iter().any(|t| t.hash == token.hash) {
                    return Err(StoreError::DuplicateKey("tokens_pkey".to_string()));
                }
                tables.tokens.push(token);
            }
            Write::DeleteTokens { account_id, scope } => {
                tables
                    .tokens
                    .retain(|t| !(t.account_id == account_id && t.scope == scope));
            }
        }
        Ok(())
    }
}

fn ensure_unique_email(
    tables: &Tables,
    except: Option<Uuid>,
    email: &str,
) -> Result<(), StoreError> {
    let taken = tables
        .accounts
        .values()
        .any(|a| Some(a.id) != except && a.email.eq_ignore_ascii_case(email));
    if taken {
        return Err(StoreError::DuplicateKey("accounts_email_key".to_string()));
    }
    Ok(())
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn get_account(&self, id: Uuid) -> Result<Account, StoreError> {
        self.tables
            .read()
            .accounts
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.tables
            .read()
            .accounts
            .values()
            .find(|a| a.email.eq_ignore_ascii_case(email))
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_account_for_token(
        &self,
        token_hash: &str,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        let tables = self.tables.read();
        let token = tables
            .tokens
            .iter()
            .find(|t| t.hash == token_hash && t.scope == scope && t.expiry > now)
            .ok_or(StoreError::NotFound)?;
        tables
            .accounts
            .get(&token.account_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn get_loan(&self, id: Uuid, owner_id: Uuid) -> Result<Loan, StoreError> {
        self.tables
            .read()
            .loans
            .iter()
            .find(|l| l.id == id && l.owner_id == owner_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_loans(&self, owner_id: Uuid) -> Result<Vec<Loan>, StoreError> {
        Ok(self
            .tables
            .read()
            .loans
            .iter()
            .filter(|l| l.owner_id == owner_id)
            .cloned()
            .collect())
    }

    async fn list_loan_deletions(&self, debtor_id: Uuid) -> Result<Vec<LoanDeletion>, StoreError> {
        Ok(self
            .tables
            .read()
            .loan_deletions
            .iter()
            .filter(|d| d.debtor_id == debtor_id)
            .cloned()
            .collect())
    }

    async fn get_loan_request(&self, id: Uuid, user_id: Uuid) -> Result<LoanRequest, StoreError> {
        self.tables
            .read()
            .loan_requests
            .get(&id)
            .filter(|r| r.user_id == user_id)
            .cloned()
            .ok_or(StoreError::NotFound)
    }

    async fn list_transfers(&self, user_id: Uuid) -> Result<Vec<Transfer>, StoreError> {
        Ok(self
            .tables
            .read()
            .transfers
            .iter()
            .filter(|t| t.from_user_id == user_id || t.to_user_id == user_id)
            .cloned()
            .collect())
    }

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        Ok(self
            .tables
            .read()
            .transactions
            .iter()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn commit(&self, work: UnitOfWork) -> Result<Committed, StoreError> {
        let now = Utc::now();
        let mut tables = self.tables.write();
        let mut staged = tables.clone();
        let mut committed = Committed::default();

        for write in work.into_writes() {
            self.apply(&mut staged, write, &mut committed, now)?;
        }

        *tables = staged;
        Ok(committed)
    }
}
