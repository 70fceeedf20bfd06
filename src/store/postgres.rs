//! PostgreSQL record store
//!
//! Every write runs inside a database transaction; compare-and-swap updates
//! use `WHERE id = $n AND version = $m` and treat "no row" as a lost race.
//! Each call is bounded by the configured deadline.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;

use super::{Committed, RecordStore, StoreError, UnitOfWork, Write};
use crate::account::{Account, TokenScope};
use crate::loan::{Loan, LoanDeletion};
use crate::loan_request::{LoanRequest, LoanRequestStatus};
use crate::transaction::Transaction;
use crate::transfer::Transfer;

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            sqlx::Error::Database(ref db) if db.code().as_deref() == Some("23505") => {
                StoreError::DuplicateKey(db.constraint().unwrap_or("unknown").to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
                StoreError::Unavailable(err.to_string())
            }
            other => StoreError::Database(other.to_string()),
        }
    }
}

/// Record store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
    deadline: Duration,
}

impl PgStore {
    /// Create a store whose calls fail with [`StoreError::Timeout`] after `deadline`
    pub fn new(pool: PgPool, deadline: Duration) -> Self {
        Self { pool, deadline }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>> + Send,
    {
        match tokio::time::timeout(self.deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(StoreError::Timeout(self.deadline)),
        }
    }
}

/// Distinguish a missing row from a stale version after a CAS matched nothing
async fn missing_or_conflict(
    conn: &mut PgConnection,
    table: &'static str,
    id: Uuid,
) -> Result<StoreError, StoreError> {
    let query = format!("SELECT EXISTS(SELECT 1 FROM {} WHERE id = $1)", table);
    let (exists,): (bool,) = sqlx::query_as(&query).bind(id).fetch_one(conn).await?;
    Ok(if exists {
        StoreError::EditConflict
    } else {
        StoreError::NotFound
    })
}

async fn apply(
    conn: &mut PgConnection,
    write: Write,
    committed: &mut Committed,
) -> Result<(), StoreError> {
    match write {
        Write::InsertAccount(new) => {
            let account = sqlx::query_as::<_, Account>(
                r#"
                INSERT INTO accounts (id, name, email, password_hash)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(new.id)
            .bind(&new.name)
            .bind(&new.email)
            .bind(&new.password_hash)
            .fetch_one(&mut *conn)
            .await?;
            committed.accounts.push(account);
        }
        Write::UpdateAccount(account) => {
            let updated = sqlx::query_as::<_, Account>(
                r#"
                UPDATE accounts
                SET name = $1, email = $2, password_hash = $3, balance = $4, activated = $5,
                    version = version + 1
                WHERE id = $6 AND version = $7
                RETURNING *
                "#,
            )
            .bind(&account.name)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(account.balance)
            .bind(account.activated)
            .bind(account.id)
            .bind(account.version)
            .fetch_optional(&mut *conn)
            .await?;
            match updated {
                Some(account) => committed.accounts.push(account),
                None => return Err(missing_or_conflict(conn, "accounts", account.id).await?),
            }
        }
        Write::InsertLoan(new) => {
            let loan = sqlx::query_as::<_, Loan>(
                r#"
                INSERT INTO loans (
                    id, owner_id, principal_amount, daily_interest_rate,
                    remaining_amount, action, last_updated_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.owner_id)
            .bind(new.principal_amount)
            .bind(new.daily_interest_rate)
            .bind(new.remaining_amount)
            .bind(new.action)
            .bind(new.last_updated_at)
            .fetch_one(&mut *conn)
            .await?;
            committed.loans.push(loan);
        }
        Write::UpdateLoan(loan) => {
            let updated = sqlx::query_as::<_, Loan>(
                r#"
                UPDATE loans
                SET remaining_amount = $1, overpayment = $2, last_updated_at = $3,
                    version = version + 1
                WHERE id = $4 AND version = $5
                RETURNING *
                "#,
            )
            .bind(loan.remaining_amount)
            .bind(loan.overpayment)
            .bind(loan.last_updated_at)
            .bind(loan.id)
            .bind(loan.version)
            .fetch_optional(&mut *conn)
            .await?;
            match updated {
                Some(loan) => committed.loans.push(loan),
                None => return Err(missing_or_conflict(conn, "loans", loan.id).await?),
            }
        }
        Write::DeleteLoan { id, version } => {
            let result = sqlx::query("DELETE FROM loans WHERE id = $1 AND version = $2")
                .bind(id)
                .bind(version)
                .execute(&mut *conn)
                .await?;
            if result.rows_affected() == 0 {
                return Err(missing_or_conflict(conn, "loans", id).await?);
            }
        }
        Write::InsertLoanDeletion(new) => {
            let deletion = sqlx::query_as::<_, LoanDeletion>(
                r#"
                INSERT INTO loan_deletions (
                    id, loan_id, debtor_id, deleted_by_id, principal_amount,
                    daily_interest_rate, remaining_amount, reason, loan_created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.loan_id)
            .bind(new.debtor_id)
            .bind(new.deleted_by_id)
            .bind(new.principal_amount)
            .bind(new.daily_interest_rate)
            .bind(new.remaining_amount)
            .bind(&new.reason)
            .bind(new.loan_created_at)
            .fetch_one(&mut *conn)
            .await?;
            committed.loan_deletions.push(deletion);
        }
        Write::InsertLoanRequest(new) => {
            let request = sqlx::query_as::<_, LoanRequest>(
                r#"
                INSERT INTO loan_requests (id, user_id, amount, daily_interest_rate, status)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.amount)
            .bind(new.daily_interest_rate)
            .bind(LoanRequestStatus::Pending)
            .fetch_one(&mut *conn)
            .await?;
            committed.loan_requests.push(request);
        }
        Write::UpdateLoanRequest(request) => {
            let updated = sqlx::query_as::<_, LoanRequest>(
                r#"
                UPDATE loan_requests
                SET status = $1, version = version + 1
                WHERE id = $2 AND version = $3
                RETURNING *
                "#,
            )
            .bind(request.status)
            .bind(request.id)
            .bind(request.version)
            .fetch_optional(&mut *conn)
            .await?;
            match updated {
                Some(request) => committed.loan_requests.push(request),
                None => {
                    return Err(missing_or_conflict(conn, "loan_requests", request.id).await?)
                }
            }
        }
        Write::InsertTransfer(new) => {
            let transfer = sqlx::query_as::<_, Transfer>(
                r#"
                INSERT INTO transfers (id, from_user_id, to_user_id, amount)
                VALUES ($1, $2, $3, $4)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.from_user_id)
            .bind(new.to_user_id)
            .bind(new.amount)
            .fetch_one(&mut *conn)
            .await?;
            committed.transfers.push(transfer);
        }
        Write::InsertTransaction(new) => {
            let transaction = sqlx::query_as::<_, Transaction>(
                r#"
                INSERT INTO transactions (id, user_id, action, amount, performed_by)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(new.user_id)
            .bind(new.action)
            .bind(new.amount)
            .bind(&new.performed_by)
            .fetch_one(&mut *conn)
            .await?;
            committed.transactions.push(transaction);
        }
        Write::InsertToken(token) => {
            sqlx::query(
                "INSERT INTO tokens (hash, account_id, scope, expiry) VALUES ($1, $2, $3, $4)",
            )
            .bind(&token.hash)
            .bind(token.account_id)
            .bind(token.scope)
            .bind(token.expiry)
            .execute(&mut *conn)
            .await?;
        }
        Write::DeleteTokens { account_id, scope } => {
            sqlx::query("DELETE FROM tokens WHERE account_id = $1 AND scope = $2")
                .bind(account_id)
                .bind(scope)
                .execute(&mut *conn)
                .await?;
        }
    }
    Ok(())
}

#[async_trait]
impl RecordStore for PgStore {
    async fn get_account(&self, id: Uuid) -> Result<Account, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    async fn get_account_by_email(&self, email: &str) -> Result<Account, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Account>("SELECT * FROM accounts WHERE LOWER(email) = LOWER($1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    async fn get_account_for_token(
        &self,
        token_hash: &str,
        scope: TokenScope,
        now: DateTime<Utc>,
    ) -> Result<Account, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Account>(
                r#"
                SELECT accounts.*
                FROM accounts
                INNER JOIN tokens ON accounts.id = tokens.account_id
                WHERE tokens.hash = $1 AND tokens.scope = $2 AND tokens.expiry > $3
                "#,
            )
            .bind(token_hash)
            .bind(scope)
            .bind(now)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_loan(&self, id: Uuid, owner_id: Uuid) -> Result<Loan, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 AND owner_id = $2")
                .bind(id)
                .bind(owner_id)
                .fetch_one(&self.pool)
                .await
                .map_err(StoreError::from)
        })
        .await
    }

    async fn list_loans(&self, owner_id: Uuid) -> Result<Vec<Loan>, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Loan>(
                "SELECT * FROM loans WHERE owner_id = $1 ORDER BY created_at, id",
            )
            .bind(owner_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_loan_deletions(&self, debtor_id: Uuid) -> Result<Vec<LoanDeletion>, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, LoanDeletion>(
                "SELECT * FROM loan_deletions WHERE debtor_id = $1 ORDER BY deleted_at, id",
            )
            .bind(debtor_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await
    }

    async fn get_loan_request(&self, id: Uuid, user_id: Uuid) -> Result<LoanRequest, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, LoanRequest>(
                "SELECT * FROM loan_requests WHERE id = $1 AND user_id = $2",
            )
            .bind(id)
            .bind(user_id)
            .fetch_one(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_transfers(&self, user_id: Uuid) -> Result<Vec<Transfer>, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Transfer>(
                r#"
                SELECT * FROM transfers
                WHERE from_user_id = $1 OR to_user_id = $1
                ORDER BY created_at, id
                "#,
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await
    }

    async fn list_transactions(&self, user_id: Uuid) -> Result<Vec<Transaction>, StoreError> {
        self.bounded(async {
            sqlx::query_as::<_, Transaction>(
                "SELECT * FROM transactions WHERE user_id = $1 ORDER BY created_at, id",
            )
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(StoreError::from)
        })
        .await
    }

    async fn commit(&self, work: UnitOfWork) -> Result<Committed, StoreError> {
        self.bounded(async {
            let mut tx = self.pool.begin().await?;
            let mut committed = Committed::default();

            for write in work.into_writes() {
                apply(&mut tx, write, &mut committed).await?;
            }

            tx.commit().await?;
            Ok::<_, StoreError>(committed)
        })
        .await
    }
}
