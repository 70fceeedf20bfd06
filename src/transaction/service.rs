//! Transaction service
//!
//! The audit entry and the balance change commit together.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::store::{RecordStore, UnitOfWork};
use crate::validation::Validator;

use super::{NewTransaction, TransactionAction, TransactionReceipt};

#[derive(Clone)]
pub struct TransactionService {
    store: Arc<dyn RecordStore>,
}

impl TransactionService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    pub async fn deposit(
        &self,
        user_id: Uuid,
        amount: Decimal,
        performed_by: &str,
    ) -> LedgerResult<TransactionReceipt> {
        self.record(user_id, TransactionAction::Deposit, amount, performed_by)
            .await
    }

    pub async fn withdraw(
        &self,
        user_id: Uuid,
        amount: Decimal,
        performed_by: &str,
    ) -> LedgerResult<TransactionReceipt> {
        self.record(user_id, TransactionAction::Withdraw, amount, performed_by)
            .await
    }

    async fn record(
        &self,
        user_id: Uuid,
        action: TransactionAction,
        amount: Decimal,
        performed_by: &str,
    ) -> LedgerResult<TransactionReceipt> {
        let mut v = Validator::new();
        v.check(!amount.is_zero(), "amount", "must be given")
            .check(amount > Decimal::ZERO, "amount", "must be more than 0")
            .check(!performed_by.trim().is_empty(), "performed_by", "must be given");
        v.finish()?;

        let mut account = self.store.get_account(user_id).await?;

        let mut v = Validator::new();
        let balance = match action {
            TransactionAction::Deposit => account.balance.checked_add(amount),
            TransactionAction::Withdraw => {
                v.check(account.balance >= amount, "account balance", "insufficient funds");
                account.balance.checked_sub(amount)
            }
        };
        match balance {
            Some(balance) => account.balance = balance,
            None => v.add_error("amount", "is too large"),
        }
        v.finish()?;

        let committed = self
            .store
            .commit(
                UnitOfWork::new()
                    .insert_transaction(NewTransaction {
                        user_id,
                        action,
                        amount,
                        performed_by: performed_by.to_string(),
                    })
                    .update_account(account),
            )
            .await?;

        let (Some(transaction), Some(account)) = (
            committed.transactions.into_iter().next(),
            committed.accounts.into_iter().next(),
        ) else {
            tracing::error!(%user_id, "Transaction committed without its rows");
            return Err(LedgerError::Internal);
        };

        tracing::info!(
            transaction_id = %transaction.id,
            %user_id,
            action = ?action,
            %amount,
            performed_by = %transaction.performed_by,
            "Transaction recorded"
        );

        Ok(TransactionReceipt {
            transaction,
            account,
        })
    }
}
