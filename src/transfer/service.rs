//! Transfer service
//!
//! A transfer is two independently committed, version-checked balance
//! updates: debit the sender, then credit the recipient. When the credit
//! fails the sender is re-credited before the original failure is returned.

use std::sync::Arc;

use rust_decimal::Decimal;
use uuid::Uuid;

use crate::account::Account;
use crate::error::{LedgerError, LedgerResult};
use crate::store::{RecordStore, StoreError};
use crate::validation::Validator;

use super::{NewTransfer, TransferReceipt};

#[derive(Clone)]
pub struct TransferService {
    store: Arc<dyn RecordStore>,
}

impl TransferService {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Move `amount` from `sender` to the account registered under `recipient_email`
    ///
    /// `sender` must carry the version the caller last read; a concurrent
    /// change surfaces as [`LedgerError::EditConflict`] before anything moves.
    pub async fn transfer(
        &self,
        sender: Account,
        recipient_email: &str,
        amount: Decimal,
    ) -> LedgerResult<TransferReceipt> {
        let recipient = self.store.get_account_by_email(recipient_email).await?;

        let mut v = Validator::new();
        v.check(!amount.is_zero(), "amount", "must be given")
            .check(amount >= Decimal::ZERO, "amount", "must be positive")
            .check(sender.balance >= amount, "account balance", "insufficient funds")
            .check(recipient.id != sender.id, "recipient", "must be a different account");
        let credited = recipient.balance.checked_add(amount);
        v.check(credited.is_some(), "amount", "is too large");
        v.finish()?;

        let mut debit = sender;
        debit.balance -= amount;
        let sender = self.store.update_account(&debit).await?;

        let mut credit = recipient;
        credit.balance = credited.unwrap_or(credit.balance);
        if let Err(err) = self.store.update_account(&credit).await {
            return Err(self.compensate(sender, credit.id, amount, err).await);
        }

        let transfer = self
            .store
            .insert_transfer(NewTransfer {
                from_user_id: sender.id,
                to_user_id: credit.id,
                amount,
            })
            .await
            .map_err(|e| {
                tracing::error!(
                    from_user_id = %sender.id,
                    to_user_id = %credit.id,
                    %amount,
                    error = %e,
                    "Balances moved but the transfer record was not written"
                );
                LedgerError::from(e)
            })?;

        tracing::info!(
            transfer_id = %transfer.id,
            from_user_id = %sender.id,
            to_user_id = %credit.id,
            %amount,
            "Transfer completed"
        );

        Ok(TransferReceipt { transfer, sender })
    }

    /// Re-credit a debited sender after the recipient credit failed
    async fn compensate(
        &self,
        debited: Account,
        recipient_id: Uuid,
        amount: Decimal,
        credit_error: StoreError,
    ) -> LedgerError {
        let sender_id = debited.id;
        let mut restore = debited;
        restore.balance += amount;

        match self.store.update_account(&restore).await {
            Ok(_) => {
                tracing::warn!(
                    %sender_id,
                    %recipient_id,
                    %amount,
                    error = %credit_error,
                    "Credit failed, sender balance restored"
                );
                credit_error.into()
            }
            Err(cause) => {
                tracing::error!(
                    %sender_id,
                    %recipient_id,
                    %amount,
                    credit_error = %credit_error,
                    compensation_error = %cause,
                    "Compensation failed, sender balance not restored"
                );
                LedgerError::CompensationFailed {
                    sender_id,
                    recipient_id,
                    amount,
                    cause,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::NewAccount;
    use crate::store::MemoryStore;

    async fn funded(store: &MemoryStore, email: &str, balance: i64) -> Account {
        let mut account = store
            .insert_account(NewAccount {
                id: Uuid::new_v4(),
                name: email.to_string(),
                email: email.to_string(),
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap();
        account.balance = Decimal::new(balance, 0);
        store.update_account(&account).await.unwrap()
    }

    #[tokio::test]
    async fn test_transfer_moves_money() {
        let store = Arc::new(MemoryStore::new());
        let a = funded(&store, "a@example.com", 100).await;
        let b = funded(&store, "b@example.com", 0).await;
        let service = TransferService::new(store.clone());

        let receipt = service
            .transfer(a.clone(), "b@example.com", Decimal::new(40, 0))
            .await
            .unwrap();

        assert_eq!(receipt.sender.balance, Decimal::new(60, 0));
        assert_eq!(receipt.transfer.amount, Decimal::new(40, 0));
        assert_eq!(store.get_account(b.id).await.unwrap().balance, Decimal::new(40, 0));
        assert_eq!(store.list_transfers(a.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_transfer_validation() {
        let store = Arc::new(MemoryStore::new());
        let a = funded(&store, "a@example.com", 10).await;
        funded(&store, "b@example.com", 0).await;
        let service = TransferService::new(store.clone());

        let err = service
            .transfer(a.clone(), "b@example.com", Decimal::ZERO)
            .await
            .unwrap_err();
        assert_eq!(err.field_errors().unwrap().get("amount"), ["must be given"]);

        let err = service
            .transfer(a.clone(), "b@example.com", Decimal::new(-5, 0))
            .await
            .unwrap_err();
        assert_eq!(err.field_errors().unwrap().get("amount"), ["must be positive"]);

        let err = service
            .transfer(a.clone(), "a@example.com", Decimal::ONE)
            .await
            .unwrap_err();
        assert!(err.field_errors().unwrap().contains("recipient"));

        let err = service
            .transfer(a.clone(), "nobody@example.com", Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));
    }

    #[tokio::test]
    async fn test_stale_sender_moves_nothing() {
        let store = Arc::new(MemoryStore::new());
        let a = funded(&store, "a@example.com", 100).await;
        let b = funded(&store, "b@example.com", 0).await;
        let service = TransferService::new(store.clone());

        let mut stale = a.clone();
        stale.version -= 1;
        let err = service
            .transfer(stale, "b@example.com", Decimal::new(40, 0))
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::EditConflict));
        assert_eq!(store.get_account(a.id).await.unwrap().balance, Decimal::new(100, 0));
        assert_eq!(store.get_account(b.id).await.unwrap().balance, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_credit_overflow_moves_nothing() {
        let store = Arc::new(MemoryStore::new());
        let a = funded(&store, "a@example.com", 100).await;
        let mut b = funded(&store, "b@example.com", 0).await;
        b.balance = Decimal::MAX;
        let b = store.update_account(&b).await.unwrap();
        let service = TransferService::new(store.clone());

        let err = service
            .transfer(a.clone(), "b@example.com", Decimal::new(40, 0))
            .await
            .unwrap_err();

        assert_eq!(err.field_errors().unwrap().get("amount"), ["is too large"]);
        assert_eq!(store.get_account(a.id).await.unwrap().balance, Decimal::new(100, 0));
        assert_eq!(store.get_account(b.id).await.unwrap().balance, Decimal::MAX);
    }
}
