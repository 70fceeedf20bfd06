//! Account service
//!
//! Registration, activation and the reads every money-moving operation starts
//! from. Balances are never changed here; see the transfer, transaction and
//! loan request services.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::clock::Clock;
use crate::error::{LedgerError, LedgerResult};
use crate::notification::{Notification, NotificationDispatcher, USER_WELCOME_TEMPLATE};
use crate::store::{RecordStore, StoreError, UnitOfWork};
use crate::validation::Validator;

use super::token::{generate_token, hash_token, TOKEN_PLAINTEXT_LEN};
use super::{Account, NewAccount, RegisterInput, Registration, TokenScope};

/// Account service
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
    notifications: NotificationDispatcher,
    bcrypt_cost: u32,
    activation_ttl: Duration,
}

impl AccountService {
    pub fn new(
        store: Arc<dyn RecordStore>,
        clock: Arc<dyn Clock>,
        notifications: NotificationDispatcher,
        bcrypt_cost: u32,
        activation_ttl: Duration,
    ) -> Self {
        Self {
            store,
            clock,
            notifications,
            bcrypt_cost,
            activation_ttl,
        }
    }

    pub async fn get(&self, id: Uuid) -> LedgerResult<Account> {
        Ok(self.store.get_account(id).await?)
    }

    pub async fn get_by_email(&self, email: &str) -> LedgerResult<Account> {
        Ok(self.store.get_account_by_email(email).await?)
    }

    /// Create an inactive account and issue its activation token
    pub async fn register(&self, input: RegisterInput) -> LedgerResult<Registration> {
        let mut v = Validator::new();
        if let Err(report) = input.validate() {
            v.absorb(report);
        }
        v.finish()?;

        let password_hash = self.hash_password(input.password).await?;

        let account_id = Uuid::new_v4();
        let (plaintext, token) = generate_token(
            account_id,
            TokenScope::Activation,
            self.activation_ttl,
            self.clock.now(),
        );

        // Account and token land together or not at all
        let committed = self
            .store
            .commit(
                UnitOfWork::new()
                    .insert_account(NewAccount {
                        id: account_id,
                        name: input.name,
                        email: input.email,
                        password_hash,
                    })
                    .insert_token(token),
            )
            .await?;

        let account = committed.accounts.into_iter().next().ok_or_else(|| {
            tracing::error!(%account_id, "Registration committed without an account row");
            LedgerError::Internal
        })?;

        tracing::info!(account_id = %account.id, "Account registered");

        self.notifications.dispatch(Notification::new(
            account.email.clone(),
            USER_WELCOME_TEMPLATE,
            json!({
                "activation_token": plaintext,
                "user_id": account.id,
            }),
        ));

        Ok(Registration {
            account,
            activation_token: plaintext,
        })
    }

    /// Activate the account owning `token` and revoke its activation tokens
    pub async fn activate(&self, token: &str) -> LedgerResult<Account> {
        let mut v = Validator::new();
        v.check(token.len() == TOKEN_PLAINTEXT_LEN, "token", "must be 26 bytes long");
        v.finish()?;

        let mut account = self
            .store
            .get_account_for_token(&hash_token(token), TokenScope::Activation, self.clock.now())
            .await
            .map_err(|e| match e {
                StoreError::NotFound => LedgerError::InvalidToken,
                other => other.into(),
            })?;

        account.activated = true;
        let committed = self
            .store
            .commit(
                UnitOfWork::new()
                    .update_account(account.clone())
                    .delete_tokens(account.id, TokenScope::Activation),
            )
            .await?;

        let account = committed.accounts.into_iter().next().ok_or_else(|| {
            tracing::error!(account_id = %account.id, "Activation committed without an account row");
            LedgerError::Internal
        })?;

        tracing::info!(account_id = %account.id, "Account activated");
        Ok(account)
    }

    async fn hash_password(&self, password: String) -> LedgerResult<String> {
        let cost = self.bcrypt_cost;
        tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "Password hashing task failed");
                LedgerError::Internal
            })?
            .map_err(|e| {
                tracing::error!(error = %e, "Failed to hash password");
                LedgerError::Internal
            })
    }
}
