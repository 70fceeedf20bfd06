//! PostgreSQL record store tests

#[cfg(test)]
mod tests {
    use std::str::FromStr;
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;
    use uuid::Uuid;

    use ledger_core::account::{NewAccount, RegisterInput};
    use ledger_core::clock::SystemClock;
    use ledger_core::config::Config;
    use ledger_core::db;
    use ledger_core::notification::{LogNotifier, NotificationDispatcher};
    use ledger_core::store::{PgStore, RecordStore, StoreError, UnitOfWork};
    use ledger_core::{Bank, LedgerError};

    /// Helper to create a migrated store on the test database
    async fn setup_test_store() -> PgStore {
        let database_url = std::env::var("TEST_DATABASE_URL")
            .unwrap_or_else(|_| "postgresql://localhost/ledger_test".to_string());

        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&database_url)
            .await
            .expect("Failed to connect to test database");
        db::run_migrations(&pool).await.expect("Failed to migrate");

        PgStore::new(pool, Duration::from_secs(3))
    }

    fn unique_email() -> String {
        format!("{}@example.com", Uuid::new_v4().simple())
    }

    fn new_account(email: &str) -> NewAccount {
        NewAccount {
            id: Uuid::new_v4(),
            name: "Test".to_string(),
            email: email.to_string(),
            password_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_version_checked_update() {
        let store = setup_test_store().await;
        let account = store.insert_account(new_account(&unique_email())).await.unwrap();

        let mut first = account.clone();
        first.balance = Decimal::new(10, 0);
        let updated = store.update_account(&first).await.unwrap();
        assert_eq!(updated.version, account.version + 1);

        let mut stale = account.clone();
        stale.balance = Decimal::new(20, 0);
        let err = store.update_account(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::EditConflict));

        let mut missing = account.clone();
        missing.id = Uuid::new_v4();
        let err = store.update_account(&missing).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_duplicate_email_is_case_insensitive() {
        let store = setup_test_store().await;
        let email = unique_email();
        store.insert_account(new_account(&email)).await.unwrap();

        let err = store
            .insert_account(new_account(&email.to_uppercase()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateKey(_)));
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_unit_of_work_rolls_back() {
        let store = setup_test_store().await;
        let account = store.insert_account(new_account(&unique_email())).await.unwrap();

        let mut credited = account.clone();
        credited.balance = Decimal::new(100, 0);
        let stale = account.clone();

        let err = store
            .commit(UnitOfWork::new().update_account(credited).update_account(stale))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::EditConflict));

        let stored = store.get_account(account.id).await.unwrap();
        assert_eq!(stored.balance, Decimal::ZERO);
        assert_eq!(stored.version, account.version);
    }

    #[tokio::test]
    #[ignore] // Requires database setup
    async fn test_bank_over_postgres() {
        let store = Arc::new(setup_test_store().await);
        let (notifications, _failures) = NotificationDispatcher::spawn(Arc::new(LogNotifier), 16);
        let config = Config {
            bcrypt_cost: 4,
            ..Config::default()
        };
        let bank = Bank::new(store.clone(), Arc::new(SystemClock), notifications, &config);

        let mut ids = Vec::new();
        let mut emails = Vec::new();
        for _ in 0..2 {
            let email = unique_email();
            let registration = bank
                .register(RegisterInput {
                    name: "Test".to_string(),
                    email: email.clone(),
                    password: "correct horse".to_string(),
                })
                .await
                .unwrap();
            bank.activate(&registration.activation_token).await.unwrap();
            ids.push(registration.account.id);
            emails.push(email);
        }

        let sender = bank
            .deposit(ids[0], Decimal::new(100, 0), "teller")
            .await
            .unwrap()
            .account;
        let receipt = bank
            .transfer(sender, &emails[1], Decimal::from_str("40.50").unwrap())
            .await
            .unwrap();
        assert_eq!(receipt.sender.balance, Decimal::from_str("59.50").unwrap());

        let request = bank
            .request_loan(ids[1], Decimal::new(100, 0), Decimal::ONE)
            .await
            .unwrap();
        let acceptance = bank.accept_loan_request(request.id, ids[1]).await.unwrap();
        assert_eq!(acceptance.account.balance, Decimal::from_str("140.50").unwrap());

        let payment = bank
            .make_payment(acceptance.loan.id, ids[1], Decimal::new(40, 0))
            .await
            .unwrap();
        assert!(payment.loan.remaining_amount < Decimal::new(100, 0));

        let deletion = bank
            .delete_loan(acceptance.loan.id, ids[1], ids[0], "settled elsewhere")
            .await
            .unwrap();
        assert_eq!(deletion.remaining_amount, payment.loan.remaining_amount);

        let err = bank
            .make_payment(acceptance.loan.id, ids[1], Decimal::ONE)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::NotFound));
    }
}
