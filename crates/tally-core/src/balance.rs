//! Keeps stored account balances in step with local transaction events.
//!
//! The propagator runs on the same connection (usually an open libSQL
//! transaction) as the row write it accounts for, so a transaction row and
//! its balance effect commit or roll back together.

use libsql::Connection;
use rust_decimal::Decimal;

use crate::db::{AccountRepository, LibSqlAccountRepository};
use crate::error::{Error, Result};
use crate::models::{BankAccount, Transaction};

/// Applies signed transaction amounts to the owning account's balance
pub struct BalancePropagator<'a> {
    conn: &'a Connection,
}

impl<'a> BalancePropagator<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn on_transaction_created(&self, transaction: &Transaction) -> Result<BankAccount> {
        self.apply_delta(transaction.account_id, transaction.signed_amount())
            .await
    }

    /// Reverse the old delta, then apply the new one.
    pub async fn on_transaction_updated(
        &self,
        old: &Transaction,
        new: &Transaction,
    ) -> Result<BankAccount> {
        if old.account_id == new.account_id {
            return self
                .apply_delta(new.account_id, new.signed_amount() - old.signed_amount())
                .await;
        }

        self.apply_delta(old.account_id, -old.signed_amount())
            .await?;
        self.apply_delta(new.account_id, new.signed_amount()).await
    }

    pub async fn on_transaction_deleted(&self, transaction: &Transaction) -> Result<BankAccount> {
        self.apply_delta(transaction.account_id, -transaction.signed_amount())
            .await
    }

    /// Add `delta` to an account balance.
    pub async fn apply_delta(&self, account_id: i64, delta: Decimal) -> Result<BankAccount> {
        let repo = LibSqlAccountRepository::new(self.conn);
        let mut account = repo
            .get(account_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("account {account_id}")))?;

        account.balance += delta;
        repo.set_balance(account_id, account.balance).await?;
        Ok(account)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::Direction;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    async fn setup() -> Database {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlAccountRepository::new(db.connection());
        for id in [1, 2] {
            repo.upsert(&BankAccount {
                id,
                name: format!("Account {id}"),
                balance: Decimal::ZERO,
                currency: "USD".to_string(),
            })
            .await
            .unwrap();
        }
        db
    }

    fn tx(id: i64, account_id: i64, direction: Direction, amount: Decimal) -> Transaction {
        Transaction {
            id,
            account_id,
            category_id: 1,
            direction,
            amount,
            transaction_date: Utc::now(),
            comment: None,
        }
    }

    async fn balance(db: &Database, id: i64) -> Decimal {
        LibSqlAccountRepository::new(db.connection())
            .get(id)
            .await
            .unwrap()
            .unwrap()
            .balance
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn balance_equals_sum_of_existing_transactions() {
        let db = setup().await;
        let propagator = BalancePropagator::new(db.connection());

        let salary = tx(1, 1, Direction::Income, dec!(1000));
        let rent = tx(2, 1, Direction::Outcome, dec!(400.25));
        let coffee = tx(3, 1, Direction::Outcome, dec!(3.10));
        for t in [&salary, &rent, &coffee] {
            propagator.on_transaction_created(t).await.unwrap();
        }

        let cheaper_rent = tx(2, 1, Direction::Outcome, dec!(350));
        propagator
            .on_transaction_updated(&rent, &cheaper_rent)
            .await
            .unwrap();
        propagator.on_transaction_deleted(&coffee).await.unwrap();

        let expected: Decimal = [&salary, &cheaper_rent]
            .iter()
            .map(|t| t.signed_amount())
            .sum();
        assert_eq!(balance(&db, 1).await, expected);
        assert_eq!(expected, dec!(650));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn direction_flip_reverses_old_delta() {
        let db = setup().await;
        let propagator = BalancePropagator::new(db.connection());
        let refund = tx(5, 1, Direction::Outcome, dec!(20));
        propagator.on_transaction_created(&refund).await.unwrap();
        assert_eq!(balance(&db, 1).await, dec!(-20));

        let corrected = tx(5, 1, Direction::Income, dec!(20));
        propagator
            .on_transaction_updated(&refund, &corrected)
            .await
            .unwrap();
        assert_eq!(balance(&db, 1).await, dec!(20));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn moving_between_accounts_touches_both() {
        let db = setup().await;
        let propagator = BalancePropagator::new(db.connection());
        let original = tx(7, 1, Direction::Income, dec!(50));
        propagator.on_transaction_created(&original).await.unwrap();

        let moved = tx(7, 2, Direction::Income, dec!(50));
        propagator
            .on_transaction_updated(&original, &moved)
            .await
            .unwrap();

        assert_eq!(balance(&db, 1).await, Decimal::ZERO);
        assert_eq!(balance(&db, 2).await, dec!(50));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_account_is_not_found() {
        let db = setup().await;
        let propagator = BalancePropagator::new(db.connection());
        let orphan = tx(9, 42, Direction::Income, dec!(1));
        assert!(matches!(
            propagator.on_transaction_created(&orphan).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn rolled_back_transaction_discards_the_delta() {
        let db = setup().await;
        let tx_handle = db.begin().await.unwrap();
        BalancePropagator::new(&tx_handle)
            .apply_delta(1, dec!(30))
            .await
            .unwrap();
        tx_handle.rollback().await.unwrap();

        assert_eq!(balance(&db, 1).await, Decimal::ZERO);
    }
}
