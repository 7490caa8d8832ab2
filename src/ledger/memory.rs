//! In-memory ledger store for development and tests

use crate::error::AssistantError;
use crate::ledger::LedgerStore;
use crate::models::{Account, LedgerCommit, NewTransaction, Transaction, User};
use crate::Result;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Ledger {
    users: Vec<User>,
    accounts: Vec<Account>,
    /// Append-only, oldest first
    transactions: Vec<Transaction>,
}

/// In-memory ledger. Balance read, compute and write happen under one write lock.
#[derive(Clone, Default)]
pub struct InMemoryLedgerStore {
    inner: Arc<RwLock<Ledger>>,
}

impl InMemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, external_id: &str, name: Option<&str>) -> User {
        let user = User {
            id: Uuid::new_v4(),
            external_id: external_id.to_string(),
            name: name.map(str::to_string),
            created_at: Utc::now(),
        };

        self.inner.write().await.users.push(user.clone());
        user
    }

    pub async fn insert_account(
        &self,
        user_id: Uuid,
        name: &str,
        balance: Decimal,
        is_default: bool,
    ) -> Account {
        let account = Account {
            id: Uuid::new_v4(),
            user_id,
            name: name.to_string(),
            balance,
            is_default,
            created_at: Utc::now(),
        };

        self.inner.write().await.accounts.push(account.clone());
        account
    }

    pub async fn account(&self, account_id: Uuid) -> Option<Account> {
        let ledger = self.inner.read().await;
        ledger.accounts.iter().find(|a| a.id == account_id).cloned()
    }

    pub async fn transactions_for_account(&self, account_id: Uuid) -> Vec<Transaction> {
        let ledger = self.inner.read().await;
        ledger
            .transactions
            .iter()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect()
    }

    pub async fn transaction_count(&self) -> usize {
        self.inner.read().await.transactions.len()
    }
}

#[async_trait::async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn find_user_by_external_id(&self, external_id: &str) -> Result<Option<User>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .users
            .iter()
            .find(|u| u.external_id == external_id)
            .cloned())
    }

    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .accounts
            .iter()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn recent_transactions(&self, user_id: Uuid, limit: usize) -> Result<Vec<Transaction>> {
        let ledger = self.inner.read().await;
        Ok(ledger
            .transactions
            .iter()
            .rev()
            .filter(|t| t.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn record_transaction(&self, record: NewTransaction) -> Result<LedgerCommit> {
        let mut ledger = self.inner.write().await;

        // Validate everything before the first mutation.
        let index = ledger
            .accounts
            .iter()
            .position(|a| a.id == record.account_id && a.user_id == record.user_id)
            .ok_or_else(|| {
                AssistantError::PersistenceError(format!(
                    "Account {} not found for user {}",
                    record.account_id, record.user_id
                ))
            })?;

        let previous_balance = ledger.accounts[index].balance;
        let new_balance = previous_balance
            .checked_add(record.transaction_type.balance_change(record.amount))
            .ok_or_else(|| {
                AssistantError::PersistenceError("Balance overflow".to_string())
            })?;

        let transaction = Transaction {
            id: Uuid::new_v4(),
            user_id: record.user_id,
            account_id: record.account_id,
            amount: record.amount,
            transaction_type: record.transaction_type,
            category: record.category,
            description: record.description,
            date: record.date,
            status: record.status,
        };

        ledger.transactions.push(transaction.clone());
        ledger.accounts[index].balance = new_balance;

        Ok(LedgerCommit {
            transaction,
            previous_balance,
            new_balance,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TransactionStatus, TransactionType};

    fn record(user_id: Uuid, account_id: Uuid, amount: i64, kind: TransactionType) -> NewTransaction {
        NewTransaction {
            user_id,
            account_id,
            amount: Decimal::from(amount),
            transaction_type: kind,
            category: "Food".to_string(),
            description: "lunch".to_string(),
            date: Utc::now(),
            status: TransactionStatus::Completed,
        }
    }

    #[tokio::test]
    async fn test_record_updates_balance_and_appends() {
        let store = InMemoryLedgerStore::new();
        let user = store.insert_user("ext-1", Some("Asha")).await;
        let account = store
            .insert_account(user.id, "Current", Decimal::from(1000), true)
            .await;

        let commit = store
            .record_transaction(record(user.id, account.id, 45, TransactionType::Expense))
            .await
            .unwrap();

        assert_eq!(commit.previous_balance, Decimal::from(1000));
        assert_eq!(commit.new_balance, Decimal::from(955));
        assert_eq!(store.account(account.id).await.unwrap().balance, Decimal::from(955));
        assert_eq!(store.transaction_count().await, 1);
    }

    #[tokio::test]
    async fn test_foreign_account_is_rejected_without_effect() {
        let store = InMemoryLedgerStore::new();
        let owner = store.insert_user("ext-1", None).await;
        let intruder = store.insert_user("ext-2", None).await;
        let account = store
            .insert_account(owner.id, "Current", Decimal::from(1000), true)
            .await;

        let result = store
            .record_transaction(record(intruder.id, account.id, 45, TransactionType::Expense))
            .await;

        assert!(matches!(result, Err(AssistantError::PersistenceError(_))));
        assert_eq!(store.account(account.id).await.unwrap().balance, Decimal::from(1000));
        assert_eq!(store.transaction_count().await, 0);
    }

    #[tokio::test]
    async fn test_recent_transactions_newest_first() {
        let store = InMemoryLedgerStore::new();
        let user = store.insert_user("ext-1", None).await;
        let account = store
            .insert_account(user.id, "Current", Decimal::ZERO, true)
            .await;

        for amount in 1..=7 {
            store
                .record_transaction(record(user.id, account.id, amount, TransactionType::Income))
                .await
                .unwrap();
        }

        let recent = store.recent_transactions(user.id, 5).await.unwrap();
        let amounts: Vec<Decimal> = recent.iter().map(|t| t.amount).collect();
        assert_eq!(
            amounts,
            (3..=7).rev().map(Decimal::from).collect::<Vec<_>>()
        );
    }

    #[tokio::test]
    async fn test_concurrent_records_do_not_lose_updates() {
        let store = InMemoryLedgerStore::new();
        let user = store.insert_user("ext-1", None).await;
        let account = store
            .insert_account(user.id, "Current", Decimal::from(1000), true)
            .await;

        let mut handles = Vec::new();
        for i in 0..50 {
            let store = store.clone();
            let kind = if i % 2 == 0 { TransactionType::Income } else { TransactionType::Expense };
            let amount = i + 1;
            let (user_id, account_id) = (user.id, account.id);
            handles.push(tokio::spawn(async move {
                store
                    .record_transaction(record(user_id, account_id, amount, kind))
                    .await
                    .map(|_| kind.balance_change(Decimal::from(amount)))
            }));
        }

        let mut expected = Decimal::from(1000);
        for handle in handles {
            expected += handle.await.unwrap().unwrap();
        }

        assert_eq!(store.account(account.id).await.unwrap().balance, expected);
        assert_eq!(store.transaction_count().await, 50);
    }
}
