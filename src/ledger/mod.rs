//! Ledger persistence boundary
//!
//! Users, accounts and transactions live behind [`LedgerStore`]. The one
//! mutating operation, [`LedgerStore::record_transaction`], inserts the
//! transaction and rebalances its account as a single unit of work.

use crate::models::{Account, LedgerCommit, NewTransaction, Transaction, User};
use crate::Result;
use async_trait::async_trait;
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryLedgerStore;
pub use postgres::PgLedgerStore;

/// Trait for ledger persistence
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn find_user_by_external_id(&self, external_id: &str) -> Result<Option<User>>;

    /// All accounts of a user in stable store order
    async fn accounts_for_user(&self, user_id: Uuid) -> Result<Vec<Account>>;

    /// Newest first
    async fn recent_transactions(&self, user_id: Uuid, limit: usize) -> Result<Vec<Transaction>>;

    /// Insert `record` and apply its signed amount to the account balance.
    /// Either both happen or neither does; concurrent calls on one account serialise.
    async fn record_transaction(&self, record: NewTransaction) -> Result<LedgerCommit>;

    async fn find_default_or_any_account(&self, user_id: Uuid) -> Result<Option<Account>> {
        let accounts = self.accounts_for_user(user_id).await?;
        Ok(resolve_ledger_account(&accounts).cloned())
    }
}

/// Default account first, otherwise the first account; `None` when the user has none.
/// Several defaults: the first in order wins.
pub fn resolve_ledger_account(accounts: &[Account]) -> Option<&Account> {
    accounts
        .iter()
        .find(|account| account.is_default)
        .or_else(|| accounts.first())
}
