//! Financial context snapshot handed to the oracle
//!
//! Advisory only: nothing in the application path reads it back.

use crate::ledger::LedgerStore;
use crate::models::{Account, FinancialContext, Transaction};
use crate::Result;
use rust_decimal::Decimal;

/// Number of recent transactions included in a snapshot
pub const RECENT_TRANSACTION_COUNT: usize = 5;

/// Total balance plus the most recent transactions as "description: amount" lines.
pub fn summarize(accounts: &[Account], recent: &[Transaction]) -> FinancialContext {
    let balance = accounts
        .iter()
        .fold(Decimal::ZERO, |total, account| total + account.balance);

    FinancialContext {
        balance,
        recent_transactions: recent
            .iter()
            .take(RECENT_TRANSACTION_COUNT)
            .map(|t| format!("{}: {}", t.description, t.amount.normalize()))
            .collect(),
    }
}

pub fn empty() -> FinancialContext {
    summarize(&[], &[])
}

/// Build a snapshot for the caller; unknown or missing identities get an empty one.
pub async fn build_context(
    store: &dyn LedgerStore,
    identity: Option<&str>,
) -> Result<FinancialContext> {
    let Some(external_id) = identity else {
        return Ok(empty());
    };

    let Some(user) = store.find_user_by_external_id(external_id).await? else {
        return Ok(empty());
    };

    let accounts = store.accounts_for_user(user.id).await?;
    let recent = store
        .recent_transactions(user.id, RECENT_TRANSACTION_COUNT)
        .await?;

    Ok(summarize(&accounts, &recent))
}
