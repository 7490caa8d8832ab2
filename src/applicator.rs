//! Transaction applicator
//!
//! Validates a candidate action against the caller's ledger and, when valid,
//! records it atomically. Every failure is converted to the uniform
//! [`ApplyOutcome`] shape at the boundary.

use crate::config::AmountPolicy;
use crate::error::AssistantError;
use crate::ledger::LedgerStore;
use crate::models::{
    is_known_category, ApplyOutcome, CandidateAction, Confirmation, NewTransaction,
    TransactionStatus, TransactionType, DEFAULT_CATEGORY,
};
use crate::Result;
use chrono::Utc;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Receives "cached dashboard data for this user is stale" notifications
pub trait RefreshNotifier: Send + Sync {
    fn invalidate(&self, user_id: Uuid);
}

/// Drops every notification
pub struct NoopRefresh;

impl RefreshNotifier for NoopRefresh {
    fn invalidate(&self, _user_id: Uuid) {}
}

/// Fans refresh notifications out to any number of subscribers
#[derive(Clone)]
pub struct BroadcastRefresh {
    sender: broadcast::Sender<Uuid>,
}

impl BroadcastRefresh {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Uuid> {
        self.sender.subscribe()
    }
}

impl RefreshNotifier for BroadcastRefresh {
    fn invalidate(&self, user_id: Uuid) {
        // No subscribers is fine.
        let _ = self.sender.send(user_id);
    }
}

pub struct TransactionApplicator {
    store: Arc<dyn LedgerStore>,
    refresh: Arc<dyn RefreshNotifier>,
    policy: AmountPolicy,
}

impl TransactionApplicator {
    pub fn new(
        store: Arc<dyn LedgerStore>,
        refresh: Arc<dyn RefreshNotifier>,
        policy: AmountPolicy,
    ) -> Self {
        Self {
            store,
            refresh,
            policy,
        }
    }

    /// Apply a candidate for the caller identified by `identity` (`None` = unauthenticated).
    pub async fn apply(
        &self,
        identity: Option<&str>,
        candidate: &CandidateAction,
    ) -> Result<Confirmation> {
        let external_id = identity
            .map(str::trim)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AssistantError::IdentityNotFound("unauthenticated caller".to_string()))?;

        let user = self
            .store
            .find_user_by_external_id(external_id)
            .await?
            .ok_or_else(|| {
                AssistantError::IdentityNotFound(format!("no stored user for '{}'", external_id))
            })?;

        let account = self
            .store
            .find_default_or_any_account(user.id)
            .await?
            .ok_or(AssistantError::NoAccountAvailable)?;

        // Upstream normalisation is not trusted.
        let transaction_type = TransactionType::normalize(Some(&candidate.transaction_type));
        let amount = validate_amount(candidate.amount, self.policy)?;

        let category = match candidate.category.trim() {
            "" => DEFAULT_CATEGORY.to_string(),
            category => category.to_string(),
        };
        if !is_known_category(&category) {
            debug!(category = %category, "Category outside the known set");
        }
        let description = match candidate.description.trim() {
            "" => category.clone(),
            description => description.to_string(),
        };

        let commit = self
            .store
            .record_transaction(NewTransaction {
                user_id: user.id,
                account_id: account.id,
                amount,
                transaction_type,
                category,
                description,
                date: Utc::now(),
                status: TransactionStatus::Completed,
            })
            .await?;

        info!(
            user_id = %user.id,
            account_id = %account.id,
            transaction_id = %commit.transaction.id,
            transaction_type = %transaction_type,
            amount = %amount,
            new_balance = %commit.new_balance,
            "Voice transaction applied"
        );

        self.refresh.invalidate(user.id);

        Ok(Confirmation {
            transaction_id: commit.transaction.id,
            account_id: account.id,
            transaction_type,
            amount,
            category: commit.transaction.category,
            new_balance: commit.new_balance,
        })
    }

    /// Boundary form of [`apply`](Self::apply): never returns an error.
    /// Raw error detail is logged here and replaced by client-safe text.
    pub async fn apply_outcome(
        &self,
        identity: Option<&str>,
        candidate: &CandidateAction,
    ) -> ApplyOutcome {
        match self.apply(identity, candidate).await {
            Ok(confirmation) => ApplyOutcome::success(confirmation),
            Err(e) => {
                if e.is_ledger_error() {
                    warn!(error = %e, "Voice transaction rejected");
                } else {
                    error!(error = %e, "Voice transaction failed");
                }
                ApplyOutcome::failure(e.client_message())
            }
        }
    }
}

/// Convert a candidate amount into a ledger amount under `policy`.
pub fn validate_amount(raw: Option<f64>, policy: AmountPolicy) -> Result<Decimal> {
    let raw = raw.ok_or_else(|| AssistantError::InvalidAmount("missing or not numeric".to_string()))?;

    if !raw.is_finite() {
        return Err(AssistantError::InvalidAmount(format!("{} is not finite", raw)));
    }

    let amount = Decimal::from_f64(raw)
        .ok_or_else(|| AssistantError::InvalidAmount(format!("{} is out of range", raw)))?
        .normalize();

    match policy {
        AmountPolicy::Permissive => Ok(amount),
        AmountPolicy::Strict { max_amount } => {
            if amount <= Decimal::ZERO {
                Err(AssistantError::InvalidAmount(format!(
                    "{} must be greater than zero",
                    amount
                )))
            } else if amount > max_amount {
                Err(AssistantError::InvalidAmount(format!(
                    "{} exceeds the maximum of {}",
                    amount, max_amount
                )))
            } else {
                Ok(amount)
            }
        }
    }
}
