//! Turn audit trail
//!
//! Every completed turn is recorded with a digest of the raw oracle reply so
//! a disputed transaction can be traced back to what the model said.

use crate::session::TurnKind;
use crate::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

/// Records kept when no capacity is configured
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_id: Uuid,
    /// External identity of the caller, if any
    pub identity: Option<String>,
    pub utterance: Option<String>,
    pub kind: TurnKind,
    /// SHA-256 of the raw oracle reply; `None` when the oracle was never answered
    pub reply_digest: Option<String>,
    pub transaction_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Bounded audit trail; the oldest record is evicted once `capacity` is reached.
pub struct TurnAuditLog {
    records: Arc<RwLock<VecDeque<TurnRecord>>>,
    capacity: usize,
}

impl TurnAuditLog {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_AUDIT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn record(&self, record: TurnRecord) -> Result<Uuid> {
        let turn_id = record.turn_id;
        let mut records = self.records.write().await;

        while records.len() >= self.capacity {
            if let Some(evicted) = records.pop_front() {
                debug!(turn_id = %evicted.turn_id, "Evicting oldest turn record");
            }
        }
        records.push_back(record);

        Ok(turn_id)
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Records for one caller, oldest first
    pub async fn list_for_identity(&self, identity: &str) -> Result<Vec<TurnRecord>> {
        let records = self.records.read().await;

        let mut items: Vec<TurnRecord> = records
            .iter()
            .filter(|record| record.identity.as_deref() == Some(identity))
            .cloned()
            .collect();

        items.sort_by_key(|record| record.created_at);

        Ok(items)
    }

    /// Check that `raw_reply` is the reply recorded for `turn_id`
    pub async fn verify_reply(&self, turn_id: Uuid, raw_reply: &str) -> Result<bool> {
        let records = self.records.read().await;

        Ok(records
            .iter()
            .find(|record| record.turn_id == turn_id)
            .and_then(|record| record.reply_digest.as_deref())
            .map(|digest| digest == compute_reply_digest(raw_reply))
            .unwrap_or(false))
    }
}

impl Default for TurnAuditLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Hex-encoded SHA-256 of an oracle reply
pub fn compute_reply_digest(raw_reply: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_reply.as_bytes());
    hex::encode(hasher.finalize())
}
