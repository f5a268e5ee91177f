//! In-process store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{
    CandidateCriteria, ClaimRow, Normalization, RecheckCandidate, RiskRecord, RiskWriteOutcome,
    ShipmentCandidate, ShipmentRow, StoredCheckpoint,
};
use crate::storage::{ShipmentStore, StoreStats, Tables};

/// Store backed by in-memory tables.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new(shipments: Vec<ShipmentRow>, claims: Vec<ClaimRow>) -> Self {
        Self::with_tables(Tables {
            shipments,
            claims,
            ..Default::default()
        })
    }

    pub fn with_tables(tables: Tables) -> Self {
        Self {
            tables: RwLock::new(tables),
        }
    }

    /// Insert or replace a risk row directly, bypassing the protection check.
    ///
    /// Stands in for writes made by the claims workflow.
    pub async fn put_risk(&self, record: RiskRecord) {
        self.tables
            .write()
            .await
            .risk
            .insert(record.internal_id.clone(), record);
    }
}

#[async_trait]
impl ShipmentStore for MemoryStore {
    async fn new_candidates(&self, criteria: &CandidateCriteria) -> Result<Vec<ShipmentCandidate>> {
        Ok(self.tables.read().await.new_candidates(criteria))
    }

    async fn recheck_candidates(
        &self,
        limit: usize,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<RecheckCandidate>> {
        Ok(self
            .tables
            .read()
            .await
            .recheck_candidates(limit, checked_before))
    }

    async fn get_risk(&self, internal_id: &str) -> Result<Option<RiskRecord>> {
        Ok(self.tables.read().await.risk.get(internal_id).cloned())
    }

    async fn save_evaluation(&self, record: RiskRecord) -> Result<RiskWriteOutcome> {
        Ok(self.tables.write().await.save_evaluation(record))
    }

    async fn record_failed_check(
        &self,
        internal_id: &str,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<bool> {
        Ok(self
            .tables
            .write()
            .await
            .record_failed_check(internal_id, now, error))
    }

    async fn insert_checkpoints(&self, rows: &[StoredCheckpoint]) -> Result<Vec<bool>> {
        Ok(self.tables.write().await.insert_checkpoints(rows))
    }

    async fn unnormalized_checkpoints(&self, limit: usize) -> Result<Vec<StoredCheckpoint>> {
        Ok(self.tables.read().await.unnormalized_checkpoints(limit))
    }

    async fn set_normalization(&self, hash: &str, normalization: Normalization) -> Result<bool> {
        Ok(self.tables.write().await.set_normalization(hash, normalization))
    }

    async fn checkpoints_for_tracking(&self, tracking_id: &str) -> Result<Vec<StoredCheckpoint>> {
        Ok(self.tables.read().await.checkpoints_for_tracking(tracking_id))
    }

    async fn has_loss_claim(&self, internal_id: &str) -> Result<bool> {
        Ok(self.tables.read().await.has_loss_claim(internal_id))
    }

    async fn stats(&self) -> Result<StoreStats> {
        Ok(self.tables.read().await.stats())
    }
}
