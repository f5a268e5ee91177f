//! Local filesystem storage implementation.
//!
//! Each table is a JSON array in the storage directory. The host system and
//! the claims workflow own `shipments.json` and `claims.json`; the engine
//! owns `risk.json` and `checkpoints.json`. Every operation re-reads the
//! files it needs, so edits made by other processes between calls are seen.
//!
//! ## Features
//!
//! - **Atomic writes**: temp file, then rename
//! - **Serialized mutations**: one read-modify-write at a time per store

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::error::{AppError, Result};
use crate::models::{
    CandidateCriteria, ClaimRow, Normalization, RecheckCandidate, RiskRecord, RiskWriteOutcome,
    ShipmentCandidate, ShipmentRow, StoredCheckpoint,
};
use crate::storage::{ShipmentStore, StoreStats, Tables};

const SHIPMENTS: &str = "shipments.json";
const CLAIMS: &str = "claims.json";
const RISK: &str = "risk.json";
const CHECKPOINTS: &str = "checkpoints.json";

/// Local filesystem storage backend.
#[derive(Debug)]
pub struct LocalStorage {
    root_dir: PathBuf,
    write_lock: Mutex<()>,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("tmp");
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn write_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(value)?;
        self.write_bytes(key, &bytes).await
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Read a JSON array; a missing file is an empty table.
    async fn read_table<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>> {
        match self.read_bytes(key).await? {
            Some(bytes) => serde_json::from_slice(&bytes).map_err(|e| AppError::store(key, e)),
            None => Ok(Vec::new()),
        }
    }

    async fn load_risk(&self) -> Result<BTreeMap<String, RiskRecord>> {
        let rows: Vec<RiskRecord> = self.read_table(RISK).await?;
        Ok(rows.into_iter().map(|r| (r.internal_id.clone(), r)).collect())
    }

    async fn load_checkpoints(&self) -> Result<BTreeMap<String, StoredCheckpoint>> {
        let rows: Vec<StoredCheckpoint> = self.read_table(CHECKPOINTS).await?;
        Ok(rows.into_iter().map(|c| (c.hash.clone(), c)).collect())
    }

    /// Tables needed by the selection queries.
    async fn load_selection(&self) -> Result<Tables> {
        Ok(Tables {
            shipments: self.read_table(SHIPMENTS).await?,
            claims: self.read_table(CLAIMS).await?,
            risk: self.load_risk().await?,
            checkpoints: BTreeMap::new(),
        })
    }

    async fn save_risk(&self, risk: &BTreeMap<String, RiskRecord>) -> Result<()> {
        let rows: Vec<&RiskRecord> = risk.values().collect();
        self.write_json(RISK, &rows).await
    }

    async fn save_checkpoints(&self, checkpoints: &BTreeMap<String, StoredCheckpoint>) -> Result<()> {
        let rows: Vec<&StoredCheckpoint> = checkpoints.values().collect();
        self.write_json(CHECKPOINTS, &rows).await
    }

    /// Replace the host-owned shipments table.
    pub async fn write_shipments(&self, rows: &[ShipmentRow]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(SHIPMENTS, rows).await
    }

    /// Replace the claims table.
    pub async fn write_claims(&self, rows: &[ClaimRow]) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.write_json(CLAIMS, rows).await
    }
}

#[async_trait]
impl ShipmentStore for LocalStorage {
    async fn new_candidates(&self, criteria: &CandidateCriteria) -> Result<Vec<ShipmentCandidate>> {
        Ok(self.load_selection().await?.new_candidates(criteria))
    }

    async fn recheck_candidates(
        &self,
        limit: usize,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<RecheckCandidate>> {
        Ok(self
            .load_selection()
            .await?
            .recheck_candidates(limit, checked_before))
    }

    async fn get_risk(&self, internal_id: &str) -> Result<Option<RiskRecord>> {
        Ok(self.load_risk().await?.remove(internal_id))
    }

    async fn save_evaluation(&self, record: RiskRecord) -> Result<RiskWriteOutcome> {
        let _guard = self.write_lock.lock().await;
        let mut tables = Tables {
            risk: self.load_risk().await?,
            ..Default::default()
        };
        let outcome = tables.save_evaluation(record);
        if outcome == RiskWriteOutcome::Written {
            self.save_risk(&tables.risk).await?;
        }
        Ok(outcome)
    }

    async fn record_failed_check(
        &self,
        internal_id: &str,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut tables = Tables {
            risk: self.load_risk().await?,
            ..Default::default()
        };
        let touched = tables.record_failed_check(internal_id, now, error);
        if touched {
            self.save_risk(&tables.risk).await?;
        }
        Ok(touched)
    }

    async fn insert_checkpoints(&self, rows: &[StoredCheckpoint]) -> Result<Vec<bool>> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }
        let _guard = self.write_lock.lock().await;
        let mut tables = Tables {
            checkpoints: self.load_checkpoints().await?,
            ..Default::default()
        };
        let inserted = tables.insert_checkpoints(rows);
        if inserted.iter().any(|&i| i) {
            self.save_checkpoints(&tables.checkpoints).await?;
        }
        Ok(inserted)
    }

    async fn unnormalized_checkpoints(&self, limit: usize) -> Result<Vec<StoredCheckpoint>> {
        let tables = Tables {
            checkpoints: self.load_checkpoints().await?,
            ..Default::default()
        };
        Ok(tables.unnormalized_checkpoints(limit))
    }

    async fn set_normalization(&self, hash: &str, normalization: Normalization) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        let mut tables = Tables {
            checkpoints: self.load_checkpoints().await?,
            ..Default::default()
        };
        let applied = tables.set_normalization(hash, normalization);
        if applied {
            self.save_checkpoints(&tables.checkpoints).await?;
        }
        Ok(applied)
    }

    async fn checkpoints_for_tracking(&self, tracking_id: &str) -> Result<Vec<StoredCheckpoint>> {
        let tables = Tables {
            checkpoints: self.load_checkpoints().await?,
            ..Default::default()
        };
        Ok(tables.checkpoints_for_tracking(tracking_id))
    }

    async fn has_loss_claim(&self, internal_id: &str) -> Result<bool> {
        let tables = Tables {
            claims: self.read_table(CLAIMS).await?,
            ..Default::default()
        };
        Ok(tables.has_loss_claim(internal_id))
    }

    async fn stats(&self) -> Result<StoreStats> {
        let mut tables = self.load_selection().await?;
        tables.checkpoints = self.load_checkpoints().await?;
        Ok(tables.stats())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::models::fixtures::row;
    use crate::models::{
        CheckpointKind, ClaimEligibilityStatus, Classification, Leg, Sentiment, SelectionConfig,
    };
    use crate::utils::time::parse_timestamp;

    fn checkpoint(hash: &str) -> StoredCheckpoint {
        StoredCheckpoint {
            hash: hash.into(),
            tracking_id: "9400".into(),
            carrier: "usps".into(),
            checkpoint_date: parse_timestamp("2025-03-01T10:00:00-05:00").unwrap(),
            description: "arrived at facility".into(),
            location: "memphis, tn".into(),
            raw_status: None,
            leg: Leg::Origin,
            first_seen_at: Utc::now(),
            normalization: None,
        }
    }

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
        assert!(!storage.path("test.tmp").exists());
    }

    #[tokio::test]
    async fn test_missing_tables_are_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let stats = storage.stats().await.unwrap();
        assert_eq!(stats.shipments, 0);
        assert_eq!(stats.checkpoints, 0);
        assert!(storage.get_risk("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_corrupt_table_is_a_store_error() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.write_bytes(SHIPMENTS, b"{not json").await.unwrap();

        let err = storage.stats().await.unwrap_err();
        assert!(matches!(err, AppError::Store { .. }));
    }

    #[tokio::test]
    async fn test_checkpoint_insert_is_idempotent_across_instances() {
        let tmp = TempDir::new().unwrap();
        let first = LocalStorage::new(tmp.path());
        assert_eq!(first.insert_checkpoints(&[checkpoint("a")]).await.unwrap(), vec![true]);

        let second = LocalStorage::new(tmp.path());
        assert_eq!(
            second
                .insert_checkpoints(&[checkpoint("a"), checkpoint("b")])
                .await
                .unwrap(),
            vec![false, true]
        );
        assert_eq!(second.checkpoints_for_tracking("9400").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_normalization_applies_once() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        storage.insert_checkpoints(&[checkpoint("a")]).await.unwrap();

        let normalization = |title: &str| Normalization {
            classification: Classification {
                kind: CheckpointKind::InTransit,
                title: title.into(),
                sentiment: Sentiment::Neutral,
            },
            normalized_at: Utc::now(),
        };
        assert!(storage.set_normalization("a", normalization("first")).await.unwrap());
        assert!(!storage.set_normalization("a", normalization("second")).await.unwrap());

        let stored = storage.checkpoints_for_tracking("9400").await.unwrap();
        let applied = stored[0].normalization.as_ref().unwrap();
        assert_eq!(applied.classification.title, "first");
        assert!(storage.unnormalized_checkpoints(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_external_claim_status_is_respected() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());
        let now = Utc::now();
        storage.write_shipments(&[row("1", 20, now)]).await.unwrap();

        let candidate = row("1", 20, now).to_candidate();
        let mut record = RiskRecord::new(&candidate, now);
        record.status = ClaimEligibilityStatus::Eligible;
        record.has_provider_response = true;
        storage.save_evaluation(record.clone()).await.unwrap();

        // The claims workflow edits risk.json out of band.
        let mut filed = record.clone();
        filed.status = ClaimEligibilityStatus::ClaimFiled;
        storage.write_json(RISK, &[filed]).await.unwrap();

        record.status = ClaimEligibilityStatus::AtRisk;
        assert_eq!(
            storage.save_evaluation(record).await.unwrap(),
            RiskWriteOutcome::Protected(ClaimEligibilityStatus::ClaimFiled)
        );
        let criteria = CandidateCriteria::from_config(&SelectionConfig::default(), now);
        assert!(storage.new_candidates(&criteria).await.unwrap().is_empty());
    }
}
