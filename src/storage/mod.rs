//! Storage abstractions for shipments, risk rows, and checkpoint history.
//!
//! The relational store is an external collaborator; the engine only needs
//! the queries and conditional writes of [`ShipmentStore`]. Two backends are
//! provided:
//!
//! - [`MemoryStore`]: in-process tables, for tests and ad hoc checks
//! - [`LocalStorage`]: JSON files in a directory
//!
//! ## Directory Structure
//!
//! ```text
//! storage/
//! ├── config.toml           # Engine configuration
//! ├── shipments.json        # Supplied by the host system
//! ├── claims.json           # Supplied by the claims workflow
//! ├── risk.json             # One row per tracked shipment
//! └── checkpoints.json      # Permanent, deduplicated scan history
//! ```

pub mod local;
pub mod memory;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::models::{
    CandidateCriteria, ClaimEligibilityStatus, ClaimRow, Normalization, RecheckCandidate,
    RiskRecord, RiskWriteOutcome, ShipmentCandidate, ShipmentRow, StoredCheckpoint,
};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStore;

/// Row counts reported by `info`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub shipments: usize,
    pub claims: usize,
    pub tracked: usize,
    pub by_status: BTreeMap<String, usize>,
    pub checkpoints: usize,
    pub unnormalized: usize,
}

/// Queries and writes the engine issues against the store.
#[async_trait]
pub trait ShipmentStore: Send + Sync {
    /// Shipments old enough to watch that are not tracked yet.
    async fn new_candidates(&self, criteria: &CandidateCriteria) -> Result<Vec<ShipmentCandidate>>;

    /// At-risk rows last checked before `checked_before`, least recently
    /// checked first.
    async fn recheck_candidates(
        &self,
        limit: usize,
        checked_before: DateTime<Utc>,
    ) -> Result<Vec<RecheckCandidate>>;

    async fn get_risk(&self, internal_id: &str) -> Result<Option<RiskRecord>>;

    /// Upsert a risk row unless the claims workflow owns its status.
    async fn save_evaluation(&self, record: RiskRecord) -> Result<RiskWriteOutcome>;

    /// Advance recheck bookkeeping without touching status.
    ///
    /// Returns `false` when no row exists.
    async fn record_failed_check(
        &self,
        internal_id: &str,
        now: DateTime<Utc>,
        error: &str,
    ) -> Result<bool>;

    /// Insert-or-ignore keyed on the content hash; one flag per input row.
    async fn insert_checkpoints(&self, rows: &[StoredCheckpoint]) -> Result<Vec<bool>>;

    /// Oldest-first checkpoints that still lack a classification.
    async fn unnormalized_checkpoints(&self, limit: usize) -> Result<Vec<StoredCheckpoint>>;

    /// Set the classification once; returns `false` if it was already set.
    async fn set_normalization(&self, hash: &str, normalization: Normalization) -> Result<bool>;

    /// Stored history of one tracking number, in scan order.
    async fn checkpoints_for_tracking(&self, tracking_id: &str) -> Result<Vec<StoredCheckpoint>>;

    /// Whether an active loss claim exists for the shipment right now.
    async fn has_loss_claim(&self, internal_id: &str) -> Result<bool>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Table contents shared by both backends.
#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub shipments: Vec<ShipmentRow>,
    pub claims: Vec<ClaimRow>,
    /// Keyed by shipment internal id
    pub risk: BTreeMap<String, RiskRecord>,
    /// Keyed by content hash
    pub checkpoints: BTreeMap<String, StoredCheckpoint>,
}

impl Tables {
    fn loss_claimed(&self) -> HashSet<&str> {
        self.claims
            .iter()
            .filter(|c| c.excludes_shipment())
            .map(|c| c.shipment_internal_id.as_str())
            .collect()
    }

    pub fn new_candidates(&self, criteria: &CandidateCriteria) -> Vec<ShipmentCandidate> {
        let excluded = self.loss_claimed();
        let mut rows: Vec<&ShipmentRow> = self
            .shipments
            .iter()
            .filter(|s| criteria.admits(s))
            .filter(|s| !self.risk.contains_key(&s.internal_id))
            .filter(|s| !excluded.contains(s.internal_id.as_str()))
            .collect();
        rows.sort_by_key(|s| s.label_date);
        rows.into_iter()
            .take(criteria.limit)
            .map(ShipmentRow::to_candidate)
            .collect()
    }

    pub fn recheck_candidates(
        &self,
        limit: usize,
        checked_before: DateTime<Utc>,
    ) -> Vec<RecheckCandidate> {
        let excluded = self.loss_claimed();
        let shipments: BTreeMap<&str, &ShipmentRow> = self
            .shipments
            .iter()
            .map(|s| (s.internal_id.as_str(), s))
            .collect();

        let mut due: Vec<&RiskRecord> = self
            .risk
            .values()
            .filter(|r| r.status == ClaimEligibilityStatus::AtRisk)
            .filter(|r| r.last_checked_at < checked_before)
            .filter(|r| !excluded.contains(r.internal_id.as_str()))
            .collect();
        due.sort_by_key(|r| (r.check_count > 0, r.last_checked_at));

        due.into_iter()
            .filter_map(|risk| {
                let Some(row) = shipments.get(risk.internal_id.as_str()) else {
                    log::warn!("Risk row {} has no shipment; skipping", risk.internal_id);
                    return None;
                };
                Some(RecheckCandidate {
                    candidate: row.to_candidate(),
                    risk: risk.clone(),
                })
            })
            .take(limit)
            .collect()
    }

    pub fn save_evaluation(&mut self, mut record: RiskRecord) -> RiskWriteOutcome {
        if let Some(existing) = self.risk.get(&record.internal_id) {
            if existing.status.is_claim_workflow() {
                return RiskWriteOutcome::Protected(existing.status);
            }
            record.is_international = existing.is_international;
            record.first_checked_at = existing.first_checked_at;
            record.has_provider_response |= existing.has_provider_response;
        }
        if record.status.requires_provider_evidence() && !record.has_provider_response {
            log::warn!(
                "{} cannot become {} without a provider response; keeping it at risk",
                record.internal_id,
                record.status
            );
            record.status = ClaimEligibilityStatus::AtRisk;
        }
        self.risk.insert(record.internal_id.clone(), record);
        RiskWriteOutcome::Written
    }

    pub fn record_failed_check(&mut self, internal_id: &str, now: DateTime<Utc>, error: &str) -> bool {
        match self.risk.get_mut(internal_id) {
            Some(row) => {
                row.mark_checked(now, Some(error.to_string()));
                true
            }
            None => false,
        }
    }

    pub fn insert_checkpoints(&mut self, rows: &[StoredCheckpoint]) -> Vec<bool> {
        rows.iter()
            .map(|row| {
                if self.checkpoints.contains_key(&row.hash) {
                    false
                } else {
                    self.checkpoints.insert(row.hash.clone(), row.clone());
                    true
                }
            })
            .collect()
    }

    pub fn unnormalized_checkpoints(&self, limit: usize) -> Vec<StoredCheckpoint> {
        let mut rows: Vec<&StoredCheckpoint> = self
            .checkpoints
            .values()
            .filter(|c| !c.is_normalized())
            .collect();
        rows.sort_by_key(|c| c.first_seen_at);
        rows.into_iter().take(limit).cloned().collect()
    }

    pub fn set_normalization(&mut self, hash: &str, normalization: Normalization) -> bool {
        match self.checkpoints.get_mut(hash) {
            Some(row) if row.normalization.is_none() => {
                row.normalization = Some(normalization);
                true
            }
            _ => false,
        }
    }

    pub fn checkpoints_for_tracking(&self, tracking_id: &str) -> Vec<StoredCheckpoint> {
        let mut rows: Vec<StoredCheckpoint> = self
            .checkpoints
            .values()
            .filter(|c| c.tracking_id == tracking_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.checkpoint_date);
        rows
    }

    pub fn has_loss_claim(&self, internal_id: &str) -> bool {
        self.claims
            .iter()
            .any(|c| c.shipment_internal_id == internal_id && c.excludes_shipment())
    }

    pub fn stats(&self) -> StoreStats {
        let mut by_status = BTreeMap::new();
        for row in self.risk.values() {
            *by_status.entry(row.status.to_string()).or_insert(0) += 1;
        }
        StoreStats {
            shipments: self.shipments.len(),
            claims: self.claims.len(),
            tracked: self.risk.len(),
            by_status,
            checkpoints: self.checkpoints.len(),
            unnormalized: self.checkpoints.values().filter(|c| !c.is_normalized()).count(),
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::fixtures::row;
    use crate::models::{ClaimState, ClaimType, SelectionConfig};

    fn tables(now: DateTime<Utc>) -> Tables {
        Tables {
            shipments: vec![row("1", 20, now), row("2", 30, now), row("3", 5, now)],
            ..Default::default()
        }
    }

    #[test]
    fn test_new_candidates_filters_and_orders() {
        let now = Utc::now();
        let mut t = tables(now);
        t.shipments[0].cancelled = true;
        let mut delivered = row("4", 40, now);
        delivered.delivered_at = Some(now);
        t.shipments.push(delivered);

        let criteria = CandidateCriteria::from_config(&SelectionConfig::default(), now);
        let ids: Vec<_> = t
            .new_candidates(&criteria)
            .into_iter()
            .map(|c| c.internal_id)
            .collect();
        assert_eq!(ids, vec!["2"]);
    }

    #[test]
    fn test_loss_claims_and_tracked_rows_are_excluded() {
        let now = Utc::now();
        let mut t = tables(now);
        t.claims.push(ClaimRow {
            shipment_internal_id: "1".into(),
            claim_type: ClaimType::Loss,
            status: ClaimState::Submitted,
        });
        let tracked = RiskRecord::new(&t.shipments[1].to_candidate(), now);
        t.save_evaluation(tracked);

        let criteria = CandidateCriteria::from_config(&SelectionConfig::default(), now);
        assert!(t.new_candidates(&criteria).is_empty());
        assert!(t.has_loss_claim("1"));
        assert!(!t.has_loss_claim("2"));
    }

    #[test]
    fn test_withdrawn_or_damage_claims_do_not_exclude() {
        let now = Utc::now();
        let mut t = tables(now);
        t.claims.push(ClaimRow {
            shipment_internal_id: "1".into(),
            claim_type: ClaimType::Loss,
            status: ClaimState::Withdrawn,
        });
        t.claims.push(ClaimRow {
            shipment_internal_id: "2".into(),
            claim_type: ClaimType::Damage,
            status: ClaimState::Approved,
        });
        let criteria = CandidateCriteria::from_config(&SelectionConfig::default(), now);
        assert_eq!(t.new_candidates(&criteria).len(), 2);
    }

    #[test]
    fn test_recheck_order_never_checked_first() {
        let now = Utc::now();
        let mut t = tables(now);
        for (i, id) in ["1", "2", "3"].iter().enumerate() {
            let mut r = RiskRecord::new(&t.shipments[i].to_candidate(), now);
            r.status = ClaimEligibilityStatus::AtRisk;
            r.last_checked_at = now - Duration::hours(i as i64);
            r.check_count = if *id == "1" { 0 } else { 3 };
            t.risk.insert(r.internal_id.clone(), r);
        }
        if let Some(r) = t.risk.get_mut("2") {
            r.status = ClaimEligibilityStatus::Eligible;
        }

        let ids: Vec<_> = t
            .recheck_candidates(10, now + Duration::seconds(1))
            .into_iter()
            .map(|c| c.candidate.internal_id)
            .collect();
        assert_eq!(ids, vec!["1", "3"]);
    }

    #[test]
    fn test_recheck_skips_rows_checked_at_or_after_cutoff() {
        let now = Utc::now();
        let mut t = tables(now);
        for (i, shipment) in t.shipments.clone().iter().enumerate() {
            let mut r = RiskRecord::new(&shipment.to_candidate(), now);
            r.status = ClaimEligibilityStatus::AtRisk;
            r.last_checked_at = now - Duration::hours(i as i64);
            r.check_count = 1;
            t.risk.insert(r.internal_id.clone(), r);
        }

        let ids: Vec<_> = t
            .recheck_candidates(10, now)
            .into_iter()
            .map(|c| c.candidate.internal_id)
            .collect();
        assert_eq!(ids, vec!["3", "2"]);
    }

    #[test]
    fn test_eligible_without_provider_response_stays_at_risk() {
        let now = Utc::now();
        let mut t = tables(now);
        let mut record = RiskRecord::new(&t.shipments[0].to_candidate(), now);
        record.status = ClaimEligibilityStatus::Eligible;

        assert_eq!(t.save_evaluation(record), RiskWriteOutcome::Written);
        assert_eq!(t.risk["1"].status, ClaimEligibilityStatus::AtRisk);

        let mut answered = RiskRecord::new(&t.shipments[0].to_candidate(), now);
        answered.status = ClaimEligibilityStatus::MissedWindow;
        answered.has_provider_response = true;
        t.save_evaluation(answered);
        assert_eq!(t.risk["1"].status, ClaimEligibilityStatus::MissedWindow);
    }

    #[test]
    fn test_earlier_provider_response_counts_as_evidence() {
        let now = Utc::now();
        let mut t = tables(now);
        let candidate = t.shipments[0].to_candidate();
        let mut first = RiskRecord::new(&candidate, now);
        first.status = ClaimEligibilityStatus::AtRisk;
        first.has_provider_response = true;
        t.save_evaluation(first);

        let mut later = RiskRecord::new(&candidate, now + Duration::days(1));
        later.status = ClaimEligibilityStatus::Eligible;
        t.save_evaluation(later);
        assert_eq!(t.risk["1"].status, ClaimEligibilityStatus::Eligible);
        assert!(t.risk["1"].has_provider_response);
    }

    #[test]
    fn test_claim_workflow_status_is_protected() {
        let now = Utc::now();
        let mut t = tables(now);
        let candidate = t.shipments[0].to_candidate();
        let mut filed = RiskRecord::new(&candidate, now);
        filed.status = ClaimEligibilityStatus::ClaimFiled;
        t.risk.insert(filed.internal_id.clone(), filed);

        let mut update = RiskRecord::new(&candidate, now);
        update.status = ClaimEligibilityStatus::AtRisk;
        assert_eq!(
            t.save_evaluation(update),
            RiskWriteOutcome::Protected(ClaimEligibilityStatus::ClaimFiled)
        );
        assert_eq!(t.risk["1"].status, ClaimEligibilityStatus::ClaimFiled);
    }

    #[test]
    fn test_existing_international_flag_wins() {
        let now = Utc::now();
        let mut t = tables(now);
        let mut candidate = t.shipments[0].to_candidate();
        candidate.destination_country = Some("CA".into());
        let first = RiskRecord::new(&candidate, now);
        assert!(first.is_international);
        t.save_evaluation(first);

        candidate.destination_country = Some("US".into());
        let second = RiskRecord::new(&candidate, now + Duration::hours(1));
        t.save_evaluation(second);
        assert!(t.risk["1"].is_international);
        assert_eq!(t.risk["1"].first_checked_at, now);
    }

    #[test]
    fn test_failed_check_touches_bookkeeping_only() {
        let now = Utc::now();
        let mut t = tables(now);
        let mut r = RiskRecord::new(&t.shipments[0].to_candidate(), now);
        r.status = ClaimEligibilityStatus::AtRisk;
        r.days_silent = Some(9);
        t.save_evaluation(r);

        let later = now + Duration::hours(2);
        assert!(t.record_failed_check("1", later, "provider_timeout"));
        let row = &t.risk["1"];
        assert_eq!(row.status, ClaimEligibilityStatus::AtRisk);
        assert_eq!(row.days_silent, Some(9));
        assert_eq!(row.last_checked_at, later);
        assert_eq!(row.check_count, 1);
        assert_eq!(row.last_error.as_deref(), Some("provider_timeout"));
        assert!(!t.record_failed_check("missing", later, "x"));
    }
}
