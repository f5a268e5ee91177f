//! Checkpoint ingestion.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::models::{Checkpoint, StoreSummary, StoredCheckpoint};
use crate::storage::ShipmentStore;

/// Canonicalize and persist scans, each physical event exactly once.
///
/// The same scan reported on both legs, or again on a later check, hashes to
/// the same key and is counted as skipped.
pub async fn store_checkpoints(
    store: &dyn ShipmentStore,
    tracking_id: &str,
    checkpoints: &[Checkpoint],
    now: DateTime<Utc>,
) -> Result<StoreSummary> {
    let mut seen = HashSet::new();
    let mut summary = StoreSummary::default();
    let mut rows = Vec::with_capacity(checkpoints.len());

    for checkpoint in checkpoints {
        let row = StoredCheckpoint::from_checkpoint(checkpoint, tracking_id, now);
        if seen.insert(row.hash.clone()) {
            rows.push(row);
        } else {
            summary.skipped += 1;
        }
    }

    for inserted in store.insert_checkpoints(&rows).await? {
        if inserted {
            summary.stored += 1;
        } else {
            summary.skipped += 1;
        }
    }

    if summary.total() > 0 {
        log::debug!(
            "Checkpoints for {}: {} stored, {} skipped",
            tracking_id,
            summary.stored,
            summary.skipped
        );
    }
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::models::fixtures::{scan, silent_for};
    use crate::models::{Leg, TransitLeg};
    use crate::storage::MemoryStore;

    #[tokio::test]
    async fn test_second_ingest_skips_everything() {
        let now = Utc::now();
        let store = MemoryStore::default();
        let checkpoints = silent_for(3, now).checkpoints();

        let first = store_checkpoints(&store, "9400", &checkpoints, now).await.unwrap();
        assert_eq!(first, StoreSummary { stored: 1, skipped: 0 });

        let second = store_checkpoints(&store, "9400", &checkpoints, now).await.unwrap();
        assert_eq!(second, StoreSummary { stored: 0, skipped: 1 });
    }

    #[tokio::test]
    async fn test_same_scan_on_both_legs_is_stored_once() {
        let now = Utc::now();
        let store = MemoryStore::default();
        let origin_at = DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut tracking = silent_for(3, now);
        tracking.origin_info = Some(TransitLeg {
            trackinfo: Some(vec![scan(origin_at, "In transit to next facility")]),
        });
        tracking.destination_info = Some(TransitLeg {
            trackinfo: Some(vec![scan(
                origin_at + Duration::minutes(4),
                "IN TRANSIT  TO NEXT FACILITY",
            )]),
        });
        let checkpoints = tracking.checkpoints();
        assert_eq!(checkpoints.len(), 2);
        assert_eq!(checkpoints[1].leg, Leg::Destination);

        let summary = store_checkpoints(&store, "9400", &checkpoints, now).await.unwrap();
        assert_eq!(summary, StoreSummary { stored: 1, skipped: 1 });
    }

    #[tokio::test]
    async fn test_empty_input() {
        let store = MemoryStore::default();
        let summary = store_checkpoints(&store, "9400", &[], Utc::now()).await.unwrap();
        assert_eq!(summary.total(), 0);
    }
}
