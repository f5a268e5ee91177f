//! Checkpoint normalization pass.
//!
//! Classifies stored checkpoints that have no classification yet. Summarizer
//! calls within a batch are serialized; the row updates of a batch run in
//! parallel; batches are separated by a pause.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde::Serialize;

use crate::error::Result;
use crate::models::{Normalization, NormalizationConfig};
use crate::services::Summarizer;
use crate::storage::ShipmentStore;

/// Counters for one normalization run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeSummary {
    pub batches: usize,
    pub normalized: usize,
    /// Already classified by a concurrent run
    pub skipped: usize,
    /// Distinct checkpoints the summarizer could not classify
    pub failed: usize,
}

pub struct NormalizationPass {
    store: Arc<dyn ShipmentStore>,
    summarizer: Arc<dyn Summarizer>,
    config: NormalizationConfig,
}

impl NormalizationPass {
    pub fn new(
        store: Arc<dyn ShipmentStore>,
        summarizer: Arc<dyn Summarizer>,
        config: NormalizationConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            config,
        }
    }

    pub async fn run(&self) -> Result<NormalizeSummary> {
        let delay = Duration::from_millis(self.config.batch_delay_ms);
        let mut summary = NormalizeSummary::default();
        // Rows that failed once are left for the next run.
        let mut failed: HashSet<String> = HashSet::new();

        while summary.batches < self.config.max_batches {
            let batch: Vec<_> = self
                .store
                .unnormalized_checkpoints(self.config.batch_size + failed.len())
                .await?
                .into_iter()
                .filter(|c| !failed.contains(&c.hash))
                .take(self.config.batch_size)
                .collect();
            if batch.is_empty() {
                break;
            }
            if summary.batches > 0 && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            summary.batches += 1;

            let mut updates = Vec::with_capacity(batch.len());
            for checkpoint in &batch {
                match self.summarizer.classify(checkpoint).await {
                    Ok(classification) => updates.push((
                        checkpoint.hash.clone(),
                        Normalization {
                            classification,
                            normalized_at: Utc::now(),
                        },
                    )),
                    Err(e) => {
                        failed.insert(checkpoint.hash.clone());
                        log::warn!("Could not classify checkpoint {}: {}", checkpoint.hash, e);
                    }
                }
            }

            let writes = updates
                .into_iter()
                .map(|(hash, normalization)| {
                    let store = Arc::clone(&self.store);
                    async move { store.set_normalization(&hash, normalization).await }
                });
            for written in join_all(writes).await {
                if written? {
                    summary.normalized += 1;
                } else {
                    summary.skipped += 1;
                }
            }

            log::debug!(
                "Normalization batch {}: {} checkpoints",
                summary.batches,
                batch.len()
            );
        }

        summary.failed = failed.len();
        log::info!(
            "Normalized {} checkpoints in {} batches ({} failed, {} already done) via {}",
            summary.normalized,
            summary.batches,
            summary.failed,
            summary.skipped,
            self.summarizer.name()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::{DateTime, Duration as ChronoDuration};

    use super::*;
    use crate::error::AppError;
    use crate::models::{
        Checkpoint, CheckpointKind, Classification, Leg, RiskContext, RiskSummary,
        StoredCheckpoint,
    };
    use crate::services::RuleSummarizer;
    use crate::storage::MemoryStore;

    fn config(batch_size: usize) -> NormalizationConfig {
        NormalizationConfig {
            batch_size,
            batch_delay_ms: 0,
            max_batches: 20,
        }
    }

    async fn seeded(texts: &[&str]) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::default());
        let base = DateTime::parse_from_rfc3339("2025-03-01T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let rows: Vec<_> = texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                let cp = Checkpoint {
                    date: (base + ChronoDuration::days(i as i64)).fixed_offset(),
                    raw_description: text.to_string(),
                    raw_location: None,
                    city: None,
                    state: None,
                    country: Some("US".into()),
                    raw_status: None,
                    carrier: "usps".into(),
                    leg: Leg::Origin,
                };
                StoredCheckpoint::from_checkpoint(&cp, "9400", base)
            })
            .collect();
        store.insert_checkpoints(&rows).await.unwrap();
        store
    }

    #[tokio::test]
    async fn test_classifies_everything_in_batches() {
        let store = seeded(&["Delivered, front door", "Departed facility", "Arrived at hub"]).await;
        let pass = NormalizationPass::new(store.clone(), Arc::new(RuleSummarizer), config(2));

        let summary = pass.run().await.unwrap();
        assert_eq!(summary.normalized, 3);
        assert_eq!(summary.batches, 2);

        let rows = store.checkpoints_for_tracking("9400").await.unwrap();
        assert!(rows.iter().all(|r| r.is_normalized()));
        let delivered = rows
            .iter()
            .find(|r| r.description.starts_with("Delivered"))
            .and_then(|r| r.normalization.as_ref())
            .unwrap();
        assert_eq!(delivered.classification.kind, CheckpointKind::Delivered);

        // A second run finds nothing to do.
        let again = pass.run().await.unwrap();
        assert_eq!(again, NormalizeSummary::default());
    }

    struct Broken;

    #[async_trait]
    impl Summarizer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn classify(&self, _checkpoint: &StoredCheckpoint) -> Result<Classification> {
            Err(AppError::summarizer("model offline"))
        }

        async fn summarize(&self, _context: &RiskContext) -> Result<RiskSummary> {
            Err(AppError::summarizer("model offline"))
        }
    }

    /// Fails on one description and classifies the rest.
    struct Picky;

    #[async_trait]
    impl Summarizer for Picky {
        fn name(&self) -> &'static str {
            "picky"
        }

        async fn classify(&self, checkpoint: &StoredCheckpoint) -> Result<Classification> {
            if checkpoint.description.contains("garbled") {
                return Err(AppError::summarizer("unreadable scan"));
            }
            RuleSummarizer.classify(checkpoint).await
        }

        async fn summarize(&self, context: &RiskContext) -> Result<RiskSummary> {
            RuleSummarizer.summarize(context).await
        }
    }

    #[tokio::test]
    async fn test_failing_row_is_counted_once_and_not_retried() {
        let store = seeded(&["garbled ###", "Departed facility", "Arrived at hub", "Out for delivery"]).await;
        let pass = NormalizationPass::new(store.clone(), Arc::new(Picky), config(1));

        let summary = pass.run().await.unwrap();
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.normalized, 3);
        assert_eq!(summary.batches, 4);
        assert_eq!(store.stats().await.unwrap().unnormalized, 1);
    }

    #[tokio::test]
    async fn test_failing_summarizer_stops_when_only_failures_remain() {
        let store = seeded(&["Departed facility"]).await;
        let pass = NormalizationPass::new(store, Arc::new(Broken), config(10));

        let summary = pass.run().await.unwrap();
        assert_eq!(summary.batches, 1);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.normalized, 0);
    }
}
