//! Single-shipment check: resolve, look up, ingest, evaluate, persist.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{ProviderError, Result};
use crate::models::{
    ClaimEligibilityStatus, EligibilityResult, RiskContext, RiskRecord, RiskSummary,
    RiskWriteOutcome, ShipmentCandidate, StoreSummary, TrackingRecord,
};
use crate::pipeline::checkpoints::store_checkpoints;
use crate::services::{
    CarrierResolver, EligibilityCalculator, Lookup, Resolution, Summarizer, TrackingApi,
    TrackingClient,
};
use crate::storage::ShipmentStore;

/// What a check established about a shipment.
///
/// `Determined` carries a real result, including "not eligible yet";
/// `Undetermined` means the provider could not answer and nothing about the
/// shipment's status should be inferred.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Determined(EligibilityResult),
    Undetermined(ProviderError),
    /// No carrier code could be derived; the shipment is not watched
    Unsupported,
    /// The claims workflow owns this row
    Protected(ClaimEligibilityStatus),
}

impl CheckOutcome {
    pub fn is_provider_failure(&self) -> bool {
        matches!(self, Self::Undetermined(e) if e.is_retryable())
    }
}

/// Everything a check produced.
#[derive(Debug, Clone)]
pub struct CheckReport {
    pub outcome: CheckOutcome,
    pub paid_calls: u32,
    /// Whether the provider was contacted (cache hits included)
    pub attempted_lookup: bool,
    pub checkpoints: StoreSummary,
    pub previous: Option<RiskRecord>,
    /// The row as written, when one was
    pub saved: Option<RiskRecord>,
}

impl CheckReport {
    fn new(outcome: CheckOutcome, previous: Option<RiskRecord>) -> Self {
        Self {
            outcome,
            paid_calls: 0,
            attempted_lookup: false,
            checkpoints: StoreSummary::default(),
            previous,
            saved: None,
        }
    }
}

/// Result of [`ShipmentChecker::preview`].
#[derive(Debug)]
pub struct Preview {
    pub resolution: Option<Resolution>,
    pub lookup: Option<Lookup>,
    pub result: Option<EligibilityResult>,
}

/// Runs one shipment through the whole check.
pub struct ShipmentChecker<A> {
    store: Arc<dyn ShipmentStore>,
    tracking: TrackingClient<A>,
    resolver: CarrierResolver,
    calculator: EligibilityCalculator,
    summarizer: Arc<dyn Summarizer>,
}

impl<A: TrackingApi> ShipmentChecker<A> {
    pub fn new(
        store: Arc<dyn ShipmentStore>,
        tracking: TrackingClient<A>,
        resolver: CarrierResolver,
        calculator: EligibilityCalculator,
        summarizer: Arc<dyn Summarizer>,
    ) -> Self {
        Self {
            store,
            tracking,
            resolver,
            calculator,
            summarizer,
        }
    }

    pub fn store(&self) -> &dyn ShipmentStore {
        self.store.as_ref()
    }

    pub fn tracking(&self) -> &TrackingClient<A> {
        &self.tracking
    }

    /// Check a shipment. `existing` is its current risk row, if any.
    pub async fn check(
        &self,
        candidate: &ShipmentCandidate,
        existing: Option<RiskRecord>,
        now: DateTime<Utc>,
    ) -> Result<CheckReport> {
        // A claim may have been filed after the candidate was selected.
        if self.store.has_loss_claim(&candidate.internal_id).await? {
            log::info!(
                "{} has an active loss claim; skipping lookup",
                candidate.internal_id
            );
            return Ok(CheckReport::new(
                CheckOutcome::Protected(ClaimEligibilityStatus::ClaimFiled),
                existing,
            ));
        }

        let code = existing
            .as_ref()
            .and_then(|r| r.carrier_code.clone())
            .or_else(|| {
                self.resolver
                    .resolve(Some(&candidate.carrier), Some(&candidate.tracking_id))
                    .map(|r| r.code)
            });

        let Some(code) = code else {
            return self.mark_unsupported(candidate, existing, now).await;
        };

        let lookup = self.tracking.lookup(&candidate.tracking_id, &code).await;
        let paid_calls = lookup.paid_calls();
        let mut report = match lookup.outcome.tracking() {
            Some(tracking) => {
                self.evaluate(candidate, existing, &code, tracking, now)
                    .await?
            }
            None => {
                let error = lookup
                    .outcome
                    .error()
                    .cloned()
                    .unwrap_or_else(|| ProviderError::Malformed("lookup returned nothing".into()));
                self.record_failure(candidate, existing, &code, error, now)
                    .await?
            }
        };
        report.paid_calls = paid_calls;
        report.attempted_lookup = !lookup.from_cache;
        Ok(report)
    }

    /// Evaluate a tracking number ad hoc, without reading or writing the store.
    pub async fn preview(
        &self,
        tracking_number: &str,
        carrier: Option<&str>,
        is_international: bool,
        label_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Preview {
        let resolution = self.resolver.resolve(carrier, Some(tracking_number));
        let Some(code) = resolution.as_ref().map(|r| r.code.clone()) else {
            return Preview {
                resolution,
                lookup: None,
                result: None,
            };
        };
        let lookup = self.tracking.lookup(tracking_number, &code).await;
        let result = lookup.outcome.tracking().map(|tracking| {
            self.calculator
                .calculate_for(Some(tracking), is_international, label_date, now)
        });
        Preview {
            resolution,
            lookup: Some(lookup),
            result,
        }
    }

    async fn mark_unsupported(
        &self,
        candidate: &ShipmentCandidate,
        existing: Option<RiskRecord>,
        now: DateTime<Utc>,
    ) -> Result<CheckReport> {
        let error = ProviderError::UnsupportedCarrier {
            carrier: candidate.carrier.clone(),
            tracking_number: candidate.tracking_id.clone(),
        };
        log::info!("Skipping {}: {}", candidate.internal_id, error);

        let mut record = existing
            .clone()
            .unwrap_or_else(|| RiskRecord::new(candidate, now));
        record.status = ClaimEligibilityStatus::None;
        record.mark_checked(now, Some(format!("{}: {}", error.kind(), error)));

        let mut report = CheckReport::new(CheckOutcome::Unsupported, existing);
        report.outcome = match self.store.save_evaluation(record.clone()).await? {
            RiskWriteOutcome::Written => {
                report.saved = Some(record);
                CheckOutcome::Unsupported
            }
            RiskWriteOutcome::Protected(status) => CheckOutcome::Protected(status),
        };
        Ok(report)
    }

    /// Provider failure: never advance status.
    async fn record_failure(
        &self,
        candidate: &ShipmentCandidate,
        existing: Option<RiskRecord>,
        code: &str,
        error: ProviderError,
        now: DateTime<Utc>,
    ) -> Result<CheckReport> {
        let message = format!("{}: {}", error.kind(), error);
        match &existing {
            Some(_) => {
                self.store
                    .record_failed_check(&candidate.internal_id, now, &message)
                    .await?;
            }
            None if !error.is_retryable() => {
                // A definite provider refusal: park the shipment instead of
                // paying for the same refusal on every pass.
                let mut record = RiskRecord::new(candidate, now);
                record.carrier_code = Some(code.to_string());
                record.mark_checked(now, Some(message));
                let mut report = CheckReport::new(CheckOutcome::Undetermined(error), None);
                if self.store.save_evaluation(record.clone()).await? == RiskWriteOutcome::Written {
                    report.saved = Some(record);
                }
                return Ok(report);
            }
            None => {}
        }
        Ok(CheckReport::new(CheckOutcome::Undetermined(error), existing))
    }

    async fn evaluate(
        &self,
        candidate: &ShipmentCandidate,
        existing: Option<RiskRecord>,
        code: &str,
        tracking: &TrackingRecord,
        now: DateTime<Utc>,
    ) -> Result<CheckReport> {
        let checkpoints = store_checkpoints(
            self.store.as_ref(),
            &candidate.tracking_id,
            &tracking.checkpoints(),
            now,
        )
        .await?;

        let is_international = existing
            .as_ref()
            .map(|r| r.is_international)
            .unwrap_or_else(|| candidate.is_international());
        let result =
            self.calculator
                .calculate_for(Some(tracking), is_international, candidate.label_date, now);

        let mut record = existing
            .clone()
            .unwrap_or_else(|| RiskRecord::new(candidate, now));
        record.carrier_code = Some(code.to_string());
        record.provider_tracking_id = Some(tracking.id.clone());
        record.has_provider_response = true;
        record.apply(&result, now);
        if let Some(summary) = self.summarize(&record, tracking).await {
            record.summary = Some(summary);
        }

        let mut report = CheckReport::new(CheckOutcome::Determined(result), existing);
        report.checkpoints = checkpoints;
        match self.store.save_evaluation(record.clone()).await? {
            RiskWriteOutcome::Written => report.saved = Some(record),
            RiskWriteOutcome::Protected(status) => {
                log::info!(
                    "{} is {}; leaving the claims workflow's row untouched",
                    candidate.internal_id,
                    status
                );
                report.outcome = CheckOutcome::Protected(status);
            }
        }
        Ok(report)
    }

    async fn summarize(
        &self,
        record: &RiskRecord,
        tracking: &TrackingRecord,
    ) -> Option<RiskSummary> {
        let context = RiskContext {
            tracking_id: record.tracking_id.clone(),
            carrier: record.carrier.clone(),
            status: record.status,
            days_silent: record.days_silent,
            days_remaining: record.days_remaining,
            is_international: record.is_international,
            latest_event: tracking.latest_event.clone(),
        };
        match self.summarizer.summarize(&context).await {
            Ok(summary) => Some(summary),
            Err(e) => {
                log::debug!("No summary for {}: {}", record.tracking_id, e);
                None
            }
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{FakeProvider, checker};
    use super::*;
    use crate::models::fixtures::{row, silent_for};
    use crate::models::{ClaimRow, ClaimState, ClaimType};
    use crate::storage::MemoryStore;

    fn candidate(now: DateTime<Utc>) -> ShipmentCandidate {
        let mut c = row("1", 30, now).to_candidate();
        c.tracking_id = "9400111899223344556677".into();
        c
    }

    fn timeout() -> ProviderError {
        ProviderError::Timeout {
            operation: "get".into(),
            secs: 30,
        }
    }

    #[tokio::test]
    async fn test_silent_shipment_becomes_eligible() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let checker = checker(store.clone(), FakeProvider::default().with_record(silent_for(16, now)));

        let report = checker.check(&candidate(now), None, now).await.unwrap();
        match &report.outcome {
            CheckOutcome::Determined(result) => {
                assert_eq!(result.status, ClaimEligibilityStatus::Eligible)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(report.paid_calls, 0);
        assert_eq!(report.checkpoints.stored, 1);

        let saved = store.get_risk("1").await.unwrap().unwrap();
        assert_eq!(saved.status, ClaimEligibilityStatus::Eligible);
        assert!(saved.has_provider_response);
        assert_eq!(saved.carrier_code.as_deref(), Some("usps"));
        assert!(saved.summary.is_some());
    }

    #[tokio::test]
    async fn test_unknown_number_is_created_and_paid_for() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let checker = checker(store.clone(), FakeProvider::default());

        let report = checker.check(&candidate(now), None, now).await.unwrap();
        assert_eq!(report.paid_calls, 1);
        // A fresh registration has no scans yet: label-date clock, never eligible.
        let saved = report.saved.unwrap();
        assert_eq!(saved.status, ClaimEligibilityStatus::AtRisk);
    }

    #[tokio::test]
    async fn test_timeout_leaves_status_unchanged() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let c = candidate(now);
        let mut existing = RiskRecord::new(&c, now - chrono::Duration::days(1));
        existing.status = ClaimEligibilityStatus::AtRisk;
        existing.carrier_code = Some("usps".into());
        existing.days_silent = Some(12);
        existing.has_provider_response = true;
        store.put_risk(existing.clone()).await;

        let checker = checker(store.clone(), FakeProvider::default().failing(&c.tracking_id, timeout()));
        let report = checker.check(&c, Some(existing.clone()), now).await.unwrap();
        assert!(report.outcome.is_provider_failure());
        assert!(report.saved.is_none());

        let row = store.get_risk("1").await.unwrap().unwrap();
        assert_eq!(row.status, ClaimEligibilityStatus::AtRisk);
        assert_eq!(row.days_silent, Some(12));
        assert_eq!(row.last_checked_at, now);
        assert_eq!(row.check_count, existing.check_count + 1);
        assert!(row.last_error.unwrap().starts_with("provider_timeout"));
    }

    #[tokio::test]
    async fn test_timeout_on_new_candidate_writes_nothing() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let c = candidate(now);
        let checker = checker(store.clone(), FakeProvider::default().failing(&c.tracking_id, timeout()));

        let report = checker.check(&c, None, now).await.unwrap();
        assert!(matches!(report.outcome, CheckOutcome::Undetermined(_)));
        assert!(store.get_risk("1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_business_error_parks_new_candidate() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let c = candidate(now);
        let refusal = ProviderError::Business {
            code: 4190,
            message: "invalid tracking number".into(),
        };
        let checker = checker(store.clone(), FakeProvider::default().failing(&c.tracking_id, refusal));

        let report = checker.check(&c, None, now).await.unwrap();
        assert!(!report.outcome.is_provider_failure());
        let row = store.get_risk("1").await.unwrap().unwrap();
        assert_eq!(row.status, ClaimEligibilityStatus::None);
        assert!(!row.has_provider_response);
        assert!(row.last_error.unwrap().contains("4190"));
    }

    #[tokio::test]
    async fn test_unsupported_carrier_is_parked() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let mut c = candidate(now);
        c.carrier = "Pigeon Express".into();
        c.tracking_id = "PIGEON-1".into();
        let checker = checker(store.clone(), FakeProvider::default());

        let report = checker.check(&c, None, now).await.unwrap();
        assert_eq!(report.outcome, CheckOutcome::Unsupported);
        assert!(!report.attempted_lookup);
        let row = store.get_risk("1").await.unwrap().unwrap();
        assert_eq!(row.status, ClaimEligibilityStatus::None);
        assert!(row.carrier_code.is_none());
    }

    #[tokio::test]
    async fn test_claim_filed_row_is_protected() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let c = candidate(now);
        let mut filed = RiskRecord::new(&c, now);
        filed.status = ClaimEligibilityStatus::ClaimFiled;
        filed.carrier_code = Some("usps".into());
        store.put_risk(filed.clone()).await;

        let checker = checker(store.clone(), FakeProvider::default().with_record(silent_for(50, now)));
        let report = checker.check(&c, Some(filed), now).await.unwrap();
        assert_eq!(
            report.outcome,
            CheckOutcome::Protected(ClaimEligibilityStatus::ClaimFiled)
        );
        let row = store.get_risk("1").await.unwrap().unwrap();
        assert_eq!(row.status, ClaimEligibilityStatus::ClaimFiled);
    }

    #[tokio::test]
    async fn test_loss_claim_filed_after_selection_skips_lookup() {
        let now = Utc::now();
        let claims = vec![ClaimRow {
            shipment_internal_id: "1".into(),
            claim_type: ClaimType::Loss,
            status: ClaimState::Submitted,
        }];
        let store = Arc::new(MemoryStore::new(Vec::new(), claims));
        let provider = FakeProvider::default().with_record(silent_for(16, now));
        let checker = checker(store.clone(), provider);

        let report = checker.check(&candidate(now), None, now).await.unwrap();
        assert_eq!(
            report.outcome,
            CheckOutcome::Protected(ClaimEligibilityStatus::ClaimFiled)
        );
        assert!(!report.attempted_lookup);
        assert!(report.saved.is_none());
        assert!(store.get_risk("1").await.unwrap().is_none());
        assert_eq!(store.stats().await.unwrap().checkpoints, 0);
    }

    #[tokio::test]
    async fn test_delivered_shipment_stops_being_watched() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let mut tracking = silent_for(30, now);
        tracking.delivery_status = Some("delivered".into());
        let checker = checker(store.clone(), FakeProvider::default().with_record(tracking));

        let report = checker.check(&candidate(now), None, now).await.unwrap();
        let saved = report.saved.unwrap();
        assert_eq!(saved.status, ClaimEligibilityStatus::None);
        assert!(saved.is_delivered);
    }

    #[tokio::test]
    async fn test_preview_writes_nothing() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::default());
        let checker = checker(store.clone(), FakeProvider::default().with_record(silent_for(46, now)));

        let preview = checker
            .preview("9400111899223344556677", Some("USPS"), false, now, now)
            .await;
        assert_eq!(preview.resolution.unwrap().code, "usps");
        assert_eq!(
            preview.result.unwrap().status,
            ClaimEligibilityStatus::MissedWindow
        );
        assert_eq!(store.stats().await.unwrap().checkpoints, 0);
    }
}
