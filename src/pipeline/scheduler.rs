// src/pipeline/scheduler.rs

//! Candidate selection and recheck passes.
//!
//! A pass selects new candidates (each may cost one paid lookup) and then
//! at-risk rows due for a recheck, and runs each through the
//! [`ShipmentChecker`] with bounded concurrency and an inter-request delay.

use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::{StreamExt, stream};
use serde::Serialize;

use crate::error::{AppError, Result};
use crate::models::{
    CandidateCriteria, Config, RiskRecord, SelectionConfig, ShipmentCandidate, StoreSummary,
};
use crate::pipeline::check::{CheckOutcome, CheckReport, ShipmentChecker};
use crate::pipeline::circuit_breaker::{CircuitBreaker, ProviderTally};
use crate::pipeline::transitions::TransitionReport;
use crate::services::TrackingApi;

/// Counters for one pass (or one half of it).
#[derive(Debug, Clone, Serialize)]
pub struct PassSummary {
    pub selected: usize,
    pub determined: usize,
    pub undetermined: usize,
    pub unsupported: usize,
    pub protected: usize,
    /// Left for the next pass after the circuit breaker tripped
    pub skipped: usize,
    /// Store faults; the shipment is retried next pass
    pub errors: usize,
    pub paid_calls: u32,
    pub estimated_cost_usd: f64,
    pub checkpoints: StoreSummary,
    pub transitions: TransitionReport,
    pub breaker_tripped: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl PassSummary {
    fn started(now: DateTime<Utc>) -> Self {
        Self {
            selected: 0,
            determined: 0,
            undetermined: 0,
            unsupported: 0,
            protected: 0,
            skipped: 0,
            errors: 0,
            paid_calls: 0,
            estimated_cost_usd: 0.0,
            checkpoints: StoreSummary::default(),
            transitions: TransitionReport::default(),
            breaker_tripped: false,
            started_at: now,
            finished_at: now,
        }
    }

    /// Fold another half-pass into this one.
    pub fn merge(&mut self, other: PassSummary) {
        self.selected += other.selected;
        self.determined += other.determined;
        self.undetermined += other.undetermined;
        self.unsupported += other.unsupported;
        self.protected += other.protected;
        self.skipped += other.skipped;
        self.errors += other.errors;
        self.paid_calls += other.paid_calls;
        self.estimated_cost_usd += other.estimated_cost_usd;
        self.checkpoints += other.checkpoints;
        self.transitions.extend(other.transitions);
        self.breaker_tripped |= other.breaker_tripped;
        self.started_at = self.started_at.min(other.started_at);
        self.finished_at = self.finished_at.max(other.finished_at);
    }

    fn absorb(&mut self, report: CheckReport, cost_per_call: f64) {
        match &report.outcome {
            CheckOutcome::Determined(_) => self.determined += 1,
            CheckOutcome::Undetermined(_) => self.undetermined += 1,
            CheckOutcome::Unsupported => self.unsupported += 1,
            CheckOutcome::Protected(_) => self.protected += 1,
        }
        self.paid_calls += report.paid_calls;
        self.estimated_cost_usd += f64::from(report.paid_calls) * cost_per_call;
        self.checkpoints += report.checkpoints;
        if let Some(saved) = &report.saved {
            self.transitions.record(report.previous.as_ref(), saved);
        }
    }

    pub fn log(&self, label: &str) {
        let secs = (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0;
        log::info!(
            "{}: {} selected, {} determined, {} undetermined, {} unsupported, {} protected, {} skipped, {} errors in {:.1}s",
            label,
            self.selected,
            self.determined,
            self.undetermined,
            self.unsupported,
            self.protected,
            self.skipped,
            self.errors,
            secs
        );
        log::info!(
            "{}: {} paid lookups (~${:.2}), {} checkpoints stored, {} skipped; {}",
            label,
            self.paid_calls,
            self.estimated_cost_usd,
            self.checkpoints.stored,
            self.checkpoints.skipped,
            self.transitions.summary_line()
        );
    }
}

enum JobResult {
    Checked(CheckReport),
    Skipped,
    Failed(AppError),
}

/// Orchestrates passes; all decisions are delegated to the checker.
pub struct RiskScheduler<A> {
    checker: ShipmentChecker<A>,
    selection: SelectionConfig,
    breaker: CircuitBreaker,
    cost_per_call: f64,
}

impl<A: TrackingApi> RiskScheduler<A> {
    pub fn new(checker: ShipmentChecker<A>, config: &Config) -> Self {
        Self {
            checker,
            selection: config.selection.clone(),
            breaker: CircuitBreaker::with_config(config.circuit_breaker.clone()),
            cost_per_call: config.provider.create_cost_usd,
        }
    }

    pub fn checker(&self) -> &ShipmentChecker<A> {
        &self.checker
    }

    /// New candidates, then rechecks, under one circuit breaker.
    pub async fn run_pass(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        let tally = ProviderTally::default();

        let mut summary = self.new_candidates_with(&tally, now).await?;
        summary.merge(self.rechecks_with(&tally, now).await?);
        summary.finished_at = Utc::now().max(summary.started_at);
        summary.log("Pass");
        Ok(summary)
    }

    /// Shipments not yet tracked.
    pub async fn run_new_candidates(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        self.new_candidates_with(&ProviderTally::default(), now)
            .await
    }

    /// At-risk rows not yet checked at `now`, least recently checked first.
    pub async fn run_rechecks(&self, now: DateTime<Utc>) -> Result<PassSummary> {
        self.rechecks_with(&ProviderTally::default(), now).await
    }

    async fn new_candidates_with(
        &self,
        tally: &ProviderTally,
        now: DateTime<Utc>,
    ) -> Result<PassSummary> {
        let criteria = CandidateCriteria::from_config(&self.selection, now);
        let candidates = self.checker.store().new_candidates(&criteria).await?;
        log::info!(
            "Selected {} new candidates (labels before {})",
            candidates.len(),
            criteria.label_cutoff.format("%Y-%m-%d")
        );
        let jobs = candidates.into_iter().map(|c| (c, None)).collect();
        Ok(self.process(jobs, tally, now).await)
    }

    async fn rechecks_with(&self, tally: &ProviderTally, now: DateTime<Utc>) -> Result<PassSummary> {
        let due = self
            .checker
            .store()
            .recheck_candidates(self.selection.recheck_batch_size, now)
            .await?;
        log::info!("Selected {} at-risk shipments for recheck", due.len());
        let jobs = due
            .into_iter()
            .map(|r| (r.candidate, Some(r.risk)))
            .collect();
        Ok(self.process(jobs, tally, now).await)
    }

    async fn process(
        &self,
        jobs: Vec<(ShipmentCandidate, Option<RiskRecord>)>,
        tally: &ProviderTally,
        now: DateTime<Utc>,
    ) -> PassSummary {
        let delay = Duration::from_millis(self.selection.request_delay_ms);
        let concurrency = self.selection.max_concurrent.max(1);

        let mut summary = PassSummary::started(now);
        summary.selected = jobs.len();

        let mut results = stream::iter(jobs)
            .map(|(candidate, existing)| async move {
                let result = self.run_job(&candidate, existing, tally, now).await;
                (candidate, result)
            })
            .buffer_unordered(concurrency);

        while let Some((candidate, result)) = results.next().await {
            match result {
                JobResult::Checked(report) => summary.absorb(report, self.cost_per_call),
                JobResult::Skipped => summary.skipped += 1,
                JobResult::Failed(error) => {
                    summary.errors += 1;
                    log::error!(
                        "Check failed for {} ({}): {}",
                        candidate.internal_id,
                        candidate.tracking_id,
                        error
                    );
                }
            }

            if delay.as_millis() > 0 {
                tokio::time::sleep(delay).await;
            }
        }

        summary.breaker_tripped = tally.tripped();
        summary.finished_at = Utc::now().max(now);
        summary
    }

    async fn run_job(
        &self,
        candidate: &ShipmentCandidate,
        existing: Option<RiskRecord>,
        tally: &ProviderTally,
        now: DateTime<Utc>,
    ) -> JobResult {
        if !self.breaker.allows(tally) {
            return JobResult::Skipped;
        }
        match self.checker.check(candidate, existing, now).await {
            Ok(report) => {
                if report.attempted_lookup {
                    tally.record(report.outcome.is_provider_failure());
                }
                JobResult::Checked(report)
            }
            Err(e) => JobResult::Failed(e),
        }
    }
}
