//! Pipeline entry points.
//!
//! - [`ShipmentChecker`]: one shipment end to end
//! - [`RiskScheduler`]: new-candidate and recheck passes
//! - [`NormalizationPass`]: classify stored checkpoints
//! - [`Engine`]: a full cycle (pass, then optional normalization)

pub mod check;
pub mod checkpoints;
pub mod circuit_breaker;
pub mod normalize;
pub mod scheduler;
pub mod transitions;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;
use crate::services::TrackingApi;

pub use check::{CheckOutcome, CheckReport, Preview, ShipmentChecker};
pub use checkpoints::store_checkpoints;
pub use circuit_breaker::{CircuitBreaker, CircuitBreakerResult, ProviderTally};
pub use normalize::{NormalizationPass, NormalizeSummary};
pub use scheduler::{PassSummary, RiskScheduler};
pub use transitions::{Transition, TransitionReport};

/// Result of one engine cycle.
#[derive(Debug, Clone, Serialize)]
pub struct CycleSummary {
    pub pass: PassSummary,
    pub normalization: Option<NormalizeSummary>,
}

/// Scheduler and normalizer sharing one store.
pub struct Engine<A> {
    pub scheduler: RiskScheduler<A>,
    pub normalizer: NormalizationPass,
    pub normalize_after_pass: bool,
}

impl<A: TrackingApi> Engine<A> {
    /// One pass, then normalization when enabled.
    ///
    /// A failed normalization is logged and does not fail the cycle; the
    /// rows stay unclassified for the next one.
    pub async fn run_cycle(&self, now: DateTime<Utc>) -> Result<CycleSummary> {
        let pass = self.scheduler.run_pass(now).await?;

        let normalization = if self.normalize_after_pass {
            match self.normalizer.run().await {
                Ok(summary) => Some(summary),
                Err(e) => {
                    log::error!("Normalization failed: {}", e);
                    None
                }
            }
        } else {
            None
        };

        Ok(CycleSummary {
            pass,
            normalization,
        })
    }
}
