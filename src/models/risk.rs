//! Persisted risk/eligibility rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{
    ClaimEligibilityStatus, EligibilityResult, Sentiment, ShipmentCandidate,
};

/// Best-effort narrative attached to a risk row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskSummary {
    pub headline: String,
    pub action: String,
    pub sentiment: Sentiment,
    /// 0.0 - 1.0
    pub confidence: f32,
}

/// Inputs handed to the summarizer.
#[derive(Debug, Clone, Serialize)]
pub struct RiskContext {
    pub tracking_id: String,
    pub carrier: String,
    pub status: ClaimEligibilityStatus,
    pub days_silent: Option<i64>,
    pub days_remaining: Option<i64>,
    pub is_international: bool,
    pub latest_event: Option<String>,
}

/// One row per tracked shipment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskRecord {
    pub internal_id: String,
    pub shipment_id: String,
    pub tracking_id: String,
    pub carrier: String,
    pub client_id: String,

    /// Resolved provider carrier code; `None` when unsupported
    #[serde(default)]
    pub carrier_code: Option<String>,

    /// Fixed when the row is first written
    pub is_international: bool,
    pub status: ClaimEligibilityStatus,
    #[serde(default)]
    pub is_delivered: bool,
    #[serde(default)]
    pub days_silent: Option<i64>,
    #[serde(default)]
    pub days_remaining: Option<i64>,
    #[serde(default)]
    pub last_checkpoint_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub eligible_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub window_closes_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub provider_tracking_id: Option<String>,
    #[serde(default)]
    pub summary: Option<RiskSummary>,

    /// Set once any provider lookup for this shipment succeeded
    #[serde(default)]
    pub has_provider_response: bool,
    pub first_checked_at: DateTime<Utc>,
    pub last_checked_at: DateTime<Utc>,
    #[serde(default)]
    pub check_count: u32,
    #[serde(default)]
    pub last_error: Option<String>,
}

impl RiskRecord {
    /// Start a row for a shipment seen for the first time.
    pub fn new(candidate: &ShipmentCandidate, now: DateTime<Utc>) -> Self {
        Self {
            internal_id: candidate.internal_id.clone(),
            shipment_id: candidate.shipment_id.clone(),
            tracking_id: candidate.tracking_id.clone(),
            carrier: candidate.carrier.clone(),
            client_id: candidate.client_id.clone(),
            carrier_code: None,
            is_international: candidate.is_international(),
            status: ClaimEligibilityStatus::None,
            is_delivered: false,
            days_silent: None,
            days_remaining: None,
            last_checkpoint_at: None,
            eligible_at: None,
            window_closes_at: None,
            provider_tracking_id: None,
            summary: None,
            has_provider_response: false,
            first_checked_at: now,
            last_checked_at: now,
            check_count: 0,
            last_error: None,
        }
    }

    /// Copy a freshly computed result onto this row.
    pub fn apply(&mut self, result: &EligibilityResult, now: DateTime<Utc>) {
        self.status = result.status;
        self.is_delivered = result.is_delivered;
        self.days_silent = result.days_silent;
        self.days_remaining = result.days_remaining;
        self.last_checkpoint_at = result.last_checkpoint_at;
        self.eligible_at = result.eligible_at;
        self.window_closes_at = result.window_closes_at;
        self.mark_checked(now, None);
    }

    /// Advance recheck bookkeeping only.
    pub fn mark_checked(&mut self, now: DateTime<Utc>, error: Option<String>) {
        self.last_checked_at = now;
        self.check_count = self.check_count.saturating_add(1);
        self.last_error = error;
    }
}

/// Result of a conditional risk-row write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskWriteOutcome {
    Written,
    /// The stored row is owned by the claims workflow and was left alone
    Protected(ClaimEligibilityStatus),
}

/// A recheck candidate: the shipment snapshot plus its current row.
#[derive(Debug, Clone)]
pub struct RecheckCandidate {
    pub candidate: ShipmentCandidate,
    pub risk: RiskRecord,
}
