//! Claim eligibility status and the derived per-check result.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Claim lifecycle status of a watched shipment.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimEligibilityStatus {
    AtRisk,
    Eligible,
    ClaimFiled,
    Approved,
    Denied,
    MissedWindow,
    /// Not tracked: delivered, returned, or unknown
    None,
}

impl ClaimEligibilityStatus {
    /// Statuses owned by the claims workflow. The engine never overwrites these.
    pub fn is_claim_workflow(self) -> bool {
        matches!(self, Self::ClaimFiled | Self::Approved | Self::Denied)
    }

    /// Statuses that require at least one successful provider response.
    pub fn requires_provider_evidence(self) -> bool {
        matches!(self, Self::Eligible | Self::MissedWindow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AtRisk => "at_risk",
            Self::Eligible => "eligible",
            Self::ClaimFiled => "claim_filed",
            Self::Approved => "approved",
            Self::Denied => "denied",
            Self::MissedWindow => "missed_window",
            Self::None => "none",
        }
    }
}

impl fmt::Display for ClaimEligibilityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started the inactivity clock for a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InactivityClock {
    /// No provider data at all
    NoTrackingData,
    /// Provider record without dated scans
    LabelDate,
    /// Latest scan across both legs
    LastCheckpoint,
    /// Terminal outcome; no clock applies
    Terminal,
}

/// Derived eligibility for one shipment at one instant.
///
/// Recomputed from scratch on every check and never authoritative by
/// itself; the persisted status lives on the risk record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EligibilityResult {
    pub status: ClaimEligibilityStatus,
    pub is_delivered: bool,
    pub is_returned: bool,
    pub is_international: bool,
    pub clock: InactivityClock,

    /// Whole days since the clock started
    pub days_silent: Option<i64>,

    /// Days until the shipment becomes eligible; zero once reached
    pub days_remaining: Option<i64>,
    pub required_days: i64,
    pub max_days: i64,
    pub last_checkpoint_at: Option<DateTime<Utc>>,

    /// Projected instant the eligibility threshold is reached
    pub eligible_at: Option<DateTime<Utc>>,

    /// Projected instant the filing window closes
    pub window_closes_at: Option<DateTime<Utc>>,

    /// Which rule produced this result
    pub reason: String,
}

impl EligibilityResult {
    /// Whether a claim may be filed right now.
    pub fn can_file_claim(&self) -> bool {
        self.status == ClaimEligibilityStatus::Eligible
    }
}
