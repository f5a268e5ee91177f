//! Claim eligibility calculation.
//!
//! A pure derivation over the provider record and shipment metadata. The
//! result is recomputed from scratch on every check, so an `Eligible`
//! shipment that shows fresh carrier activity goes back to `AtRisk`.

use chrono::{DateTime, Duration, Utc};

use crate::models::{
    ClaimEligibilityStatus, EligibilityConfig, EligibilityResult, InactivityClock,
    ShipmentCandidate, TrackingRecord,
};
use crate::services::status_rules::{StatusRules, TerminalOutcome};
use crate::utils::time::whole_days_between;

/// Calculator holding the day thresholds and terminal-status rules.
pub struct EligibilityCalculator {
    thresholds: EligibilityConfig,
    rules: StatusRules,
}

impl EligibilityCalculator {
    pub fn new(thresholds: EligibilityConfig) -> Self {
        Self {
            thresholds,
            rules: StatusRules::default(),
        }
    }

    pub fn thresholds(&self) -> &EligibilityConfig {
        &self.thresholds
    }

    /// Evaluate a shipment, deriving `is_international` from its country codes.
    pub fn calculate(
        &self,
        tracking: Option<&TrackingRecord>,
        shipment: &ShipmentCandidate,
        label_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EligibilityResult {
        self.calculate_for(tracking, shipment.is_international(), label_date, now)
    }

    /// Evaluate with an already-fixed international flag.
    pub fn calculate_for(
        &self,
        tracking: Option<&TrackingRecord>,
        is_international: bool,
        label_date: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> EligibilityResult {
        let required = self.thresholds.required_days(is_international);
        let max = self.thresholds.max_days(is_international);
        let base = Draft {
            is_international,
            required,
            max,
        };

        let Some(tracking) = tracking else {
            let days = whole_days_between(label_date, now);
            let mut result = base.clocked(
                ClaimEligibilityStatus::AtRisk,
                InactivityClock::NoTrackingData,
                label_date,
                days,
                "no tracking data; estimated from label date",
            );
            result.last_checkpoint_at = None;
            return result;
        };

        let last_checkpoint_at = tracking.last_checkpoint_at();

        if let Some(hit) = self.rules.evaluate(tracking) {
            let mut result = base.terminal(hit.rule);
            result.last_checkpoint_at = last_checkpoint_at;
            match hit.outcome {
                TerminalOutcome::Delivered => result.is_delivered = true,
                TerminalOutcome::Returned => result.is_returned = true,
            }
            return result;
        }

        let Some(last) = last_checkpoint_at else {
            let days = whole_days_between(label_date, now);
            let mut result = base.clocked(
                ClaimEligibilityStatus::AtRisk,
                InactivityClock::LabelDate,
                label_date,
                days,
                "no dated checkpoints; label date used as inactivity clock",
            );
            result.last_checkpoint_at = None;
            return result;
        };

        let days = whole_days_between(last, now);
        let (status, reason) = if days >= max {
            (ClaimEligibilityStatus::MissedWindow, "silent past the filing window")
        } else if days >= required {
            (ClaimEligibilityStatus::Eligible, "silent past the eligibility threshold")
        } else {
            (ClaimEligibilityStatus::AtRisk, "silent below the eligibility threshold")
        };
        base.clocked(status, InactivityClock::LastCheckpoint, last, days, reason)
    }
}

impl Default for EligibilityCalculator {
    fn default() -> Self {
        Self::new(EligibilityConfig::default())
    }
}

/// Evaluate with default thresholds against the current time.
pub fn calculate_eligibility(
    tracking: Option<&TrackingRecord>,
    shipment: &ShipmentCandidate,
    label_date: DateTime<Utc>,
) -> EligibilityResult {
    EligibilityCalculator::default().calculate(tracking, shipment, label_date, Utc::now())
}

struct Draft {
    is_international: bool,
    required: i64,
    max: i64,
}

impl Draft {
    fn terminal(&self, reason: &str) -> EligibilityResult {
        EligibilityResult {
            status: ClaimEligibilityStatus::None,
            is_delivered: false,
            is_returned: false,
            is_international: self.is_international,
            clock: InactivityClock::Terminal,
            days_silent: None,
            days_remaining: None,
            required_days: self.required,
            max_days: self.max,
            last_checkpoint_at: None,
            eligible_at: None,
            window_closes_at: None,
            reason: reason.to_string(),
        }
    }

    fn clocked(
        &self,
        status: ClaimEligibilityStatus,
        clock: InactivityClock,
        since: DateTime<Utc>,
        days: i64,
        reason: &str,
    ) -> EligibilityResult {
        EligibilityResult {
            status,
            is_delivered: false,
            is_returned: false,
            is_international: self.is_international,
            clock,
            days_silent: Some(days),
            days_remaining: Some((self.required - days).max(0)),
            required_days: self.required,
            max_days: self.max,
            last_checkpoint_at: Some(since),
            eligible_at: Some(since + Duration::days(self.required)),
            window_closes_at: Some(since + Duration::days(self.max)),
            reason: reason.to_string(),
        }
    }
}
