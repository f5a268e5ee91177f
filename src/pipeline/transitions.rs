//! Status transitions observed during a pass.
//!
//! Compares each shipment's row before and after a check so downstream
//! consumers can be told what became eligible, what ran out of time, and
//! what was delivered.

use serde::Serialize;

use crate::models::{ClaimEligibilityStatus, RiskRecord};

/// One status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Transition {
    pub internal_id: String,
    pub tracking_id: String,
    /// `None` for a shipment seen for the first time
    pub from: Option<ClaimEligibilityStatus>,
    pub to: ClaimEligibilityStatus,
    pub delivered: bool,
}

/// All transitions of a pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransitionReport {
    pub transitions: Vec<Transition>,
}

impl TransitionReport {
    /// Record the change between `previous` and `current`, if any.
    pub fn record(&mut self, previous: Option<&RiskRecord>, current: &RiskRecord) {
        let from = previous.map(|p| p.status);
        let newly_delivered = current.is_delivered && !previous.is_some_and(|p| p.is_delivered);
        if from == Some(current.status) && !newly_delivered {
            return;
        }
        self.transitions.push(Transition {
            internal_id: current.internal_id.clone(),
            tracking_id: current.tracking_id.clone(),
            from,
            to: current.status,
            delivered: newly_delivered,
        });
    }

    pub fn extend(&mut self, other: TransitionReport) {
        self.transitions.extend(other.transitions);
    }

    /// Check if there are any changes.
    pub fn has_changes(&self) -> bool {
        !self.transitions.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.transitions.len()
    }

    fn newly(&self, status: ClaimEligibilityStatus) -> impl Iterator<Item = &Transition> {
        self.transitions
            .iter()
            .filter(move |t| t.to == status && t.from != Some(status))
    }

    pub fn newly_eligible(&self) -> Vec<&Transition> {
        self.newly(ClaimEligibilityStatus::Eligible).collect()
    }

    pub fn newly_missed(&self) -> Vec<&Transition> {
        self.newly(ClaimEligibilityStatus::MissedWindow).collect()
    }

    pub fn newly_delivered(&self) -> Vec<&Transition> {
        self.transitions.iter().filter(|t| t.delivered).collect()
    }

    /// One-line summary for logs.
    pub fn summary_line(&self) -> String {
        format!(
            "{} transitions ({} newly eligible, {} missed window, {} delivered)",
            self.change_count(),
            self.newly_eligible().len(),
            self.newly_missed().len(),
            self.newly_delivered().len()
        )
    }
}
