//! Shipment, claim, and candidate data structures.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::models::SelectionConfig;

/// Immutable snapshot of a shipment taken when it was selected for a check.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentCandidate {
    /// Row identifier in the shipments table
    pub internal_id: String,

    /// Merchant-facing shipment identifier
    pub shipment_id: String,

    /// Carrier tracking number
    pub tracking_id: String,

    /// Free-text carrier name as recorded on the label
    pub carrier: String,

    pub client_id: String,

    /// ISO 3166 alpha-2 origin country, if known
    #[serde(default)]
    pub origin_country: Option<String>,

    /// ISO 3166 alpha-2 destination country, if known
    #[serde(default)]
    pub destination_country: Option<String>,

    pub label_date: DateTime<Utc>,
}

impl ShipmentCandidate {
    /// Whether origin and destination are known and differ.
    ///
    /// A shipment with a missing country code is treated as domestic.
    pub fn is_international(&self) -> bool {
        is_international(
            self.origin_country.as_deref(),
            self.destination_country.as_deref(),
        )
    }
}

/// Compare two country codes, ignoring case and surrounding whitespace.
pub fn is_international(origin: Option<&str>, destination: Option<&str>) -> bool {
    match (origin, destination) {
        (Some(o), Some(d)) => {
            let (o, d) = (o.trim(), d.trim());
            !o.is_empty() && !d.is_empty() && !o.eq_ignore_ascii_case(d)
        }
        _ => false,
    }
}

/// A row of the shipments table owned by the host system.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShipmentRow {
    pub internal_id: String,
    pub shipment_id: String,
    pub tracking_id: String,
    pub carrier: String,
    pub client_id: String,
    #[serde(default)]
    pub origin_country: Option<String>,
    #[serde(default)]
    pub destination_country: Option<String>,
    pub label_date: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cancelled: bool,

    /// Fulfillment status string, e.g. `in_transit`
    pub status: String,
}

impl ShipmentRow {
    /// Take the immutable candidate snapshot.
    pub fn to_candidate(&self) -> ShipmentCandidate {
        ShipmentCandidate {
            internal_id: self.internal_id.clone(),
            shipment_id: self.shipment_id.clone(),
            tracking_id: self.tracking_id.clone(),
            carrier: self.carrier.clone(),
            client_id: self.client_id.clone(),
            origin_country: self.origin_country.clone(),
            destination_country: self.destination_country.clone(),
            label_date: self.label_date,
        }
    }
}

/// Kind of claim a merchant filed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Loss,
    Damage,
    Other,
}

/// Lifecycle of a claim in the external claims workflow.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ClaimState {
    Submitted,
    UnderReview,
    Approved,
    Denied,
    Withdrawn,
}

impl ClaimState {
    /// Active or resolved claims block further loss watching; withdrawn ones do not.
    pub fn blocks_watching(self) -> bool {
        !matches!(self, ClaimState::Withdrawn)
    }
}

/// A row of the claims table owned by the claims workflow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClaimRow {
    pub shipment_internal_id: String,
    pub claim_type: ClaimType,
    pub status: ClaimState,
}

impl ClaimRow {
    /// Whether this claim permanently excludes its shipment from selection.
    pub fn excludes_shipment(&self) -> bool {
        self.claim_type == ClaimType::Loss && self.status.blocks_watching()
    }
}

/// Filter used by the new-candidate query.
#[derive(Debug, Clone)]
pub struct CandidateCriteria {
    /// Labels created at or before this instant qualify
    pub label_cutoff: DateTime<Utc>,
    pub in_progress_statuses: Vec<String>,
    pub limit: usize,
}

impl CandidateCriteria {
    /// Build the criteria for a pass starting at `now`.
    pub fn from_config(config: &SelectionConfig, now: DateTime<Utc>) -> Self {
        Self {
            label_cutoff: now - Duration::days(config.min_label_age_days),
            in_progress_statuses: config.in_progress_statuses.clone(),
            limit: config.new_batch_size,
        }
    }

    /// Row-level part of the new-candidate query.
    ///
    /// The "not already tracked" and "no loss claim" conditions need other
    /// tables and are applied by the store.
    pub fn admits(&self, row: &ShipmentRow) -> bool {
        row.delivered_at.is_none()
            && !row.cancelled
            && row.label_date <= self.label_cutoff
            && self
                .in_progress_statuses
                .iter()
                .any(|s| s.eq_ignore_ascii_case(row.status.trim()))
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn row(id: &str, label_days_ago: i64, now: DateTime<Utc>) -> ShipmentRow {
        ShipmentRow {
            internal_id: id.to_string(),
            shipment_id: format!("shp_{id}"),
            tracking_id: format!("9400111899223344556{id}"),
            carrier: "USPS".to_string(),
            client_id: "client_1".to_string(),
            origin_country: Some("US".to_string()),
            destination_country: Some("US".to_string()),
            label_date: now - Duration::days(label_days_ago),
            delivered_at: None,
            cancelled: false,
            status: "in_transit".to_string(),
        }
    }
}
