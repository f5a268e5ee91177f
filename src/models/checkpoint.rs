//! Carrier scan events, raw and canonical.

use chrono::{DateTime, FixedOffset, Utc};
use serde::{Deserialize, Serialize};

use crate::utils::{collapse_whitespace, hash::checkpoint_hash, non_blank};

/// Which transit leg reported a scan.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Leg {
    Origin,
    Destination,
}

/// A scan event as the provider reported it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Checkpoint {
    /// Scan time with the offset the carrier reported
    pub date: DateTime<FixedOffset>,
    pub raw_description: String,
    #[serde(default)]
    pub raw_location: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub raw_status: Option<String>,
    pub carrier: String,
    pub leg: Leg,
}

impl Checkpoint {
    /// Flat location string, synthesized from parts when none was supplied.
    pub fn location(&self) -> String {
        if let Some(flat) = non_blank(self.raw_location.as_deref()) {
            return collapse_whitespace(flat);
        }
        [&self.city, &self.state, &self.country]
            .into_iter()
            .filter_map(|part| non_blank(part.as_deref()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Content hash of this scan.
    pub fn content_hash(&self) -> String {
        checkpoint_hash(
            &self.carrier,
            self.date.date_naive(),
            &self.raw_description,
            &self.location(),
        )
    }

    pub fn date_utc(&self) -> DateTime<Utc> {
        self.date.with_timezone(&Utc)
    }
}

/// Coarse event category assigned by the normalization pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointKind {
    InfoReceived,
    PickedUp,
    InTransit,
    Customs,
    OutForDelivery,
    DeliveryAttempt,
    Delivered,
    Exception,
    Returned,
    Unknown,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

/// Classification of one checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Classification {
    #[serde(rename = "type")]
    pub kind: CheckpointKind,
    pub title: String,
    pub sentiment: Sentiment,
}

/// Classification written back onto a stored checkpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Normalization {
    #[serde(flatten)]
    pub classification: Classification,
    pub normalized_at: DateTime<Utc>,
}

/// A canonical, permanently retained scan event.
///
/// Everything except `normalization` is fixed at insert time;
/// `normalization` goes from unset to set exactly once.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoredCheckpoint {
    pub hash: String,

    /// Tracking number the scan was first seen on
    pub tracking_id: String,
    pub carrier: String,
    pub checkpoint_date: DateTime<FixedOffset>,
    pub description: String,
    pub location: String,
    #[serde(default)]
    pub raw_status: Option<String>,
    pub leg: Leg,
    pub first_seen_at: DateTime<Utc>,
    #[serde(default)]
    pub normalization: Option<Normalization>,
}

impl StoredCheckpoint {
    pub fn from_checkpoint(checkpoint: &Checkpoint, tracking_id: &str, seen_at: DateTime<Utc>) -> Self {
        Self {
            hash: checkpoint.content_hash(),
            tracking_id: tracking_id.to_string(),
            carrier: checkpoint.carrier.trim().to_lowercase(),
            checkpoint_date: checkpoint.date,
            description: collapse_whitespace(&checkpoint.raw_description),
            location: checkpoint.location(),
            raw_status: checkpoint.raw_status.clone(),
            leg: checkpoint.leg,
            first_seen_at: seen_at,
            normalization: None,
        }
    }

    pub fn is_normalized(&self) -> bool {
        self.normalization.is_some()
    }
}

/// Counts reported by a checkpoint ingest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StoreSummary {
    pub stored: usize,
    pub skipped: usize,
}

impl StoreSummary {
    pub fn total(&self) -> usize {
        self.stored + self.skipped
    }
}

impl std::ops::AddAssign for StoreSummary {
    fn add_assign(&mut self, other: Self) {
        self.stored += other.stored;
        self.skipped += other.skipped;
    }
}
