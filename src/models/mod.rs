// src/models/mod.rs

//! Domain models for the risk engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod checkpoint;
mod config;
mod eligibility;
mod risk;
mod shipment;
mod tracking;

// Re-export all public types
pub use checkpoint::{
    Checkpoint, CheckpointKind, Classification, Leg, Normalization, Sentiment, StoreSummary,
    StoredCheckpoint,
};
pub use config::{
    API_KEY_ENV, CarrierMapping, CircuitBreakerSettings, Config, EligibilityConfig,
    LoggingConfig, NormalizationConfig, ProviderConfig, SelectionConfig, SummarizerConfig,
    WorkerConfig,
};
pub use eligibility::{ClaimEligibilityStatus, EligibilityResult, InactivityClock};
pub use risk::{RecheckCandidate, RiskContext, RiskRecord, RiskSummary, RiskWriteOutcome};
pub use shipment::{
    CandidateCriteria, ClaimRow, ClaimState, ClaimType, ShipmentCandidate, ShipmentRow,
    is_international,
};
pub use tracking::{ProviderCheckpoint, TrackingRecord, TransitLeg};

#[cfg(test)]
pub(crate) mod fixtures {
    pub use super::shipment::fixtures::row;
    pub use super::tracking::fixtures::{scan, silent_for};
}
