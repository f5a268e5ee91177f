//! Service layer for the risk engine.
//!
//! This module contains the business logic for:
//! - Carrier code resolution (`CarrierResolver`)
//! - Terminal-status detection (`StatusRules`)
//! - Eligibility calculation (`EligibilityCalculator`)
//! - Tracking provider lookups (`TrackingClient`)
//! - Checkpoint classification and summaries (`Summarizer`)

mod carriers;
mod eligibility;
pub mod status_rules;
pub mod summarizer;
pub mod tracking;

pub use carriers::{CarrierResolver, Resolution, ResolvedBy};
pub use eligibility::{EligibilityCalculator, calculate_eligibility};
pub use status_rules::StatusRules;
pub use summarizer::{FallbackSummarizer, HttpSummarizer, RuleSummarizer, Summarizer};
pub use tracking::{HttpTrackingApi, Lookup, LookupOutcome, TrackingApi, TrackingClient};
