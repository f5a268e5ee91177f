//! Content hashing for checkpoint deduplication.

use chrono::NaiveDate;
use sha2::{Digest, Sha256};

use crate::utils::normalize_text;

/// Digest identifying one physical carrier scan.
///
/// Only the calendar day of the scan is hashed: the same scan reported on
/// the origin and destination legs carries different sub-day timestamps.
pub fn checkpoint_hash(carrier: &str, day: NaiveDate, description: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(carrier.trim().to_lowercase().as_bytes());
    hasher.update(b"|");
    hasher.update(day.format("%Y-%m-%d").to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(normalize_text(description).as_bytes());
    hasher.update(b"|");
    hasher.update(location.trim().to_lowercase().as_bytes());
    hex::encode(hasher.finalize())
}
