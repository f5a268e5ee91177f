// src/lib.rs

//! Shipment risk and claims-eligibility engine.
//!
//! Watches in-flight shipments for tracking silence, classifies each as at
//! risk, eligible for a loss claim, or past the claim window, and keeps a
//! deduplicated history of carrier scans.

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
