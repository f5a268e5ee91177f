//! Tracking provider integration.

mod api;
mod client;

pub use api::{
    API_KEY_HEADER, ApiReply, CODE_ALREADY_EXISTS, CODE_NOT_FOUND, HttpTrackingApi, TrackingApi,
    decode_envelope,
};
pub use client::{Lookup, LookupOutcome, LookupResult, TrackingCache, TrackingClient};
