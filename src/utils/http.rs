// src/utils/http.rs

//! HTTP client utilities.

use std::time::Duration;

use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::error::{AppError, Result};

/// User-Agent sent with every outbound request.
pub const USER_AGENT: &str = concat!("shipment-risk/", env!("CARGO_PKG_VERSION"));

/// Create an asynchronous HTTP client with a hard per-request timeout.
pub fn create_async_client(timeout: Duration) -> Result<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?;
    Ok(client)
}

/// Create a client that sends a static API-key header on every call.
pub fn create_keyed_client(
    timeout: Duration,
    header_name: &'static str,
    api_key: &str,
) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let mut key = HeaderValue::from_str(api_key)
        .map_err(|e| AppError::config(format!("API key is not a valid header value: {e}")))?;
    key.set_sensitive(true);
    headers.insert(HeaderName::from_static(header_name), key);
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

    let client = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .default_headers(headers)
        .build()?;
    Ok(client)
}
