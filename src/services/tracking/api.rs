//! Tracking provider transport.
//!
//! The provider answers HTTP 200 for most business errors and reports the
//! real outcome in the envelope's `meta.code`, so every reply is decoded into
//! [`ApiReply`] before the lookup logic sees it.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use crate::error::{ProviderError, Result};
use crate::models::{ProviderConfig, TrackingRecord};
use crate::utils::http::create_keyed_client;

/// Header carrying the static API key.
pub const API_KEY_HEADER: &str = "tracking-api-key";

/// Envelope code: the number is already registered.
pub const CODE_ALREADY_EXISTS: i64 = 4101;

/// Envelope code: the number is not registered.
pub const CODE_NOT_FOUND: i64 = 4102;

/// A decoded envelope: data on success, the code and message otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiReply<T> {
    Ok(T),
    Business { code: i64, message: String },
}

impl<T> ApiReply<T> {
    pub fn is_code(&self, wanted: i64) -> bool {
        matches!(self, Self::Business { code, .. } if *code == wanted)
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    meta: Meta,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct Meta {
    code: i64,
    #[serde(default)]
    message: String,
}

/// Calls the lookup state machine makes against the provider.
#[async_trait]
pub trait TrackingApi: Send + Sync {
    /// Free lookup of already-registered records.
    async fn get_existing(
        &self,
        tracking_number: &str,
        courier_code: Option<&str>,
    ) -> std::result::Result<ApiReply<Vec<TrackingRecord>>, ProviderError>;

    /// Paid registration with an immediate carrier fetch.
    async fn create_realtime(
        &self,
        tracking_number: &str,
        courier_code: &str,
    ) -> std::result::Result<ApiReply<TrackingRecord>, ProviderError>;

    /// Remove a registration by provider id.
    async fn delete(&self, provider_id: &str) -> std::result::Result<ApiReply<()>, ProviderError>;
}

/// reqwest-backed provider transport.
pub struct HttpTrackingApi {
    client: reqwest::Client,
    base_url: Url,
    timeout_secs: u64,
}

impl HttpTrackingApi {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = create_keyed_client(config.timeout(), API_KEY_HEADER, &config.api_key)?;
        Self::with_client(client, &config.base_url, config.timeout())
    }

    pub fn with_client(client: reqwest::Client, base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url = Url::parse(base_url)?;
        Ok(Self {
            client,
            base_url,
            timeout_secs: timeout.as_secs(),
        })
    }

    fn endpoint(&self, path: &str) -> std::result::Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|e| ProviderError::Malformed(format!("bad endpoint {path}: {e}")))
    }

    async fn send<T: DeserializeOwned>(
        &self,
        operation: &str,
        request: reqwest::RequestBuilder,
    ) -> std::result::Result<ApiReply<T>, ProviderError> {
        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::from_transport(operation, self.timeout_secs, e))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(ProviderError::Unreachable(format!(
                "{operation} answered HTTP {status}"
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::from_transport(operation, self.timeout_secs, e))?;
        decode_envelope(operation, &body)
    }
}

#[async_trait]
impl TrackingApi for HttpTrackingApi {
    async fn get_existing(
        &self,
        tracking_number: &str,
        courier_code: Option<&str>,
    ) -> std::result::Result<ApiReply<Vec<TrackingRecord>>, ProviderError> {
        let mut url = self.endpoint("v4/trackings/get")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("tracking_numbers", tracking_number);
            if let Some(code) = courier_code {
                query.append_pair("courier_code", code);
            }
        }
        log::debug!("GET {}", url);
        self.send("get", self.client.get(url)).await
    }

    async fn create_realtime(
        &self,
        tracking_number: &str,
        courier_code: &str,
    ) -> std::result::Result<ApiReply<TrackingRecord>, ProviderError> {
        let url = self.endpoint("v4/trackings/realtime")?;
        let body = json!({
            "tracking_number": tracking_number,
            "courier_code": courier_code,
        });
        log::debug!("POST {} ({} / {})", url, tracking_number, courier_code);
        self.send("create", self.client.post(url).json(&body)).await
    }

    async fn delete(&self, provider_id: &str) -> std::result::Result<ApiReply<()>, ProviderError> {
        let url = self.endpoint(&format!("v4/trackings/delete/{provider_id}"))?;
        log::debug!("DELETE {}", url);
        let reply: ApiReply<Value> = self.send("delete", self.client.delete(url)).await?;
        Ok(match reply {
            ApiReply::Ok(_) => ApiReply::Ok(()),
            ApiReply::Business { code, message } => ApiReply::Business { code, message },
        })
    }
}

/// Decode an envelope body, validating the code before touching `data`.
pub fn decode_envelope<T: DeserializeOwned>(
    operation: &str,
    body: &str,
) -> std::result::Result<ApiReply<T>, ProviderError> {
    let envelope: Envelope = serde_json::from_str(body)
        .map_err(|e| ProviderError::Malformed(format!("{operation}: {e}")))?;

    match envelope.meta.code {
        200 | 201 => serde_json::from_value(envelope.data)
            .map(ApiReply::Ok)
            .map_err(|e| ProviderError::Malformed(format!("{operation} data: {e}"))),
        code => Ok(ApiReply::Business {
            code,
            message: envelope.meta.message,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_success_list() {
        let body = r#"{"meta":{"code":200,"message":"Request response is successful"},
            "data":[{"id":"p1","tracking_number":"1Z1","courier_code":"ups","delivery_status":"transit"}]}"#;
        let reply: ApiReply<Vec<TrackingRecord>> = decode_envelope("get", body).unwrap();
        match reply {
            ApiReply::Ok(list) => {
                assert_eq!(list.len(), 1);
                assert_eq!(list[0].id, "p1");
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_decode_business_code() {
        let body = r#"{"meta":{"code":4101,"message":"Tracking No. already exists."},"data":[]}"#;
        let reply: ApiReply<TrackingRecord> = decode_envelope("create", body).unwrap();
        assert!(reply.is_code(CODE_ALREADY_EXISTS));
    }

    #[test]
    fn test_decode_rejects_bad_shapes() {
        let err = decode_envelope::<TrackingRecord>("create", "<html>").unwrap_err();
        assert_eq!(err.kind(), "malformed_response");

        let body = r#"{"meta":{"code":200,"message":"ok"},"data":"nope"}"#;
        let err = decode_envelope::<TrackingRecord>("create", body).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }
}
