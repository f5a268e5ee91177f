// src/error.rs

//! Unified error handling for the risk engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or a request failed outside the provider contract
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// TOML serialization failed
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Row-store failure
    #[error("Store error for {context}: {message}")]
    Store { context: String, message: String },

    /// Tracking provider failure that escaped the lookup state machine
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Summarizer failure
    #[error("Summarizer error: {0}")]
    Summarizer(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a store error with context.
    pub fn store(context: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Store {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Create a summarizer error.
    pub fn summarizer(message: impl fmt::Display) -> Self {
        Self::Summarizer(message.to_string())
    }
}

/// Failure reasons for a single tracking lookup.
///
/// Business errors live here too: they are values the lookup state machine
/// returns, never faults raised past it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// No canonical carrier code could be derived
    #[error("unsupported carrier '{carrier}' for tracking number {tracking_number}")]
    UnsupportedCarrier {
        carrier: String,
        tracking_number: String,
    },

    /// A provider call exceeded its deadline
    #[error("provider timed out after {secs}s during {operation}")]
    Timeout { operation: String, secs: u64 },

    /// The provider answered with a non-success envelope code
    #[error("provider business error {code}: {message}")]
    Business { code: i64, message: String },

    /// The provider could not be reached or answered with a transport failure
    #[error("provider unreachable: {0}")]
    Unreachable(String),

    /// The provider answered with a body that does not fit the envelope contract
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

impl ProviderError {
    /// Whether the next scheduled pass should try this shipment again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Unreachable(_) | Self::Malformed(_)
        )
    }

    /// Short machine-friendly kind, stored as the recheck error prefix.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnsupportedCarrier { .. } => "unsupported_carrier",
            Self::Timeout { .. } => "provider_timeout",
            Self::Business { .. } => "provider_business_error",
            Self::Unreachable(_) => "provider_unreachable",
            Self::Malformed(_) => "malformed_response",
        }
    }

    /// Map a transport error from reqwest onto the taxonomy.
    pub fn from_transport(operation: &str, timeout_secs: u64, error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout {
                operation: operation.to_string(),
                secs: timeout_secs,
            }
        } else if error.is_decode() {
            Self::Malformed(error.to_string())
        } else {
            Self::Unreachable(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_kinds() {
        let timeout = ProviderError::Timeout {
            operation: "get".into(),
            secs: 30,
        };
        assert!(timeout.is_retryable());
        assert!(ProviderError::Unreachable("refused".into()).is_retryable());
        assert!(
            !ProviderError::Business {
                code: 4190,
                message: "invalid".into()
            }
            .is_retryable()
        );
        assert!(
            !ProviderError::UnsupportedCarrier {
                carrier: "Pigeon".into(),
                tracking_number: "X".into()
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_provider_error_converts_into_app_error() {
        let err: AppError = ProviderError::Malformed("missing meta".into()).into();
        assert!(err.to_string().contains("missing meta"));
    }
}
