//! Application configuration structures.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Environment variable that overrides `provider.api_key`.
pub const API_KEY_ENV: &str = "TRACKING_API_KEY";

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tracking provider connection settings
    #[serde(default)]
    pub provider: ProviderConfig,

    /// Inactivity thresholds
    #[serde(default)]
    pub eligibility: EligibilityConfig,

    /// Candidate selection and batch sizing
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Checkpoint normalization pass
    #[serde(default)]
    pub normalization: NormalizationConfig,

    /// Optional remote summarizer
    #[serde(default)]
    pub summarizer: SummarizerConfig,

    /// Provider failure guard
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerSettings,

    /// Background worker cadence
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Log verbosity
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Carrier name table, evaluated in order
    #[serde(default = "defaults::carriers")]
    pub carriers: Vec<CarrierMapping>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        config.apply_env();
        Ok(config)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            let mut config = Self::default();
            config.apply_env();
            config
        })
    }

    /// Pull secrets from the environment.
    pub fn apply_env(&mut self) {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.provider.api_key = key;
            }
        }
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.provider.base_url.trim().is_empty() {
            return Err(AppError::validation("provider.base_url is empty"));
        }
        url::Url::parse(&self.provider.base_url)?;
        if self.provider.timeout_secs == 0 {
            return Err(AppError::validation("provider.timeout_secs must be > 0"));
        }
        if self.provider.create_cost_usd < 0.0 {
            return Err(AppError::validation(
                "provider.create_cost_usd must not be negative",
            ));
        }

        let e = &self.eligibility;
        if [
            e.domestic_required_days,
            e.domestic_max_days,
            e.international_required_days,
            e.international_max_days,
        ]
        .iter()
        .any(|&days| days < 0)
        {
            return Err(AppError::validation(
                "eligibility thresholds must not be negative",
            ));
        }
        if e.domestic_required_days >= e.domestic_max_days {
            return Err(AppError::validation(
                "eligibility.domestic_required_days must be below domestic_max_days",
            ));
        }
        if e.international_required_days >= e.international_max_days {
            return Err(AppError::validation(
                "eligibility.international_required_days must be below international_max_days",
            ));
        }

        let s = &self.selection;
        if s.new_batch_size == 0 || s.recheck_batch_size == 0 {
            return Err(AppError::validation("selection batch sizes must be > 0"));
        }
        if s.max_concurrent == 0 {
            return Err(AppError::validation("selection.max_concurrent must be > 0"));
        }
        if s.min_label_age_days < 0 {
            return Err(AppError::validation(
                "selection.min_label_age_days must not be negative",
            ));
        }
        if s.in_progress_statuses.is_empty() {
            return Err(AppError::validation(
                "selection.in_progress_statuses is empty",
            ));
        }

        if !(1..=50).contains(&self.normalization.batch_size) {
            return Err(AppError::validation(
                "normalization.batch_size must be between 1 and 50",
            ));
        }
        if self.summarizer.enabled && self.summarizer.endpoint.trim().is_empty() {
            return Err(AppError::validation(
                "summarizer.endpoint is required when the summarizer is enabled",
            ));
        }
        if self.circuit_breaker.max_failure_percent > 100 {
            return Err(AppError::validation(
                "circuit_breaker.max_failure_percent must be <= 100",
            ));
        }
        if self.worker.interval_minutes == 0 {
            return Err(AppError::validation("worker.interval_minutes must be > 0"));
        }
        if self.carriers.is_empty() {
            return Err(AppError::validation("No carriers defined"));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderConfig::default(),
            eligibility: EligibilityConfig::default(),
            selection: SelectionConfig::default(),
            normalization: NormalizationConfig::default(),
            summarizer: SummarizerConfig::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            worker: WorkerConfig::default(),
            logging: LoggingConfig::default(),
            carriers: defaults::carriers(),
        }
    }
}

/// Tracking provider connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// API root, e.g. `https://api.trackingmore.com`
    #[serde(default = "defaults::base_url")]
    pub base_url: String,

    /// Static API key sent with every call
    #[serde(default)]
    pub api_key: String,

    /// Deadline for each provider call in seconds
    #[serde(default = "defaults::provider_timeout")]
    pub timeout_secs: u64,

    /// Billed cost of one realtime create call
    #[serde(default = "defaults::create_cost")]
    pub create_cost_usd: f64,

    /// Lifetime of cached lookups in seconds
    #[serde(default = "defaults::cache_ttl")]
    pub cache_ttl_secs: u64,
}

impl ProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: defaults::base_url(),
            api_key: String::new(),
            timeout_secs: defaults::provider_timeout(),
            create_cost_usd: defaults::create_cost(),
            cache_ttl_secs: defaults::cache_ttl(),
        }
    }
}

/// Carrier-inactivity thresholds in whole days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EligibilityConfig {
    #[serde(default = "defaults::domestic_required")]
    pub domestic_required_days: i64,
    #[serde(default = "defaults::international_required")]
    pub international_required_days: i64,
    #[serde(default = "defaults::domestic_max")]
    pub domestic_max_days: i64,
    #[serde(default = "defaults::international_max")]
    pub international_max_days: i64,
}

impl EligibilityConfig {
    /// Silence needed before a claim may be filed.
    pub fn required_days(&self, is_international: bool) -> i64 {
        if is_international {
            self.international_required_days
        } else {
            self.domestic_required_days
        }
    }

    /// Silence after which the filing window has closed.
    pub fn max_days(&self, is_international: bool) -> i64 {
        if is_international {
            self.international_max_days
        } else {
            self.domestic_max_days
        }
    }
}

impl Default for EligibilityConfig {
    fn default() -> Self {
        Self {
            domestic_required_days: defaults::domestic_required(),
            international_required_days: defaults::international_required(),
            domestic_max_days: defaults::domestic_max(),
            international_max_days: defaults::international_max(),
        }
    }
}

/// Candidate selection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Minimum label age before a shipment is watched
    #[serde(default = "defaults::min_label_age")]
    pub min_label_age_days: i64,

    /// Fulfillment statuses that count as still in progress
    #[serde(default = "defaults::in_progress_statuses")]
    pub in_progress_statuses: Vec<String>,

    /// Maximum new candidates per pass (each may cost one paid lookup)
    #[serde(default = "defaults::new_batch_size")]
    pub new_batch_size: usize,

    /// Maximum rechecks per pass
    #[serde(default = "defaults::recheck_batch_size")]
    pub recheck_batch_size: usize,

    /// Maximum concurrent shipment checks
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Delay between shipment checks in milliseconds
    #[serde(default = "defaults::request_delay")]
    pub request_delay_ms: u64,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            min_label_age_days: defaults::min_label_age(),
            in_progress_statuses: defaults::in_progress_statuses(),
            new_batch_size: defaults::new_batch_size(),
            recheck_batch_size: defaults::recheck_batch_size(),
            max_concurrent: defaults::max_concurrent(),
            request_delay_ms: defaults::request_delay(),
        }
    }
}

/// Checkpoint normalization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NormalizationConfig {
    #[serde(default = "defaults::normalization_batch")]
    pub batch_size: usize,

    /// Pause between batches in milliseconds
    #[serde(default = "defaults::normalization_delay")]
    pub batch_delay_ms: u64,

    /// Upper bound on batches per run
    #[serde(default = "defaults::normalization_max_batches")]
    pub max_batches: usize,
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            batch_size: defaults::normalization_batch(),
            batch_delay_ms: defaults::normalization_delay(),
            max_batches: defaults::normalization_max_batches(),
        }
    }
}

/// Remote summarizer settings. Disabled means rules only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummarizerConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "defaults::summarizer_endpoint")]
    pub endpoint: String,

    #[serde(default = "defaults::summarizer_model")]
    pub model: String,

    #[serde(default = "defaults::summarizer_timeout")]
    pub timeout_secs: u64,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: defaults::summarizer_endpoint(),
            model: defaults::summarizer_model(),
            timeout_secs: defaults::summarizer_timeout(),
        }
    }
}

/// Provider failure guard settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerSettings {
    /// Failure share (0-100) that stops a pass
    #[serde(default = "defaults::max_failure_percent")]
    pub max_failure_percent: u8,

    /// Attempts required before the ratio is judged
    #[serde(default = "defaults::min_baseline")]
    pub min_baseline: usize,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            max_failure_percent: defaults::max_failure_percent(),
            min_baseline: defaults::min_baseline(),
        }
    }
}

/// Background worker settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: u64,

    /// Run the normalization pass after every scheduling pass
    #[serde(default = "defaults::normalize_after_pass")]
    pub normalize_after_pass: bool,
}

impl WorkerConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            interval_minutes: defaults::interval_minutes(),
            normalize_after_pass: defaults::normalize_after_pass(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "defaults::log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::log_level(),
        }
    }
}

/// Mapping from a carrier name fragment to a canonical carrier code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarrierMapping {
    /// Lowercase fragment searched for in the free-text carrier name
    pub pattern: String,

    /// Provider carrier code
    pub code: String,
}

impl CarrierMapping {
    fn new(pattern: &str, code: &str) -> Self {
        Self {
            pattern: pattern.to_string(),
            code: code.to_string(),
        }
    }
}

mod defaults {
    use super::CarrierMapping;

    // Provider defaults
    pub fn base_url() -> String {
        "https://api.trackingmore.com".into()
    }
    pub fn provider_timeout() -> u64 {
        30
    }
    pub fn create_cost() -> f64 {
        0.04
    }
    pub fn cache_ttl() -> u64 {
        300
    }

    // Eligibility defaults
    pub fn domestic_required() -> i64 {
        15
    }
    pub fn international_required() -> i64 {
        20
    }
    pub fn domestic_max() -> i64 {
        45
    }
    pub fn international_max() -> i64 {
        50
    }

    // Selection defaults
    pub fn min_label_age() -> i64 {
        15
    }
    pub fn in_progress_statuses() -> Vec<String> {
        vec![
            "label_created".into(),
            "shipped".into(),
            "in_transit".into(),
            "out_for_delivery".into(),
            "exception".into(),
        ]
    }
    pub fn new_batch_size() -> usize {
        50
    }
    pub fn recheck_batch_size() -> usize {
        100
    }
    pub fn max_concurrent() -> usize {
        5
    }
    pub fn request_delay() -> u64 {
        100
    }

    // Normalization defaults
    pub fn normalization_batch() -> usize {
        25
    }
    pub fn normalization_delay() -> u64 {
        1000
    }
    pub fn normalization_max_batches() -> usize {
        20
    }

    // Summarizer defaults
    pub fn summarizer_endpoint() -> String {
        "http://localhost:11434".into()
    }
    pub fn summarizer_model() -> String {
        "llama3".into()
    }
    pub fn summarizer_timeout() -> u64 {
        20
    }

    // Circuit breaker defaults
    pub fn max_failure_percent() -> u8 {
        50
    }
    pub fn min_baseline() -> usize {
        5
    }

    // Worker defaults
    pub fn interval_minutes() -> u64 {
        60
    }
    pub fn normalize_after_pass() -> bool {
        true
    }

    pub fn log_level() -> String {
        "info".into()
    }

    // Longer, more specific names come before the fragments they contain.
    pub fn carriers() -> Vec<CarrierMapping> {
        vec![
            CarrierMapping::new("dhl ecommerce", "dhlglobalmail"),
            CarrierMapping::new("dhl", "dhl"),
            CarrierMapping::new("fedex", "fedex"),
            CarrierMapping::new("federal express", "fedex"),
            CarrierMapping::new("usps", "usps"),
            CarrierMapping::new("postal service", "usps"),
            CarrierMapping::new("ups mail innovations", "ups-mi"),
            CarrierMapping::new("ups", "ups"),
            CarrierMapping::new("united parcel", "ups"),
            CarrierMapping::new("canada post", "canada-post"),
            CarrierMapping::new("royal mail", "royal-mail"),
            CarrierMapping::new("australia post", "australia-post"),
            CarrierMapping::new("purolator", "purolator"),
            CarrierMapping::new("ontrac", "ontrac"),
        ]
    }

    pub fn log_level_is_known(level: &str) -> bool {
        matches!(
            level.to_lowercase().as_str(),
            "trace" | "debug" | "info" | "warn" | "error"
        )
    }
}

impl LoggingConfig {
    /// Whether the configured level is one `log` understands.
    pub fn is_known_level(&self) -> bool {
        defaults::log_level_is_known(&self.level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_default_config_ok() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = Config::default();
        config.provider.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut config = Config::default();
        config.eligibility.domestic_required_days = 45;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_negative_days() {
        let mut config = Config::default();
        config.eligibility.domestic_required_days = -1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.eligibility.international_required_days = -20;
        config.eligibility.international_max_days = -5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.selection.min_label_age_days = -1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_equal_required_and_max_days() {
        let mut config = Config::default();
        config.eligibility.international_max_days = config.eligibility.international_required_days;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_oversized_normalization_batch() {
        let mut config = Config::default();
        config.normalization.batch_size = 51;
        assert!(config.validate().is_err());
    }

    #[test]
    fn thresholds_follow_international_flag() {
        let e = EligibilityConfig::default();
        assert_eq!(e.required_days(false), 15);
        assert_eq!(e.max_days(false), 45);
        assert_eq!(e.required_days(true), 20);
        assert_eq!(e.max_days(true), 50);
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            [provider]
            timeout_secs = 10

            [selection]
            max_concurrent = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.provider.timeout_secs, 10);
        assert_eq!(config.provider.cache_ttl_secs, 300);
        assert_eq!(config.selection.max_concurrent, 2);
        assert_eq!(config.selection.min_label_age_days, 15);
        assert!(!config.carriers.is_empty());
        assert!(config.logging.is_known_level());
    }
}
