//! Checkpoint classification and risk summaries.
//!
//! Summaries are best-effort. The rule-based implementation is deterministic
//! and always available; the HTTP implementation talks to an Ollama-style
//! `/api/generate` endpoint and is wrapped in [`FallbackSummarizer`] so a
//! slow or broken model never blocks a pass.

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::models::{
    CheckpointKind, ClaimEligibilityStatus, Classification, RiskContext, RiskSummary, Sentiment,
    StoredCheckpoint, SummarizerConfig,
};
use crate::utils::collapse_whitespace;
use crate::utils::http::create_async_client;

/// Longest title the rules produce for unrecognized events.
const MAX_TITLE_CHARS: usize = 60;

#[async_trait]
pub trait Summarizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Classify one stored checkpoint.
    async fn classify(&self, checkpoint: &StoredCheckpoint) -> Result<Classification>;

    /// Produce a short narrative for a risk row.
    async fn summarize(&self, context: &RiskContext) -> Result<RiskSummary>;
}

/// Build the summarizer described by the configuration.
pub fn from_config(config: &SummarizerConfig) -> Result<Arc<dyn Summarizer>> {
    if !config.enabled {
        return Ok(Arc::new(RuleSummarizer));
    }
    let http = HttpSummarizer::new(config)?;
    log::info!(
        "Summarizer: {} via {} (rules as fallback)",
        config.model,
        config.endpoint
    );
    Ok(Arc::new(FallbackSummarizer::new(http)))
}

// ============================================================================
// Rules
// ============================================================================

type ClassifyRule = (&'static [&'static str], CheckpointKind, Sentiment, &'static str);

// Order matters: negated delivery must be seen before plain "delivered".
const CLASSIFY_RULES: &[ClassifyRule] = &[
    (
        &["undeliver", "not delivered", "could not be delivered"],
        CheckpointKind::Exception,
        Sentiment::Negative,
        "Delivery problem",
    ),
    (
        &["return to sender", "returned to sender", "returned to shipper", "being returned"],
        CheckpointKind::Returned,
        Sentiment::Negative,
        "Returned to sender",
    ),
    (
        &["delivered"],
        CheckpointKind::Delivered,
        Sentiment::Positive,
        "Delivered",
    ),
    (
        &["out for delivery", "with delivery courier", "on vehicle for delivery"],
        CheckpointKind::OutForDelivery,
        Sentiment::Positive,
        "Out for delivery",
    ),
    (
        &["attempt", "notice left", "no access", "recipient not available"],
        CheckpointKind::DeliveryAttempt,
        Sentiment::Negative,
        "Delivery attempted",
    ),
    (
        &["exception", "delay", "damaged", "held", "unable", "lost", "missent", "incorrect address"],
        CheckpointKind::Exception,
        Sentiment::Negative,
        "Exception",
    ),
    (
        &["customs", "clearance", "import", "export", "duty"],
        CheckpointKind::Customs,
        Sentiment::Neutral,
        "Customs",
    ),
    (
        &["picked up", "accepted", "acceptance", "received by carrier", "origin scan", "dropped off"],
        CheckpointKind::PickedUp,
        Sentiment::Positive,
        "Picked up",
    ),
    (
        &["label", "pre-shipment", "information received", "shipping info", "electronic notification", "awaiting item"],
        CheckpointKind::InfoReceived,
        Sentiment::Neutral,
        "Shipping information received",
    ),
    (
        &["transit", "arrived", "departed", "processed", "facility", "sort", "hub", "forwarded"],
        CheckpointKind::InTransit,
        Sentiment::Neutral,
        "In transit",
    ),
];

/// Deterministic keyword classification and status templates.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSummarizer;

impl RuleSummarizer {
    pub fn classify_text(description: &str) -> Classification {
        let text = description.to_lowercase();
        CLASSIFY_RULES
            .iter()
            .find(|(needles, ..)| needles.iter().any(|n| text.contains(n)))
            .map(|(_, kind, sentiment, title)| Classification {
                kind: *kind,
                title: (*title).to_string(),
                sentiment: *sentiment,
            })
            .unwrap_or_else(|| Classification {
                kind: CheckpointKind::Unknown,
                title: truncate(&collapse_whitespace(description), MAX_TITLE_CHARS),
                sentiment: Sentiment::Neutral,
            })
    }

    pub fn summarize_context(context: &RiskContext) -> RiskSummary {
        let days = context.days_silent.unwrap_or(0);
        let (headline, action, sentiment, confidence) = match context.status {
            ClaimEligibilityStatus::AtRisk => {
                let remaining = context.days_remaining.unwrap_or(0);
                (
                    format!("No carrier scan for {days} days"),
                    format!("Watch; a loss claim opens in {remaining} days"),
                    Sentiment::Neutral,
                    0.6,
                )
            }
            ClaimEligibilityStatus::Eligible => (
                format!("Silent for {days} days; eligible for a loss claim"),
                "File a loss claim before the window closes".to_string(),
                Sentiment::Negative,
                0.9,
            ),
            ClaimEligibilityStatus::MissedWindow => (
                format!("Silent for {days} days; filing window has closed"),
                "No claim can be filed".to_string(),
                Sentiment::Negative,
                0.9,
            ),
            ClaimEligibilityStatus::None => (
                "Shipment is no longer in transit".to_string(),
                "No action needed".to_string(),
                Sentiment::Positive,
                0.8,
            ),
            status => (
                format!("Claim is {status}"),
                "Follow up in the claims workflow".to_string(),
                Sentiment::Neutral,
                0.8,
            ),
        };
        RiskSummary {
            headline,
            action,
            sentiment,
            confidence,
        }
    }
}

#[async_trait]
impl Summarizer for RuleSummarizer {
    fn name(&self) -> &'static str {
        "rules"
    }

    async fn classify(&self, checkpoint: &StoredCheckpoint) -> Result<Classification> {
        Ok(Self::classify_text(&checkpoint.description))
    }

    async fn summarize(&self, context: &RiskContext) -> Result<RiskSummary> {
        Ok(Self::summarize_context(context))
    }
}

// ============================================================================
// HTTP model
// ============================================================================

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: String,
    stream: bool,
    format: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Summarizer backed by an Ollama-style text generation endpoint.
pub struct HttpSummarizer {
    client: reqwest::Client,
    url: String,
    model: String,
}

impl HttpSummarizer {
    pub fn new(config: &SummarizerConfig) -> Result<Self> {
        let client = create_async_client(std::time::Duration::from_secs(config.timeout_secs))?;
        Ok(Self {
            client,
            url: format!("{}/api/generate", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
        })
    }

    async fn generate<T: DeserializeOwned>(&self, prompt: String) -> Result<T> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            format: "json",
        };
        let response = self
            .client
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| AppError::summarizer(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(AppError::summarizer(format!(
                "model endpoint answered HTTP {}",
                response.status()
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| AppError::summarizer(format!("unreadable response: {e}")))?;
        serde_json::from_str(body.response.trim())
            .map_err(|e| AppError::summarizer(format!("model output is not the expected JSON: {e}")))
    }
}

#[async_trait]
impl Summarizer for HttpSummarizer {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn classify(&self, checkpoint: &StoredCheckpoint) -> Result<Classification> {
        let prompt = format!(
            "Classify this parcel tracking event. Reply with JSON only: \
             {{\"type\": one of info_received|picked_up|in_transit|customs|out_for_delivery|\
             delivery_attempt|delivered|exception|returned|unknown, \
             \"title\": short title, \"sentiment\": positive|neutral|negative}}.\n\
             Carrier: {}\nLocation: {}\nEvent: {}",
            checkpoint.carrier, checkpoint.location, checkpoint.description
        );
        self.generate(prompt).await
    }

    async fn summarize(&self, context: &RiskContext) -> Result<RiskSummary> {
        let facts = serde_json::to_string(context)?;
        let prompt = format!(
            "Summarize the loss risk of this shipment for a merchant. Reply with JSON only: \
             {{\"headline\": string, \"action\": string, \
             \"sentiment\": positive|neutral|negative, \"confidence\": number 0-1}}.\n\
             Facts: {facts}"
        );
        let mut summary: RiskSummary = self.generate(prompt).await?;
        summary.confidence = summary.confidence.clamp(0.0, 1.0);
        Ok(summary)
    }
}

// ============================================================================
// Fallback
// ============================================================================

/// Use `primary`, answering from the rules whenever it fails.
pub struct FallbackSummarizer<P> {
    primary: P,
}

impl<P: Summarizer> FallbackSummarizer<P> {
    pub fn new(primary: P) -> Self {
        Self { primary }
    }
}

#[async_trait]
impl<P: Summarizer> Summarizer for FallbackSummarizer<P> {
    fn name(&self) -> &'static str {
        self.primary.name()
    }

    async fn classify(&self, checkpoint: &StoredCheckpoint) -> Result<Classification> {
        match self.primary.classify(checkpoint).await {
            Ok(c) => Ok(c),
            Err(e) => {
                log::warn!("{} classify failed, using rules: {}", self.primary.name(), e);
                Ok(RuleSummarizer::classify_text(&checkpoint.description))
            }
        }
    }

    async fn summarize(&self, context: &RiskContext) -> Result<RiskSummary> {
        match self.primary.summarize(context).await {
            Ok(s) => Ok(s),
            Err(e) => {
                log::warn!("{} summarize failed, using rules: {}", self.primary.name(), e);
                Ok(RuleSummarizer::summarize_context(context))
            }
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::Leg;
    use crate::utils::time::parse_timestamp;

    struct Broken;

    #[async_trait]
    impl Summarizer for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        async fn classify(&self, _: &StoredCheckpoint) -> Result<Classification> {
            Err(AppError::summarizer("down"))
        }

        async fn summarize(&self, _: &RiskContext) -> Result<RiskSummary> {
            Err(AppError::summarizer("down"))
        }
    }

    fn stored(description: &str) -> StoredCheckpoint {
        StoredCheckpoint {
            hash: "h".into(),
            tracking_id: "t".into(),
            carrier: "usps".into(),
            checkpoint_date: parse_timestamp("2025-03-01T10:00:00Z").unwrap(),
            description: description.into(),
            location: "Memphis, TN, US".into(),
            raw_status: None,
            leg: Leg::Origin,
            first_seen_at: Utc::now(),
            normalization: None,
        }
    }

    fn context(status: ClaimEligibilityStatus) -> RiskContext {
        RiskContext {
            tracking_id: "t".into(),
            carrier: "usps".into(),
            status,
            days_silent: Some(12),
            days_remaining: Some(3),
            is_international: false,
            latest_event: None,
        }
    }

    #[test]
    fn test_classify_rules() {
        let kind = |d: &str| RuleSummarizer::classify_text(d).kind;
        assert_eq!(kind("Delivered, Front Door/Porch"), CheckpointKind::Delivered);
        assert_eq!(kind("Undeliverable as Addressed"), CheckpointKind::Exception);
        assert_eq!(kind("Out for Delivery"), CheckpointKind::OutForDelivery);
        assert_eq!(kind("Arrived at USPS Regional Facility"), CheckpointKind::InTransit);
        assert_eq!(kind("Shipping Label Created"), CheckpointKind::InfoReceived);
        assert_eq!(kind("Customs clearance completed"), CheckpointKind::Customs);
        assert_eq!(kind("Return to Sender"), CheckpointKind::Returned);
    }

    #[test]
    fn test_unknown_keeps_short_title() {
        let c = RuleSummarizer::classify_text(&"z".repeat(100));
        assert_eq!(c.kind, CheckpointKind::Unknown);
        assert_eq!(c.title.chars().count(), MAX_TITLE_CHARS + 3);
    }

    #[test]
    fn test_templates_follow_status() {
        let at_risk = RuleSummarizer::summarize_context(&context(ClaimEligibilityStatus::AtRisk));
        assert!(at_risk.action.contains("3 days"));
        let eligible = RuleSummarizer::summarize_context(&context(ClaimEligibilityStatus::Eligible));
        assert_eq!(eligible.sentiment, Sentiment::Negative);
        let filed = RuleSummarizer::summarize_context(&context(ClaimEligibilityStatus::ClaimFiled));
        assert!(filed.headline.contains("claim_filed"));
    }

    #[tokio::test]
    async fn test_fallback_uses_rules() {
        let summarizer = FallbackSummarizer::new(Broken);
        let c = summarizer.classify(&stored("Out for Delivery")).await.unwrap();
        assert_eq!(c.kind, CheckpointKind::OutForDelivery);
        let s = summarizer
            .summarize(&context(ClaimEligibilityStatus::Eligible))
            .await
            .unwrap();
        assert!(s.confidence > 0.0);
    }

    #[tokio::test]
    async fn test_disabled_config_uses_rules() {
        let summarizer = from_config(&SummarizerConfig::default()).unwrap();
        assert_eq!(summarizer.name(), "rules");
    }
}
