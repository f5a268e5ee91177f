// src/config.rs

//! Engine assembly from configuration.
//!
//! Both binaries load a [`Config`], pick a store, and call [`build_engine`].

use std::path::Path;
use std::sync::Arc;

use crate::error::Result;
use crate::models::Config;
use crate::pipeline::{Engine, NormalizationPass, RiskScheduler, ShipmentChecker};
use crate::services::{
    CarrierResolver, EligibilityCalculator, HttpTrackingApi, TrackingApi, TrackingClient,
    summarizer,
};
use crate::storage::ShipmentStore;
use crate::utils::TtlCache;

/// Load, complete from the environment, and validate.
///
/// A missing or unreadable file falls back to defaults; invalid values are an error.
pub fn load_config(path: &Path) -> Result<Config> {
    let config = Config::load_or_default(path);
    config.validate()?;
    Ok(config)
}

/// Wire the production engine: HTTP provider and configured summarizer.
pub fn build_engine(
    config: &Config,
    store: Arc<dyn ShipmentStore>,
) -> Result<Engine<HttpTrackingApi>> {
    if config.provider.api_key.is_empty() {
        log::warn!("No tracking API key configured; provider calls will be rejected");
    }
    let api = HttpTrackingApi::new(&config.provider)?;
    build_engine_with(config, store, api)
}

/// Wire an engine around any provider implementation.
pub fn build_engine_with<A: TrackingApi>(
    config: &Config,
    store: Arc<dyn ShipmentStore>,
    api: A,
) -> Result<Engine<A>> {
    let summarizer = summarizer::from_config(&config.summarizer)?;
    let cache = Arc::new(TtlCache::new(config.provider.cache_ttl()));
    let checker = ShipmentChecker::new(
        Arc::clone(&store),
        TrackingClient::new(api, config.provider.timeout(), cache),
        CarrierResolver::from_config(config),
        EligibilityCalculator::new(config.eligibility),
        Arc::clone(&summarizer),
    );

    Ok(Engine {
        scheduler: RiskScheduler::new(checker, config),
        normalizer: NormalizationPass::new(store, summarizer, config.normalization.clone()),
        normalize_after_pass: config.worker.normalize_after_pass,
    })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::models::fixtures::{row, silent_for};
    use crate::pipeline::check::testing::FakeProvider;
    use crate::storage::MemoryStore;

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config.eligibility.domestic_required_days, 15);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[selection]\nmax_concurrent = 0\n").unwrap();
        assert!(load_config(&path).is_err());
    }

    #[tokio::test]
    async fn test_cycle_runs_pass_and_normalization() {
        let now = Utc::now();
        let mut shipment = row("1", 30, now);
        shipment.tracking_id = "9400111899223344556677".into();
        let store = Arc::new(MemoryStore::new(vec![shipment], Vec::new()));

        let mut config = Config::default();
        config.selection.request_delay_ms = 0;
        config.normalization.batch_delay_ms = 0;
        let provider = FakeProvider::default().with_record(silent_for(20, now));
        let engine = build_engine_with(&config, store.clone(), provider).unwrap();

        let cycle = engine.run_cycle(now).await.unwrap();
        assert_eq!(cycle.pass.determined, 1);
        assert_eq!(cycle.normalization.unwrap().normalized, 1);
        assert_eq!(store.stats().await.unwrap().unnormalized, 0);
    }
}
