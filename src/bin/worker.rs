//! Shipment risk worker
//!
//! Runs a full cycle on a fixed interval until Ctrl+C. Logs are JSON lines.
//!
//! The storage directory comes from `RISK_STORAGE_DIR` (default `storage`).

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shipment_risk::{config::build_engine, error::Result, models::Config, storage::LocalStorage};

const STORAGE_DIR_ENV: &str = "RISK_STORAGE_DIR";

/// Main entry point for the worker.
#[tokio::main]
async fn main() -> Result<()> {
    let storage_dir = std::env::var(STORAGE_DIR_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("storage"));
    let config_path = storage_dir.join("config.toml");
    let loaded = Config::load(&config_path);

    let level = loaded
        .as_ref()
        .map(|c| c.logging.level.clone())
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    let config = match loaded {
        Ok(config) => config,
        Err(e) => {
            warn!("Config load failed from {}: {}. Using defaults.", config_path.display(), e);
            let mut config = Config::default();
            config.apply_env();
            config
        }
    };
    config.validate()?;

    let engine = build_engine(&config, Arc::new(LocalStorage::new(&storage_dir)))?;

    let period = config.worker.interval();
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        "Risk worker started (storage: {}, interval: {:?})",
        storage_dir.display(),
        period
    );

    let mut cycles: u64 = 0;
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                cycles += 1;
                match engine.run_cycle(Utc::now()).await {
                    Ok(cycle) => {
                        info!(
                            cycle = cycles,
                            determined = cycle.pass.determined,
                            undetermined = cycle.pass.undetermined,
                            paid_calls = cycle.pass.paid_calls,
                            breaker_tripped = cycle.pass.breaker_tripped,
                            "{}",
                            cycle.pass.transitions.summary_line()
                        );
                    }
                    Err(e) => error!(cycle = cycles, "Cycle failed: {}", e),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, stopping worker");
                break;
            }
        }
    }

    info!("Risk worker stopped after {} cycles", cycles);
    Ok(())
}
