//! Shipment risk CLI
//!
//! Local execution entry point. For the long-running service, use `risk-worker`.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{Duration, Utc};
use clap::{Parser, Subcommand};
use shipment_risk::{
    config::{build_engine, load_config},
    error::{AppError, ProviderError, Result},
    models::is_international,
    pipeline::CycleSummary,
    services::CarrierResolver,
    storage::{LocalStorage, ShipmentStore},
    utils::time::parse_timestamp,
};

/// Shipment risk - loss watching and claim eligibility
#[derive(Parser, Debug)]
#[command(
    name = "risk-engine",
    version,
    about = "Shipment loss watching and claims-eligibility engine"
)]
struct Cli {
    /// Path to storage directory containing config and tables
    #[arg(short, long, default_value = "storage")]
    storage_dir: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one full pass: new candidates, rechecks, then normalization
    Run {
        /// Skip checkpoint normalization after the pass
        #[arg(long)]
        skip_normalize: bool,

        /// Print the pass summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// Evaluate one tracking number ad hoc without touching the store
    Check {
        tracking_number: String,

        /// Carrier name as the merchant wrote it
        #[arg(long)]
        carrier: Option<String>,

        /// Origin country (ISO alpha-2)
        #[arg(long)]
        origin: Option<String>,

        /// Destination country (ISO alpha-2)
        #[arg(long)]
        destination: Option<String>,

        /// Label date (YYYY-MM-DD or RFC 3339); defaults to now
        #[arg(long)]
        label_date: Option<String>,
    },

    /// Resolve a carrier name and/or tracking number to a carrier code
    Resolve {
        #[arg(long)]
        carrier: Option<String>,

        #[arg(long)]
        tracking_number: Option<String>,
    },

    /// Classify stored checkpoints that have no classification yet
    Normalize,

    /// Show stored checkpoints for a tracking number
    Timeline { tracking_id: String },

    /// Validate configuration
    Validate,

    /// Show store counts
    Info,
}

/// Initialize logging based on verbosity flag.
fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

/// Main entry point for the CLI application.
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config_path = cli.storage_dir.join("config.toml");
    let mut config = load_config(&config_path)?;
    log::debug!("Loaded configuration from {}", config_path.display());

    let storage = Arc::new(LocalStorage::new(&cli.storage_dir));

    match cli.command {
        Command::Run {
            skip_normalize,
            json,
        } => {
            if skip_normalize {
                config.worker.normalize_after_pass = false;
            }
            let engine = build_engine(&config, storage)?;
            let cycle = engine.run_cycle(Utc::now()).await?;
            report_cycle(&cycle, json)?;
        }

        Command::Check {
            tracking_number,
            carrier,
            origin,
            destination,
            label_date,
        } => {
            let label_date = match label_date {
                Some(raw) => parse_timestamp(&raw)
                    .ok_or_else(|| AppError::validation(format!("Unparseable label date: {raw}")))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            let international = is_international(origin.as_deref(), destination.as_deref());

            let engine = build_engine(&config, storage)?;
            let preview = engine
                .scheduler
                .checker()
                .preview(
                    &tracking_number,
                    carrier.as_deref(),
                    international,
                    label_date,
                    Utc::now(),
                )
                .await;

            let Some(resolution) = preview.resolution else {
                return Err(AppError::Provider(ProviderError::UnsupportedCarrier {
                    carrier: carrier.unwrap_or_default(),
                    tracking_number,
                }));
            };
            log::info!("Carrier code: {} (by {:?})", resolution.code, resolution.by);

            if let Some(lookup) = &preview.lookup {
                log::info!(
                    "Lookup: {} ({} paid calls)",
                    lookup.outcome.label(),
                    lookup.paid_calls()
                );
                if let Some(error) = lookup.outcome.error() {
                    log::warn!("Undetermined: {}", error);
                }
            }
            if let Some(result) = &preview.result {
                println!("{}", serde_json::to_string_pretty(result)?);
            }
        }

        Command::Resolve {
            carrier,
            tracking_number,
        } => {
            let resolver = CarrierResolver::from_config(&config);
            match resolver.resolve(carrier.as_deref(), tracking_number.as_deref()) {
                Some(resolution) => {
                    log::info!("{} (by {:?})", resolution.code, resolution.by)
                }
                None => log::warn!("No carrier code for that input"),
            }
        }

        Command::Normalize => {
            let engine = build_engine(&config, storage)?;
            let summary = engine.normalizer.run().await?;
            log::info!(
                "Normalized {} checkpoints ({} failed)",
                summary.normalized,
                summary.failed
            );
        }

        Command::Timeline { tracking_id } => {
            let rows = storage.checkpoints_for_tracking(&tracking_id).await?;
            if rows.is_empty() {
                log::info!("No checkpoints stored for {}", tracking_id);
            }
            for row in &rows {
                let kind = row
                    .normalization
                    .as_ref()
                    .map(|n| n.classification.title.as_str())
                    .unwrap_or("-");
                println!(
                    "{}  {:<11} {:<28} {}  [{}]",
                    row.checkpoint_date.format("%Y-%m-%d %H:%M %:z"),
                    format!("{:?}", row.leg),
                    row.location,
                    row.description,
                    kind
                );
            }
        }

        Command::Validate => {
            log::info!("Validating configuration...");
            // load_config has already validated; report what was accepted.
            log::info!(
                "Thresholds: domestic {}/{} days, international {}/{} days",
                config.eligibility.domestic_required_days,
                config.eligibility.domestic_max_days,
                config.eligibility.international_required_days,
                config.eligibility.international_max_days
            );
            log::info!("Carrier table: {} entries", config.carriers.len());
            log::info!("All validations passed!");
        }

        Command::Info => {
            log::info!("Storage directory: {}", cli.storage_dir.display());
            let stats = storage.stats().await?;
            log::info!(
                "Shipments: {}, claims: {}, tracked: {}",
                stats.shipments,
                stats.claims,
                stats.tracked
            );
            for (status, count) in &stats.by_status {
                log::info!("  {}: {}", status, count);
            }
            log::info!(
                "Checkpoints: {} ({} awaiting normalization)",
                stats.checkpoints,
                stats.unnormalized
            );
            log::info!(
                "Next candidate cutoff: labels before {}",
                (Utc::now() - Duration::days(config.selection.min_label_age_days))
                    .format("%Y-%m-%d")
            );
        }
    }

    Ok(())
}

fn report_cycle(cycle: &CycleSummary, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(cycle)?);
        return Ok(());
    }
    for t in cycle.pass.transitions.newly_eligible() {
        log::info!("Eligible for a loss claim: {} ({})", t.internal_id, t.tracking_id);
    }
    for t in cycle.pass.transitions.newly_missed() {
        log::warn!("Claim window closed: {} ({})", t.internal_id, t.tracking_id);
    }
    if cycle.pass.breaker_tripped {
        log::warn!(
            "{} shipments were left for the next pass after provider failures",
            cycle.pass.skipped
        );
    }
    Ok(())
}
