mod config;
mod data;
mod execution;
mod monitoring;
mod strategies;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use config::{Config, EnvConfig};
use data::gamma_api::GammaApiClient;
use data::orderbook_api::OrderBookClient;
use data::price_source::{PriceSource, SimulatedQuote};
use execution::monitor::{Monitor, TickOutcome};
use execution::sampler::Sampler;
use execution::scheduler::Scheduler;
use monitoring::heatmap::SvgHeatmap;
use monitoring::logger::ObservationLog;
use monitoring::report::{ReportConfig, Reporter};
use strategies::spread::ObservationBuilder;

/// Samples two venues' "yes" prices on an aligned schedule and logs the spread.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, env = "SPREAD_MONITOR_CONFIG", default_value = "config.toml")]
    config: String,

    /// Evaluate the schedule once and exit (for cron-style triggering)
    #[arg(long)]
    once: bool,

    /// Regenerate the report from the existing log and exit
    #[arg(long, conflicts_with = "once")]
    report: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // .env first so clap sees SPREAD_MONITOR_CONFIG from it
    let env_config = EnvConfig::load();
    let cli = Cli::parse();

    tracing::info!("🚀 Spread monitor starting...");

    tracing::info!("Loading configuration: {}", cli.config);
    let mut config = Config::load(&cli.config)?;
    config.apply_env(&env_config);
    config.validate().context("Invalid configuration")?;

    tracing::info!("Venue A: {} ({})", config.venue_a.market_id, config.venue_a.base_url);
    tracing::info!("Venue B: {} ({})", config.venue_b.market_id, config.venue_b.base_url);
    tracing::info!(
        "Threshold {:.1}% | fee {:.1}% | unit size {}",
        config.strategy.spread_threshold * 100.0,
        config.strategy.fee_rate * 100.0,
        config.strategy.unit_size
    );
    tracing::info!(
        "Schedule: every {}m, window -{}m/+{}m, UTC{}, report {:?}",
        config.schedule.interval_minutes,
        config.schedule.window_before_minutes,
        config.schedule.window_after_minutes,
        config.schedule.utc_offset,
        config.schedule.report_trigger
    );

    let mut monitor = build_monitor(&config)?;

    tracing::info!("Initializing observation log: {}", config.system.log_path.display());
    monitor.prepare().context("Failed to initialize observation log")?;

    if cli.report {
        monitor.report().context("Report generation failed")?;
        return Ok(());
    }

    if cli.once {
        match monitor.tick(Utc::now()).await {
            TickOutcome::Idle => tracing::info!("Outside the alignment window or already sampled, nothing to do"),
            TickOutcome::Sampled { .. } => {}
            TickOutcome::StorageFailed => anyhow::bail!("Sample could not be stored"),
        }
        return Ok(());
    }

    tracing::info!("✅ Monitor initialized, waiting for the next aligned slot...");

    monitor
        .run(Duration::from_secs(config.schedule.tick_secs), async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Cannot listen for Ctrl-C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await;

    tracing::info!("Shutting down...");
    Ok(())
}

fn build_monitor(config: &Config) -> Result<Monitor> {
    let timeout = Duration::from_secs(config.system.http_timeout_secs);

    let venue_a = GammaApiClient::new(
        config.venue_a.base_url.clone(),
        config.venue_a.market_id.clone(),
        timeout,
    )
    .context("Failed to build venue A client")?;
    let venue_b = OrderBookClient::new(
        config.venue_b.base_url.clone(),
        config.venue_b.market_id.clone(),
        timeout,
    )
    .context("Failed to build venue B client")?;

    let sampler = Sampler::new(
        PriceSource::new(Box::new(venue_a), SimulatedQuote::from_config(&config.venue_a)),
        PriceSource::new(Box::new(venue_b), SimulatedQuote::from_config(&config.venue_b)),
        ObservationBuilder::new(config.strategy.clone()),
        ObservationLog::new(config.system.log_path.clone()),
    );

    let reporter = Reporter::new(
        ReportConfig::new(&config.strategy, &config.report),
        config.report.output_dir.clone(),
        Box::new(SvgHeatmap),
    );

    let scheduler = Scheduler::from_config(&config.schedule)?;

    Ok(Monitor::new(scheduler, sampler, reporter))
}
