//! Belief-first prediction market trader - paper-trading CLI.
//!
//! Real market/signal connectors (Polymarket REST, RSS/HN pollers) are out
//! of scope; this binary wires the seven components together around
//! whatever `MarketSource`/`SignalSource` is configured, defaulting to an
//! empty demo source so the architecture runs end to end without a live
//! feed. Real connectors plug in behind the same traits `interfaces.rs`
//! already declares.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use beliefbot_core::audit::{JsonlAuditSink, LoggingNotificationSink, RateLimitedNotificationSink};
use beliefbot_core::calibration::CalibrationMonitor;
use beliefbot_core::classifier::{RawItem, SignalClassifier};
use beliefbot_core::config::Config;
use beliefbot_core::decision::CapitalContext;
use beliefbot_core::interfaces::{AuditEvent, AuditSink, Clock, MarketSource, SignalSource, SystemClock};
use beliefbot_core::memory;
use beliefbot_core::models::{Category, Market};
use beliefbot_core::orchestrator::{AuditChannels, MarketOrchestrator};
use beliefbot_core::paper_tracker::PaperTracker;
use beliefbot_core::settings_actor::SettingsActor;
use beliefbot_core::CoreResult;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "beliefbot", about = "Belief-first prediction market paper trader")]
struct Cli {
    /// Optional TOML config overlay; falls back to built-in defaults and
    /// environment variables (see `Config::load`).
    #[arg(long, env = "BELIEFBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Optional JSON file of seed markets to watch; without one the bot
    /// idles with zero markets (useful for smoke-testing the CLI wiring).
    #[arg(long, env = "BELIEFBOT_MARKETS")]
    markets: Option<PathBuf>,

    /// Run exactly one tick per market then exit, instead of looping on
    /// `poll_interval_ms`.
    #[arg(long)]
    once: bool,
}

/// Loads a static market list once at startup. A real deployment swaps
/// this for a `MarketSource` backed by the Polymarket REST API; this is
/// the in-memory double the spec's Non-goals leave room for.
struct FileMarketSource {
    markets: Vec<Market>,
}

#[async_trait::async_trait]
impl MarketSource for FileMarketSource {
    async fn fetch_markets(&self) -> CoreResult<Vec<Market>> {
        Ok(self.markets.clone())
    }
}

/// Demo `SignalSource` that never produces anything - real RSS/HN/social
/// pollers are out of scope. Swapping this out is the only change needed
/// to go from "architecture demo" to "live paper trader".
struct EmptySignalSource;

#[async_trait::async_trait]
impl SignalSource for EmptySignalSource {
    async fn poll(&self, _market_id: &str) -> CoreResult<Vec<RawItem>> {
        Ok(Vec::new())
    }
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "beliefbot_core=info,beliefbot=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_markets(path: Option<&PathBuf>) -> Result<Vec<Market>> {
    let Some(path) = path else {
        return Ok(Vec::new());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading market list {path:?}"))?;
    let markets: Vec<Market> =
        serde_json::from_str(&text).with_context(|| format!("parsing market list {path:?}"))?;
    Ok(markets)
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    info!("belief-first prediction market trader starting");

    let cfg = Config::load(cli.config.as_deref()).context("loading config")?;
    let markets = load_markets(cli.markets.as_ref())?;
    info!(count = markets.len(), "markets loaded");

    let clock = SystemClock;
    let settings = Arc::new(SettingsActor::new());
    let mut tracker = PaperTracker::load(&cfg).context("loading paper ledger")?;
    let mut calibration = CalibrationMonitor::new(
        cfg.calibration_window,
        cfg.range_coverage_target,
        cfg.range_coverage_tolerance_pp,
        cfg.range_coverage_min_records,
        cfg.bucket_min_records,
        cfg.unknown_density_window,
    );
    let classifier = SignalClassifier::new();
    let signal_source: Box<dyn SignalSource> = Box::new(EmptySignalSource);
    let market_source: Box<dyn MarketSource> = Box::new(FileMarketSource {
        markets: markets.clone(),
    });

    let audit_sink = JsonlAuditSink::new(cfg.audit_log_path.clone());
    let notify_sink =
        RateLimitedNotificationSink::new(LoggingNotificationSink, cfg.notification_rate_per_min);
    let audit = AuditChannels {
        sink: &audit_sink,
        notify: &notify_sink,
    };
    audit_sink
        .record(&AuditEvent::system(
            "system_start",
            format!("{} market(s) loaded", markets.len()),
        ))
        .await
        .ok();

    let capital = CapitalContext {
        capital_usd: cfg.virtual_capital_usd,
        kelly_fraction: cfg.kelly_fraction,
        max_position_pct: cfg.max_position_pct,
        min_position_usd: cfg.min_position_usd,
        max_position_usd: cfg.max_position_size_usd,
    };

    let mut orchestrators: Vec<MarketOrchestrator> = markets
        .iter()
        .map(|m| MarketOrchestrator::new(m.id.clone(), default_keywords(m.category), clock.now()))
        .collect();

    loop {
        let now = clock.now();
        let rss_mb = memory::current_rss_mb();
        memory::report_pressure(rss_mb, &cfg);

        let live_markets = market_source.fetch_markets().await.unwrap_or_else(|e| {
            warn!(error = %e, "market source unavailable this tick");
            markets.clone()
        });

        for orch in orchestrators.iter_mut() {
            let Some(market) = live_markets.iter().find(|m| m.id == orch.market_id) else {
                continue;
            };

            // A market that resolved since the last tick is settled before
            // any further signal ingestion - an open position against a
            // market with no future ticks left has nothing more to ingest.
            if let (Some(_), Some(outcome)) = (market.resolved_at, market.resolution_outcome) {
                match orch
                    .resolve(
                        market,
                        outcome,
                        &mut tracker,
                        &mut calibration,
                        settings.as_ref(),
                        &cfg,
                        &audit,
                        now,
                    )
                    .await
                {
                    Ok(Some(cond)) => {
                        warn!(market_id = %orch.market_id, ?cond, "calibration halt on resolution")
                    }
                    Ok(None) => {}
                    Err(e) => warn!(market_id = %orch.market_id, error = %e, "resolution error"),
                }
                continue;
            }

            let items = signal_source.poll(&orch.market_id).await.unwrap_or_default();

            match orch
                .tick(
                    market,
                    &items,
                    &classifier,
                    &cfg,
                    settings.as_ref(),
                    &mut tracker,
                    &capital,
                    &audit,
                    now,
                )
                .await
            {
                Ok(true) => info!(market_id = %orch.market_id, "trade executed this tick"),
                Ok(false) => {}
                Err(e) => {
                    warn!(market_id = %orch.market_id, error = %e, "tick error");
                    audit_sink
                        .record(&AuditEvent::system("error", e.to_string()))
                        .await
                        .ok();
                }
            }
        }

        let metrics = calibration.metrics();
        info!(
            window = calibration.window_len(),
            range_coverage = metrics.range_coverage,
            unknown_density = metrics.unknown_density,
            "calibration snapshot"
        );
        audit_sink
            .record(&AuditEvent::system(
                "calibration_report",
                format!(
                    "window={} range_coverage={:.3} bucket_accuracy={:.3} edge_effectiveness={:.3} unknown_density={:.3}",
                    calibration.window_len(),
                    metrics.range_coverage,
                    metrics.bucket_accuracy,
                    metrics.edge_effectiveness,
                    metrics.unknown_density,
                ),
            ))
            .await
            .ok();

        if cli.once {
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(cfg.poll_interval_ms)).await;
    }

    Ok(())
}

fn default_keywords(category: Category) -> Vec<String> {
    match category {
        Category::Politics => vec!["election".into(), "vote".into(), "senate".into()],
        Category::Crypto => vec!["bitcoin".into(), "ethereum".into(), "sec".into()],
        Category::Sports => vec!["game".into(), "match".into(), "championship".into()],
        Category::Economics => vec!["fed".into(), "inflation".into(), "rate".into()],
        Category::Entertainment => vec!["award".into(), "release".into()],
        Category::Weather => vec!["storm".into(), "hurricane".into()],
        Category::Technology => vec!["launch".into(), "release".into()],
        Category::World => vec!["treaty".into(), "summit".into()],
        Category::Other => vec![],
    }
}
