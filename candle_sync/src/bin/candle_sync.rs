use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::{Context, Result, bail};
use candle_sync::{
    completion::SystemClock,
    config::{SyncConfig, load_config_path},
    db::migrate,
    schedule::{SchedulerConfig, Scheduler, plan_series, run_backfill},
    series::SeriesKey,
    store::{
        query::{CandleQuery, OhlcColumns, database_info, list_series, load_candles},
        sqlite::SqliteStore,
    },
    sync::Reconciler,
    telemetry,
};
use chrono::DateTime;
use clap::{Args, Parser, Subcommand};
use market_data_ingestor::providers::bridge_rest::BridgeRestProvider;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about = "Keeps candle series in SQLite in sync with a trading terminal")]
struct Cli {
    /// Configuration file.
    #[arg(long, short, value_name = "FILE", default_value = "candle_sync.toml", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Apply pending schema migrations.
    Migrate,
    /// Poll the terminal and keep every configured series reconciled until SIGINT/SIGTERM.
    Live,
    /// One-shot historical load of every configured series (append-only).
    Backfill,
    /// Summarize what is stored.
    Info,
    /// Print stored candles of one series as JSON.
    Candles(CandlesArgs),
}

#[derive(Args)]
struct CandlesArgs {
    #[arg(long)]
    symbol: String,
    #[arg(long)]
    timeframe: String,
    /// Lower bound on open time (epoch seconds or RFC 3339).
    #[arg(long)]
    start: Option<String>,
    /// Upper bound on open time (epoch seconds or RFC 3339).
    #[arg(long)]
    end: Option<String>,
    #[arg(long)]
    limit: Option<i64>,
    /// Skip the forming bar.
    #[arg(long)]
    completed_only: bool,
    /// Column-oriented chart output (t in ms, o, h, l, c, v).
    #[arg(long)]
    ohlc: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let cfg = load_config_path(&cli.config)?;
    telemetry::init_tracing(&cfg.logging.level, &cfg.logging.format).map_err(anyhow::Error::msg)?;

    match cli.cmd {
        Cmd::Migrate => {
            let applied = migrate::run_all(&cfg.database_url)?;
            info!(applied, database = %cfg.database_url, "migrations done");
        }
        Cmd::Live => live(&cfg).await?,
        Cmd::Backfill => backfill(&cfg).await?,
        Cmd::Info => {
            let mut store = SqliteStore::open(&cfg.database_url)?;
            let conn = store.connection();
            let out = json!({
                "database": database_info(conn)?,
                "series": list_series(conn)?,
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        Cmd::Candles(args) => candles(&cfg, args)?,
    }

    Ok(())
}

async fn connect_source(cfg: &SyncConfig) -> Result<BridgeRestProvider> {
    let provider = BridgeRestProvider::new(&cfg.source).context("creating quote source")?;
    provider
        .connect()
        .await
        .context("connecting to trading terminal")?;
    Ok(provider)
}

async fn live(cfg: &SyncConfig) -> Result<()> {
    let plan = plan_series(&cfg.symbols, &cfg.timeframes);
    if plan.series.is_empty() {
        bail!("no usable symbol/timeframe pairs (skipped: {:?})", plan.skipped);
    }

    let store = SqliteStore::open(&cfg.database_url).context("opening candle store")?;
    let source = connect_source(cfg).await?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let reconciler = Reconciler::new(
        Arc::new(source),
        store,
        Arc::new(SystemClock),
        cfg.live_options(),
    );
    let mut sched_cfg = SchedulerConfig::for_granularities(&plan.granularities);
    sched_cfg.stats_every = cfg.live.stats_every;
    sched_cfg.retry = cfg.retry_policy();

    let mut scheduler = Scheduler::new(reconciler, plan.series, sched_cfg);
    let stats = scheduler.run(cancel).await;
    info!(
        cycles = stats.cycles,
        total_updates = stats.total_updates,
        avg_cycle = ?stats.avg_cycle_time(),
        "live sync finished"
    );
    Ok(())
}

async fn backfill(cfg: &SyncConfig) -> Result<()> {
    let plan = plan_series(&cfg.symbols, &cfg.timeframes);
    if plan.series.is_empty() {
        bail!("no usable symbol/timeframe pairs (skipped: {:?})", plan.skipped);
    }

    let store = SqliteStore::open(&cfg.database_url).context("opening candle store")?;
    let source = connect_source(cfg).await?;

    let cancel = CancellationToken::new();
    spawn_shutdown_listener(cancel.clone());

    let mut reconciler =
        Reconciler::new(Arc::new(source), store, Arc::new(SystemClock), cfg.backfill_options());
    let summary = run_backfill(
        &mut reconciler,
        &plan.series,
        Duration::from_millis(cfg.backfill.pause_ms),
        &cancel,
    )
    .await;

    for p in &summary.pairs {
        match &p.error {
            None => println!("{}: fetched {}, inserted {}", p.series, p.fetched, p.inserted),
            Some(e) => println!("{}: FAILED: {e}", p.series),
        }
    }
    println!(
        "total inserted: {} ({} of {} pairs failed)",
        summary.total_inserted(),
        summary.failed(),
        summary.pairs.len()
    );
    Ok(())
}

fn candles(cfg: &SyncConfig, args: CandlesArgs) -> Result<()> {
    let series = SeriesKey::parse(args.symbol.trim(), &args.timeframe.trim().to_uppercase())?;
    let query = CandleQuery {
        start: args.start.as_deref().map(parse_time).transpose()?,
        end: args.end.as_deref().map(parse_time).transpose()?,
        limit: args.limit,
        completed_only: args.completed_only,
    };

    let mut store = SqliteStore::open(&cfg.database_url)?;
    let rows = load_candles(store.connection(), &series, &query)?;
    let out = if args.ohlc {
        serde_json::to_string_pretty(&OhlcColumns::from_rows(&rows))?
    } else {
        serde_json::to_string_pretty(&rows)?
    };
    println!("{out}");
    Ok(())
}

/// Epoch seconds or RFC 3339.
fn parse_time(s: &str) -> Result<i64> {
    if let Ok(secs) = s.trim().parse::<i64>() {
        return Ok(secs);
    }
    let dt = DateTime::parse_from_rfc3339(s.trim()).with_context(|| format!("bad timestamp: {s}"))?;
    Ok(dt.timestamp())
}

fn spawn_shutdown_listener(cancel: CancellationToken) {
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        info!("shutdown requested; finishing the current cycle");
        cancel.cancel();
    });
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "cannot listen for SIGTERM; only Ctrl-C will stop the process");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
