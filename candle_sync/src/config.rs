//! Sync configuration: parsing, normalization, and loading.
//!
//! A TOML file names the database, the instruments and timeframes to keep in sync,
//! the quote-source bridge, and the tuning knobs for live syncing, backfill, retries
//! and logging. Secrets never live here: the bridge password is read from the
//! environment by the provider.
//!
//! Key behaviors:
//! - Normalization trims symbols and timeframe labels, drops empty entries, and
//!   de-duplicates while preserving order. Timeframe labels are upper-cased; symbols keep
//!   their case, since terminals tell `EURUSDm` and `EURUSDM` apart.
//! - Timeframe labels are *not* validated here; unknown labels are skipped with a
//!   warning when the scheduler plans its series, so one typo never stops the run.
//! - `DATABASE_URL` in the environment overrides `database_url`.
//!
//! Entrypoints:
//! - Parse + normalize from a TOML string: [`load_config_str`]
//! - Parse + normalize from a file path: [`load_config_path`]

use std::{mem, path::Path, time::Duration};

use anyhow::{Context, bail};
use indexmap::IndexSet;
use market_data_ingestor::providers::bridge_rest::BridgeConfig;
use serde::{Deserialize, Serialize};
use shared_utils::env::env_var_opt;

use crate::{
    schedule::retry::RetryPolicy,
    sync::{ReconcileOptions, window::DuplicatePolicy},
};

/// Environment override for [`SyncConfig::database_url`].
pub const DATABASE_URL_ENV: &str = "DATABASE_URL";

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SyncConfig {
    /// SQLite path or `sqlite:` URL.
    pub database_url: String,
    /// Instruments to sync, e.g. `["EURUSD", "XAUUSD"]`.
    pub symbols: Vec<String>,
    /// Granularity labels, e.g. `["M1", "H1"]`.
    pub timeframes: Vec<String>,
    /// Quote-source bridge.
    #[serde(default)]
    pub source: BridgeConfig,
    /// Continuous sync tuning.
    #[serde(default)]
    pub live: LiveCfg,
    /// Historical load tuning.
    #[serde(default)]
    pub backfill: BackfillCfg,
    /// Backoff for failing pairs.
    #[serde(default)]
    pub retry: RetryCfg,
    /// Log output.
    #[serde(default)]
    pub logging: LoggingCfg,
}

/// `[live]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LiveCfg {
    /// Bars fetched per pair per cycle.
    pub window_size: usize,
    /// Bound on activation plus fetch for one pair.
    pub fetch_timeout_ms: u64,
    /// Handling of repeated open times within one fetch.
    pub duplicate_policy: DuplicatePolicy,
    /// Emit aggregate statistics every N cycles (0 disables).
    pub stats_every: u64,
}

impl Default for LiveCfg {
    fn default() -> Self {
        Self {
            window_size: 1000,
            fetch_timeout_ms: 15_000,
            duplicate_policy: DuplicatePolicy::default(),
            stats_every: 10,
        }
    }
}

/// `[backfill]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct BackfillCfg {
    /// Bars requested per pair.
    pub window_size: usize,
    /// Bound on activation plus fetch for one pair.
    pub fetch_timeout_ms: u64,
    /// Pause between pairs.
    pub pause_ms: u64,
}

impl Default for BackfillCfg {
    fn default() -> Self {
        Self {
            window_size: 99_999,
            fetch_timeout_ms: 120_000,
            pause_ms: 1000,
        }
    }
}

/// `[retry]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct RetryCfg {
    /// Give up on a pair after this many consecutive failures; 0 retries forever.
    pub max_consecutive_failures: u32,
    /// Delay after the first failure.
    pub initial_backoff_ms: u64,
    /// Cap on the doubling delay.
    pub max_backoff_ms: u64,
}

impl Default for RetryCfg {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 0,
            initial_backoff_ms: 1000,
            max_backoff_ms: 60_000,
        }
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingCfg {
    /// Default filter directive when `CANDLE_SYNC_LOG` is unset or blank.
    pub level: String,
    /// `"text"` or `"json"`.
    pub format: String,
}

impl Default for LoggingCfg {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

impl SyncConfig {
    /// Reconciler settings for live syncing.
    pub fn live_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            window_size: self.live.window_size,
            fetch_timeout: Duration::from_millis(self.live.fetch_timeout_ms),
            duplicate_policy: self.live.duplicate_policy,
        }
    }

    /// Reconciler settings for backfill.
    pub fn backfill_options(&self) -> ReconcileOptions {
        ReconcileOptions {
            window_size: self.backfill.window_size,
            fetch_timeout: Duration::from_millis(self.backfill.fetch_timeout_ms),
            duplicate_policy: self.live.duplicate_policy,
        }
    }

    /// Retry policy for the scheduler.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_consecutive_failures: (self.retry.max_consecutive_failures > 0)
                .then_some(self.retry.max_consecutive_failures),
            initial_backoff: Duration::from_millis(self.retry.initial_backoff_ms),
            max_backoff: Duration::from_millis(self.retry.max_backoff_ms),
        }
    }
}

/// Summary of changes performed during normalization.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NormalizationReport {
    /// Symbols whose spelling changed (surrounding whitespace).
    pub symbols_renamed: usize,
    /// Duplicate or empty symbols removed.
    pub symbols_dropped: usize,
    /// Duplicate or empty timeframe labels removed.
    pub timeframes_dropped: usize,
}

fn normalize_list(list: &mut Vec<String>, canonical: fn(&str) -> String) -> (usize, usize) {
    let mut renamed = 0;
    let mut seen: IndexSet<String> = IndexSet::new();
    let before = list.len();
    for raw in mem::take(list) {
        let v = canonical(raw.trim());
        if v != raw {
            renamed += 1;
        }
        if !v.is_empty() {
            seen.insert(v);
        }
    }
    *list = seen.into_iter().collect();
    (renamed, before - list.len())
}

/// Normalize a config in-place.
///
/// Errors when no symbols or no timeframes remain, when a window size or fetch timeout
/// is zero, or when the backoff bounds are inverted.
pub fn normalize_config(cfg: &mut SyncConfig) -> anyhow::Result<NormalizationReport> {
    let mut report = NormalizationReport::default();

    cfg.database_url = cfg.database_url.trim().to_string();
    if cfg.database_url.is_empty() {
        bail!("database_url cannot be empty");
    }

    let (renamed, dropped) = normalize_list(&mut cfg.symbols, |s| s.to_string());
    report.symbols_renamed = renamed;
    report.symbols_dropped = dropped;
    if cfg.symbols.is_empty() {
        bail!("at least one symbol must be configured");
    }

    let (_, dropped) = normalize_list(&mut cfg.timeframes, |s| s.to_uppercase());
    report.timeframes_dropped = dropped;
    if cfg.timeframes.is_empty() {
        bail!("at least one timeframe must be configured");
    }

    if cfg.live.window_size == 0 || cfg.backfill.window_size == 0 {
        bail!("window_size must be at least 1");
    }
    if cfg.live.fetch_timeout_ms == 0 || cfg.backfill.fetch_timeout_ms == 0 {
        bail!("fetch_timeout_ms must be at least 1");
    }
    if cfg.retry.initial_backoff_ms > cfg.retry.max_backoff_ms {
        bail!(
            "retry.initial_backoff_ms ({}) exceeds retry.max_backoff_ms ({})",
            cfg.retry.initial_backoff_ms,
            cfg.retry.max_backoff_ms
        );
    }

    Ok(report)
}

/// Parse + normalize from a TOML string. Applies the `DATABASE_URL` override.
pub fn load_config_str(s: &str) -> anyhow::Result<SyncConfig> {
    let mut cfg: SyncConfig = toml::from_str(s).context("parsing config TOML")?;
    if let Some(url) = env_var_opt(DATABASE_URL_ENV) {
        cfg.database_url = url;
    }
    let report = normalize_config(&mut cfg)?;
    if report != NormalizationReport::default() {
        tracing::debug!(?report, "normalized config");
    }
    Ok(cfg)
}

/// Parse + normalize from a file path.
pub fn load_config_path<P: AsRef<Path>>(p: P) -> anyhow::Result<SyncConfig> {
    let path = p.as_ref();
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading config file {}", path.display()))?;
    load_config_str(&s).with_context(|| format!("loading config file {}", path.display()))
}
