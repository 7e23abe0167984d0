//! Tracing subscriber setup for the binary.

use shared_utils::env::env_var_opt;

/// Environment variable holding an `EnvFilter` directive; wins over the configured level.
pub const LOG_ENV: &str = "CANDLE_SYNC_LOG";

/// Installs the global fmt subscriber, text or JSON.
pub fn init_tracing(log_level: &str, log_format: &str) -> Result<(), String> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(filter_directive(log_level))
        .map_err(|err| format!("invalid log filter: {err}"))?;

    let format = log_format.trim().to_lowercase();
    if format == "json" {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .json()
            .try_init()
            .map_err(|err| format!("tracing already initialized: {err}"))?;
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .try_init()
        .map_err(|err| format!("tracing already initialized: {err}"))
}

/// `LOG_ENV` when set to something non-blank, else the configured level.
fn filter_directive(log_level: &str) -> String {
    env_var_opt(LOG_ENV).unwrap_or_else(|| log_level.to_string())
}
