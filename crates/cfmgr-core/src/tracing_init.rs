//! Shared tracing/logging initialization.
//!
//! Logs are written to stderr so command output on stdout stays parseable.
//! `RUST_LOG`, when set, replaces the level-based default filter entirely.

use tracing_subscriber::fmt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Crates whose events the default filter lets through.
pub const LOG_TARGETS: &[&str] = &["cfmgr_core", "cfmgr"];

/// `cfmgr_core=<level>,cfmgr=<level>`
pub fn default_filter(level: &str) -> String {
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Initialise the global tracing subscriber.
///
/// * `log_level` -- level for cfmgr's own crates when `RUST_LOG` is unset.
/// * `log_json` -- emit one JSON object per event instead of text lines.
pub fn init_tracing(log_level: &str, log_json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(log_level)));
    let (json, text) = if log_json {
        (Some(fmt::layer().json().with_writer(std::io::stderr)), None)
    } else {
        (None, Some(fmt::layer().with_writer(std::io::stderr)))
    };
    tracing_subscriber::registry()
        .with(filter)
        .with(json)
        .with(text)
        .init();
}
