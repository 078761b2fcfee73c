//! Tracing subscriber setup driven by [`CallConfig`]
//!
//! The configured level applies to the call and SDP crates; everything
//! else logs at `warn`. `RUST_LOG`, when set, replaces the whole filter.

use std::str::FromStr;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{CallConfig, LogFormat};
use crate::errors::{CallError, CallResult};

const CALL_TARGETS: [&str; 2] = ["confcall_call_core", "confcall_sdp_core"];

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> CallResult<Level> {
    Level::from_str(level.trim()).map_err(|_| CallError::config(format!("Invalid log level: {}", level)))
}

/// Filter directives for `config`, e.g. `warn,confcall_call_core=debug,...`
pub fn filter_directives(config: &CallConfig) -> CallResult<String> {
    let level = parse_log_level(&config.log_level)?.as_str().to_ascii_lowercase();
    let mut directives = String::from("warn");
    for target in CALL_TARGETS {
        directives.push_str(&format!(",{target}={level}"));
    }
    Ok(directives)
}

fn env_filter(config: &CallConfig) -> CallResult<EnvFilter> {
    let directives = filter_directives(config)?;
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&directives)
        .map_err(|e| CallError::config(format!("Invalid log filter {}: {}", directives, e)))
}

/// Install the global subscriber described by `config`
///
/// Fails with [`CallError::Configuration`] on a bad level or when a global
/// subscriber is already installed.
pub fn init_logging(config: &CallConfig) -> CallResult<()> {
    let builder = fmt::Subscriber::builder().with_env_filter(env_filter(config)?);
    let installed = match config.log_format {
        LogFormat::Text => builder.with_target(false).try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|e| CallError::config(format!("Failed to install subscriber: {}", e)))?;

    tracing::debug!(level = %config.log_level, format = ?config.log_format, "Call logging ready");
    Ok(())
}
