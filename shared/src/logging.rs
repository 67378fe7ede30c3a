//! Shared logging utilities for consistent tracing across the harness
//!
//! Harness diagnostics (spawns, barriers, terminations) go through `tracing`.
//! Child process output is not logged here; it is classified and handed to an
//! output sink instead.

use chrono::{DateTime, Utc};
use tracing::info;

use crate::types::ProcessKey;

/// Build the filter directive for a base level
pub fn filter_directive(log_level: Option<&str>) -> String {
    let base_level = log_level.unwrap_or("info");
    format!("harness={base_level},shared={base_level}")
}

/// Initialize the stdout tracing subscriber with an optional log level
///
/// Safe to call more than once; later calls are ignored.
pub fn init_tracing(log_level: Option<&str>) {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = filter_directive(log_level);

    let _ = fmt()
        .with_env_filter(EnvFilter::new(&env_filter))
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Utc> = Utc::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for process-aware info logging
#[macro_export]
macro_rules! process_info {
    ($process:expr, $($arg:tt)*) => {
        tracing::info!(
            process = %$process,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware warning logging
#[macro_export]
macro_rules! process_warn {
    ($process:expr, $($arg:tt)*) => {
        tracing::warn!(
            process = %$process,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware error logging
#[macro_export]
macro_rules! process_error {
    ($process:expr, $($arg:tt)*) => {
        tracing::error!(
            process = %$process,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Macro for process-aware debug logging
#[macro_export]
macro_rules! process_debug {
    ($process:expr, $($arg:tt)*) => {
        tracing::debug!(
            process = %$process,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        );
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(process: &ProcessKey, details: &str) {
    info!(
        process = %process,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(process: &ProcessKey, reason: &str) {
    info!(
        process = %process,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}
