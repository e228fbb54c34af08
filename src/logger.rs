// This file implements the application's logging system.
// It provides macros for different log levels (INFO, WARN, ERROR, DEBUG) that forward to
// `tracing`, and `init` installs the stderr subscriber once at startup.

use std::sync::OnceLock; // Ensures the DEBUG_ENABLED flag is initialized exactly once.
use std::sync::atomic::{AtomicBool, Ordering}; // Thread-safe control of the debug flag.
use tracing::Level;

/// Provides convenient logging macros.
/// `#[macro_export]` makes these macros available from the crate root.

// `log_info!` for general progress and informational messages.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => (::tracing::info!("{}", format!($($arg)*)));
}

// `log_warn!` for non-critical issues or noteworthy conditions.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => (::tracing::warn!("{}", format!($($arg)*)));
}

// `log_error!` for failures requiring attention.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => (::tracing::error!("{}", format!($($arg)*)));
}

// `log_debug!` for detailed internal tracing.
// Messages are only formatted when debug mode is enabled via `is_debug_enabled()`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if $crate::logger::is_debug_enabled() {
            ::tracing::debug!("{}", format!($($arg)*));
        }
    };
}

// Global flag to control debug logging, ensured to be initialized once.
static DEBUG_ENABLED: OnceLock<AtomicBool> = OnceLock::new();

/// Initializes the logger, setting the global debug mode and installing the
/// `tracing-subscriber` formatter on stderr. Stdout stays reserved for tool output.
///
/// # Arguments
/// * `debug`: If `true`, enables debug logging; otherwise, only info, warn, and error messages are printed.
pub fn init(debug: bool) {
    DEBUG_ENABLED
        .get_or_init(|| AtomicBool::new(debug))
        .store(debug, Ordering::Relaxed);

    let max_level = if debug { Level::DEBUG } else { Level::INFO };
    // A subscriber may already be installed (tests, embedding hosts); keep theirs.
    let _ = tracing_subscriber::fmt()
        .with_max_level(max_level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    log_debug!("Logger initialized in DEBUG mode");
}

/// Checks if debug logging is currently enabled.
/// Used primarily by the `log_debug!` macro.
pub fn is_debug_enabled() -> bool {
    DEBUG_ENABLED
        .get()
        .map(|f| f.load(Ordering::Relaxed))
        .unwrap_or(false)
}
