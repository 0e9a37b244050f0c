//! Component-scoped logging macros.
//!
//! Each module that uses them declares its own switch and target:
//! ```rust,ignore
//! const ENABLE_LOGS: bool = true;
//! const LOG_TARGET: &str = "roomsense::reaper";
//!
//! use crate::{log_error, log_info, log_warn};
//!
//! log_info!("closed {} stale sessions", count);
//! ```
//! Filtering is then done per component through `RUST_LOG`, e.g.
//! `RUST_LOG=roomsense::fanout=debug`.

/// Info-level record under the calling module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Warn-level record under the calling module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Error-level record under the calling module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Debug-level record under the calling module's `LOG_TARGET`.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!(target: LOG_TARGET, $($arg)*);
        }
    };
}

/// Installs `env_logger`, honouring `RUST_LOG` and defaulting to `info`.
/// Safe to call more than once; later calls are ignored.
pub fn init_logging() {
    let _ = env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .try_init();
}
