//! Logger setup plus module-gated logging macros.
//!
//! A module opts into the macros by declaring its own switch:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_debug, log_info};
//! ```
//! Setting the switch to `false` silences that module without touching
//! `RUST_LOG`, which is handy for the per-second tick paths.

use std::io::Write;

use log::LevelFilter;

/// Env var that lowers the default filter to `debug`.
pub const DEBUG_ENV: &str = "BILLSYNC_DEBUG";

pub fn debug_enabled() -> bool {
    std::env::var(DEBUG_ENV)
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Installs the global `env_logger`. `RUST_LOG` still overrides the default
/// level. Calling it twice is harmless.
pub fn init_logging() {
    let default_level = if debug_enabled() {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let _ = env_logger::Builder::new()
        .filter_level(default_level)
        .parse_default_env()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} {:<5} [{}] {}",
                chrono::Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .try_init();
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Errors are never gated: a module that silences its chatter still
/// reports failures.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        log::error!($($arg)*);
    };
}
