//! Logger setup plus macros gated on a module-level `ENABLE_LOGS` flag.
//!
//! A module opts in with:
//! ```ignore
//! const ENABLE_LOGS: bool = true;
//! use crate::{log_info, log_warn, log_error};
//! ```

use log::LevelFilter;

/// Set to `1`/`true` to raise the default level to debug.
pub const DEBUG_ENV: &str = "ROLLCALL_DEBUG";

fn debug_requested(value: Option<&str>) -> bool {
    matches!(
        value.map(|v| v.trim().to_ascii_lowercase()).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

pub fn default_level(debug_flag: Option<&str>) -> LevelFilter {
    if debug_requested(debug_flag) {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    }
}

/// Installs env_logger. `RUST_LOG` still wins over the default level.
pub fn init() {
    let debug_flag = std::env::var(DEBUG_ENV).ok();
    let _ = env_logger::Builder::new()
        .filter_level(default_level(debug_flag.as_deref()))
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
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

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}
