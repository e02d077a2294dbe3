//! File logging for the orchestration core.
//!
//! Log levels:
//! - ERROR: a lifecycle operation or remote call failed for good
//! - WARN: recoverable trouble (retries, best-effort steps that failed)
//! - INFO: lifecycle operations starting and finishing
//! - DEBUG: task scheduling, preconditions, transport decisions
//! - TRACE: per-poll details of the executor
//!
//! Nothing is written until `init` (or `init_at`) has been called, so
//! library users and tests that never initialize logging pay nothing.
//! Debug mode is enabled with `init_with_debug(true)` or
//! `VPN_ORCHESTRATOR_DEBUG=1`.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::config::Config;

const DEBUG_ENV: &str = "VPN_ORCHESTRATOR_DEBUG";

static LOG_PATH: OnceLock<PathBuf> = OnceLock::new();
static LOG_LEVEL: AtomicU8 = AtomicU8::new(LogLevel::Info as u8);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Error = 0,
    Warn = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warn => "WARN",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => LogLevel::Error,
            1 => LogLevel::Warn,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// Initialize logging to `~/.vpn-orchestrator/orchestrator.log`.
pub fn init() {
    init_with_debug(false);
}

/// Initialize logging in the default location, optionally at DEBUG level.
pub fn init_with_debug(debug: bool) {
    if let Ok(path) = Config::log_path() {
        init_at(&path, debug);
    }
}

/// Initialize logging to an explicit file. The file is truncated.
///
/// Only the first call picks the file; later calls still adjust the level.
pub fn init_at(path: &Path, debug: bool) {
    let env_debug = std::env::var(DEBUG_ENV)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false);

    let level = if debug || env_debug {
        LogLevel::Debug
    } else {
        LogLevel::Info
    };
    set_level(level);

    if LOG_PATH.get().is_some() {
        return;
    }
    if let Some(parent) = path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    let _ = std::fs::write(path, "");
    LOG_PATH.set(path.to_path_buf()).ok();
}

pub fn is_debug() -> bool {
    get_level() >= LogLevel::Debug
}

pub fn set_level(level: LogLevel) {
    LOG_LEVEL.store(level as u8, Ordering::SeqCst);
}

pub fn get_level() -> LogLevel {
    LogLevel::from_u8(LOG_LEVEL.load(Ordering::Relaxed))
}

/// Whether a message at `level` would be written.
pub fn enabled(level: LogLevel) -> bool {
    level <= get_level() && LOG_PATH.get().is_some()
}

/// Write one line tagged with `target`, usually the caller's module path.
pub fn write(level: LogLevel, target: &str, msg: &str) {
    if level > get_level() {
        return;
    }
    let Some(path) = LOG_PATH.get() else {
        return;
    };
    let Ok(mut file) = OpenOptions::new().create(true).append(true).open(path) else {
        return;
    };
    let _ = writeln!(file, "{}", format_line(level, target, msg));
}

pub fn log_at(level: LogLevel, msg: &str) {
    write(level, "vpn_orchestrator", msg);
}

fn format_line(level: LogLevel, target: &str, msg: &str) -> String {
    let timestamp = chrono::Local::now().format("%Y-%m-%dT%H:%M:%S%.3f");
    format!("{} {:<5} {}: {}", timestamp, level.as_str(), target, msg)
}

#[doc(hidden)]
#[macro_export]
macro_rules! __olog {
    ($level:expr, $($arg:tt)*) => {
        if $crate::log::enabled($level) {
            $crate::log::write($level, module_path!(), &format!($($arg)*))
        }
    };
}

/// Log at INFO level.
#[macro_export]
macro_rules! olog {
    ($($arg:tt)*) => { $crate::__olog!($crate::log::LogLevel::Info, $($arg)*) };
}

#[macro_export]
macro_rules! olog_error {
    ($($arg:tt)*) => { $crate::__olog!($crate::log::LogLevel::Error, $($arg)*) };
}

#[macro_export]
macro_rules! olog_warn {
    ($($arg:tt)*) => { $crate::__olog!($crate::log::LogLevel::Warn, $($arg)*) };
}

#[macro_export]
macro_rules! olog_debug {
    ($($arg:tt)*) => { $crate::__olog!($crate::log::LogLevel::Debug, $($arg)*) };
}

#[macro_export]
macro_rules! olog_trace {
    ($($arg:tt)*) => { $crate::__olog!($crate::log::LogLevel::Trace, $($arg)*) };
}
