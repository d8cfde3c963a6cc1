//! Centralized logging configuration for the emulator.
//!
//! Components never talk to a logging backend directly. They go through
//! [`log`], which checks a per-category level, applies a rate limit and then
//! hands the message to the `log` crate facade so the host decides where it
//! ends up (the CLI installs `env_logger`).
//!
//! # Architecture
//!
//! - **LogConfig**: Thread-safe global configuration using atomic operations
//! - **LogLevel**: Hierarchical log levels (Off < Error < Warn < Info < Debug < Trace)
//! - **LogCategory**: Logging categories (CPU, Mapper, VDP, PSG, Interrupts, State)
//! - **log()**: Common logging function with lazy message formatting
//!
//! # Usage
//!
//! ```rust
//! use emu_core::logging::{log, LogLevel, LogCategory};
//!
//! // Log with lazy evaluation (zero cost when disabled)
//! log(LogCategory::Mapper, LogLevel::Debug, || {
//!     format!("bank 2 -> {:02X}", 0x05)
//! });
//! ```

use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Log level for controlling verbosity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

/// Returned when a log level name is not recognised
#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown log level '{0}'")]
pub struct UnknownLogLevel(pub String);

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    /// Case-insensitive; numeric levels 0..=5 are accepted too.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "off" | "0" => Ok(LogLevel::Off),
            "error" | "err" | "1" => Ok(LogLevel::Error),
            "warn" | "warning" | "2" => Ok(LogLevel::Warn),
            "info" | "3" => Ok(LogLevel::Info),
            "debug" | "4" => Ok(LogLevel::Debug),
            "trace" | "5" => Ok(LogLevel::Trace),
            _ => Err(UnknownLogLevel(s.to_string())),
        }
    }
}

impl LogLevel {
    fn from_u8(val: u8) -> Self {
        match val {
            1 => LogLevel::Error,
            2 => LogLevel::Warn,
            3 => LogLevel::Info,
            4 => LogLevel::Debug,
            5 => LogLevel::Trace,
            _ => LogLevel::Off,
        }
    }

    /// Matching `log` crate level, `None` for `Off`
    pub fn to_log_level(self) -> Option<::log::Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(::log::Level::Error),
            LogLevel::Warn => Some(::log::Level::Warn),
            LogLevel::Info => Some(::log::Level::Info),
            LogLevel::Debug => Some(::log::Level::Debug),
            LogLevel::Trace => Some(::log::Level::Trace),
        }
    }
}

const CATEGORY_COUNT: usize = 6;

/// Log category for different emulator components
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    /// Processor execution (unimplemented opcodes, interrupt acceptance)
    CPU,
    /// Memory mapper (bank switches, external RAM paging)
    Mapper,
    /// Video processor (register writes, frame delivery)
    VDP,
    /// Sound generator (register writes)
    PSG,
    /// Interrupt line changes
    Interrupts,
    /// Snapshot save/load
    State,
}

impl LogCategory {
    pub const ALL: [LogCategory; CATEGORY_COUNT] = [
        LogCategory::CPU,
        LogCategory::Mapper,
        LogCategory::VDP,
        LogCategory::PSG,
        LogCategory::Interrupts,
        LogCategory::State,
    ];

    fn index(self) -> usize {
        match self {
            LogCategory::CPU => 0,
            LogCategory::Mapper => 1,
            LogCategory::VDP => 2,
            LogCategory::PSG => 3,
            LogCategory::Interrupts => 4,
            LogCategory::State => 5,
        }
    }

    /// Target string handed to the `log` facade
    pub fn target(self) -> &'static str {
        match self {
            LogCategory::CPU => "emu::cpu",
            LogCategory::Mapper => "emu::mapper",
            LogCategory::VDP => "emu::vdp",
            LogCategory::PSG => "emu::psg",
            LogCategory::Interrupts => "emu::interrupts",
            LogCategory::State => "emu::state",
        }
    }
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Per-category state of the sliding window
#[derive(Default)]
struct Window {
    timestamps: VecDeque<Instant>,
    dropped: usize,
    last_drop_report: Option<Instant>,
}

/// Rate limiter for controlling log output frequency per category
///
/// Uses a sliding window algorithm to track log timestamps and enforce
/// a maximum rate of logs per second.
struct RateLimiter {
    max_logs_per_second: AtomicUsize,
    window_duration: Duration,
    windows: Mutex<[Window; CATEGORY_COUNT]>,
}

impl RateLimiter {
    fn new(max_logs_per_second: usize) -> Self {
        Self {
            max_logs_per_second: AtomicUsize::new(max_logs_per_second),
            window_duration: Duration::from_secs(1),
            windows: Mutex::new(Default::default()),
        }
    }

    fn set_max_logs_per_second(&self, max: usize) {
        self.max_logs_per_second.store(max, Ordering::Relaxed);
    }

    fn get_max_logs_per_second(&self) -> usize {
        self.max_logs_per_second.load(Ordering::Relaxed)
    }

    /// Check if a log should be allowed based on rate limits.
    /// Returns (allowed, dropped_count) where dropped_count is Some(n) if drops should be reported
    fn should_allow(&self, category: LogCategory) -> (bool, Option<usize>) {
        let now = Instant::now();
        let mut windows = lock(&self.windows);
        let w = &mut windows[category.index()];

        while let Some(&front) = w.timestamps.front() {
            if now.duration_since(front) > self.window_duration {
                w.timestamps.pop_front();
            } else {
                break;
            }
        }

        if w.timestamps.len() < self.get_max_logs_per_second() {
            w.timestamps.push_back(now);
            if w.dropped > 0 {
                let dropped = std::mem::take(&mut w.dropped);
                w.last_drop_report = Some(now);
                return (true, Some(dropped));
            }
            return (true, None);
        }

        w.dropped += 1;
        let should_report = match w.last_drop_report {
            None => true,
            Some(last) => now.duration_since(last) >= Duration::from_secs(1),
        };
        if should_report {
            let dropped = std::mem::take(&mut w.dropped);
            w.last_drop_report = Some(now);
            (false, Some(dropped))
        } else {
            (false, None)
        }
    }
}

/// Global logging configuration
pub struct LogConfig {
    /// Global log level (applies to all categories unless overridden)
    global_level: AtomicU8,
    /// Category overrides, `Off` meaning "use the global level"
    levels: [AtomicU8; CATEGORY_COUNT],
    rate_limiter: RateLimiter,
}

impl LogConfig {
    /// Create a new LogConfig with all logging disabled and default rate limit (60 logs/second)
    fn new() -> Self {
        Self {
            global_level: AtomicU8::new(LogLevel::Off as u8),
            levels: Default::default(),
            rate_limiter: RateLimiter::new(60),
        }
    }

    /// Get the global singleton instance
    pub fn global() -> &'static Self {
        static INSTANCE: OnceLock<LogConfig> = OnceLock::new();
        INSTANCE.get_or_init(LogConfig::new)
    }

    pub fn set_global_level(&self, level: LogLevel) {
        self.global_level.store(level as u8, Ordering::Relaxed);
    }

    pub fn get_global_level(&self) -> LogLevel {
        LogLevel::from_u8(self.global_level.load(Ordering::Relaxed))
    }

    /// Set log level for a specific category
    pub fn set_level(&self, category: LogCategory, level: LogLevel) {
        self.levels[category.index()].store(level as u8, Ordering::Relaxed);
    }

    /// Get log level for a specific category
    pub fn get_level(&self, category: LogCategory) -> LogLevel {
        LogLevel::from_u8(self.levels[category.index()].load(Ordering::Relaxed))
    }

    /// Most verbose level any category can currently produce
    pub fn max_level(&self) -> LogLevel {
        LogCategory::ALL
            .iter()
            .map(|&c| self.get_level(c))
            .fold(self.get_global_level(), Ord::max)
    }

    /// Check if a message should be logged for the given category and level
    ///
    /// A category with its own level uses it; otherwise the global level applies.
    pub fn should_log(&self, category: LogCategory, level: LogLevel) -> bool {
        if level == LogLevel::Off {
            return false;
        }
        let category_level = self.get_level(category);
        if category_level != LogLevel::Off {
            level <= category_level
        } else {
            level <= self.get_global_level()
        }
    }

    /// Reset all logging to Off
    pub fn reset(&self) {
        self.set_global_level(LogLevel::Off);
        for category in LogCategory::ALL {
            self.set_level(category, LogLevel::Off);
        }
    }

    /// Set the maximum logs per second per category (rate limit)
    pub fn set_rate_limit(&self, max_logs_per_second: usize) {
        self.rate_limiter
            .set_max_logs_per_second(max_logs_per_second);
    }

    pub fn get_rate_limit(&self) -> usize {
        self.rate_limiter.get_max_logs_per_second()
    }
}

fn emit(category: LogCategory, level: LogLevel, message: &str) {
    if let Some(level) = level.to_log_level() {
        ::log::log!(target: category.target(), level, "{}", message);
    }
}

/// Log a message with the specified category and level
///
/// The message is lazily evaluated via a closure, so formatting only occurs
/// when logging is enabled for the given category and level.
///
/// # Rate Limiting
///
/// At most [`LogConfig::get_rate_limit`] messages per second are emitted per
/// category. Dropped messages are summarised in a periodic warning.
///
/// # Examples
///
/// ```rust
/// use emu_core::logging::{log, LogCategory, LogLevel};
///
/// log(LogCategory::VDP, LogLevel::Trace, || {
///     format!("reg {} <- {:02X}", 1, 0x60)
/// });
/// ```
pub fn log<F>(category: LogCategory, level: LogLevel, message_fn: F)
where
    F: FnOnce() -> String,
{
    let config = LogConfig::global();
    if !config.should_log(category, level) {
        return;
    }

    let (allowed, dropped_count) = config.rate_limiter.should_allow(category);
    if let Some(count) = dropped_count.filter(|&n| n > 0) {
        emit(
            category,
            LogLevel::Warn,
            &format!(
                "rate limit exceeded, {} log message(s) dropped in the last second",
                count
            ),
        );
    }

    if allowed {
        emit(category, level, &message_fn());
    }
}
