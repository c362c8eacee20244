use std::{sync::Arc, sync::OnceLock};

use chrono::{DateTime, SecondsFormat, Utc};

/// Trait representing a logger that can log messages at various levels.
///
/// This trait should be implemented by any sink that wants to receive the
/// crate's log messages. The binary installs [`StderrLogger`]; tests install a
/// capturing sink.
///
/// # Examples
///
/// ```rust
/// use project_migrate::primitives::logger::{Logger, LogLevel};
///
/// struct MyLogger;
///
/// impl Logger for MyLogger {
///     fn log(&self, level: LogLevel, message: String) {
///         println!("[{:?}] {}", level, message);
///     }
/// }
/// ```
pub trait Logger: Sync + Send {
    /// Logs a message at the specified log level.
    ///
    /// # Arguments
    ///
    /// * `level` - The severity level of the log message.
    /// * `message` - The log message to be recorded.
    fn log(&self, level: LogLevel, message: String);
}

/// Enumeration of possible log levels, ordered from the least to the most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    /// Designates very low priority, often extremely detailed messages.
    Trace,
    /// Designates lower priority debugging information.
    Debug,
    /// Designates informational messages that highlight the progress of the migration.
    Info,
    /// Designates potentially harmful situations.
    Warn,
    /// Designates error events that might still allow the migration to continue running.
    Error,
}

impl LogLevel {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Forwards records of the `log` crate to the installed [`Logger`].
struct ForwardingLogger;

impl log::Log for ForwardingLogger {
    fn enabled(&self, _metadata: &log::Metadata) -> bool {
        true
    }

    fn log(&self, record: &log::Record) {
        let is_record_from_crate = record
            .module_path()
            .is_some_and(|module_path| module_path.starts_with("project_migrate"));

        let is_debug_or_trace_level =
            record.level() == log::Level::Debug || record.level() == log::Level::Trace;

        // Dependencies (reqwest, hyper, rustls) are chatty at debug level.
        if is_debug_or_trace_level && !is_record_from_crate {
            return;
        }

        if let Some(logger) = LOGGER_INSTANCE.get() {
            logger.log(log_level(record.level()), format!("{}", record.args()));
        } else {
            eprintln!("Logger not set: {}", record.args());
        }
    }

    fn flush(&self) {}
}

const fn log_level(level: log::Level) -> LogLevel {
    match level {
        log::Level::Error => LogLevel::Error,
        log::Level::Warn => LogLevel::Warn,
        log::Level::Info => LogLevel::Info,
        log::Level::Debug => LogLevel::Debug,
        log::Level::Trace => LogLevel::Trace,
    }
}

static LOGGER_INSTANCE: OnceLock<Arc<dyn Logger>> = OnceLock::new();

/// Sets the global logger.
///
/// Installs the forwarding `log::Log` implementation and routes every record to
/// `logger`. Only the first call has an effect; later calls return `false`.
pub fn set_logger(logger: Arc<dyn Logger>) -> bool {
    if LOGGER_INSTANCE.set(logger).is_err() {
        eprintln!("Logger already set");
        return false;
    }

    if let Err(e) = init_logger() {
        eprintln!("Failed to set logger: {e}");
        return false;
    }
    true
}

fn init_logger() -> Result<(), log::SetLoggerError> {
    static LOGGER: ForwardingLogger = ForwardingLogger;
    log::set_logger(&LOGGER)?;
    log::set_max_level(log::LevelFilter::Trace);
    Ok(())
}

/// Writes timestamped lines to stderr, the log stream collected by the platform.
#[derive(Debug, Clone, Copy)]
pub struct StderrLogger {
    min_level: LogLevel,
}

impl StderrLogger {
    /// Creates a logger that drops everything below `min_level`.
    #[must_use]
    pub const fn new(min_level: LogLevel) -> Self {
        Self { min_level }
    }
}

impl Logger for StderrLogger {
    fn log(&self, level: LogLevel, message: String) {
        if level < self.min_level {
            return;
        }
        eprintln!("{}", format_line(Utc::now(), level, &message));
    }
}

fn format_line(timestamp: DateTime<Utc>, level: LogLevel, message: &str) -> String {
    format!(
        "{} {} {}",
        timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        level.as_str(),
        message
    )
}

/// Logs a trace-level message with automatic context prefixing
#[macro_export]
macro_rules! trace {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::trace!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::trace!($($arg)*)
        }
    };
}

/// Logs a debug-level message with automatic context prefixing
#[macro_export]
macro_rules! debug {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::debug!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::debug!($($arg)*)
        }
    };
}

/// Logs an info-level message with automatic context prefixing
#[macro_export]
macro_rules! info {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::info!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::info!($($arg)*)
        }
    };
}

/// Logs a warning-level message with automatic context prefixing
#[macro_export]
macro_rules! warn {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::warn!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::warn!($($arg)*)
        }
    };
}

/// Logs an error-level message with automatic context prefixing
#[macro_export]
macro_rules! error {
    ($($arg:tt)*) => {
        if let Some(ctx) = $crate::primitives::logger::get_context() {
            log::error!("{} {}", ctx, format_args!($($arg)*))
        } else {
            log::error!($($arg)*)
        }
    };
}

/// Scoped logging context stored per thread.
pub mod context;
pub use context::{get_context, LogContext};
