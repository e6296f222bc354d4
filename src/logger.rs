use std::fmt;
use std::str::FromStr;

use crate::LoggingOptions;

/// Severity of a log message, and the threshold a [`Logger`] filters on.
///
/// `Off` as a threshold suppresses everything; unknown level names parse to
/// `Off`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Off,
}

impl LogLevel {
    fn rank(self) -> Option<u8> {
        match self {
            Self::Debug => Some(0),
            Self::Info => Some(1),
            Self::Warn => Some(2),
            Self::Error => Some(3),
            Self::Off => None,
        }
    }

    /// Whether a message at `message` passes a threshold of `self`.
    pub fn allows(self, message: LogLevel) -> bool {
        match (self.rank(), message.rank()) {
            (Some(threshold), Some(level)) => level >= threshold,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = std::convert::Infallible;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(match value.trim().to_ascii_lowercase().as_str() {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => Self::Off,
        })
    }
}

/// Gated pass-through of leveled messages to the configured sink.
#[derive(Clone, Debug, Default)]
pub struct Logger {
    options: LoggingOptions,
}

impl Logger {
    pub fn new(options: LoggingOptions) -> Self {
        Self { options }
    }

    pub fn enabled(&self, level: LogLevel) -> bool {
        self.options.enable_logging && self.options.log_level.allows(level)
    }

    pub fn log(&self, level: LogLevel, message: &str) {
        if !self.enabled(level) {
            return;
        }
        match &self.options.log_function {
            Some(sink) => sink(level, message),
            None => emit_default(level, message),
        }
    }

    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, message);
    }

    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, message);
    }
}

fn emit_default(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("[{level}] {message}"),
        LogLevel::Info => tracing::info!("[{level}] {message}"),
        LogLevel::Warn => tracing::warn!("[{level}] {message}"),
        LogLevel::Error => tracing::error!("[{level}] {message}"),
        LogLevel::Off => {}
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::{LogLevel, Logger};
    use crate::LoggingOptions;

    fn capturing(level: LogLevel) -> (Logger, Arc<Mutex<Vec<(LogLevel, String)>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let logger = Logger::new(
            LoggingOptions::enabled(level)
                .with_sink(move |level, message| sink.lock().push((level, message.to_owned()))),
        );
        (logger, seen)
    }

    fn log_all(logger: &Logger) {
        logger.debug("d");
        logger.info("i");
        logger.warn("w");
        logger.error("e");
    }

    #[test]
    fn warn_threshold_suppresses_info() {
        let (logger, seen) = capturing(LogLevel::Warn);
        log_all(&logger);
        assert_eq!(
            *seen.lock(),
            vec![(LogLevel::Warn, "w".to_owned()), (LogLevel::Error, "e".to_owned())]
        );
    }

    #[test]
    fn debug_threshold_passes_everything() {
        let (logger, seen) = capturing(LogLevel::Debug);
        log_all(&logger);
        assert_eq!(seen.lock().len(), 4);
    }

    #[test]
    fn error_threshold_passes_only_errors() {
        let (logger, seen) = capturing(LogLevel::Error);
        log_all(&logger);
        assert_eq!(*seen.lock(), vec![(LogLevel::Error, "e".to_owned())]);
    }

    #[test]
    fn unknown_level_logs_nothing() {
        let level: LogLevel = "verbose".parse().unwrap_or(LogLevel::Debug);
        assert_eq!(level, LogLevel::Off);
        let (logger, seen) = capturing(level);
        log_all(&logger);
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn disabled_logging_is_a_no_op() {
        let seen = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink = Arc::clone(&seen);
        let mut options = LoggingOptions::enabled(LogLevel::Debug)
            .with_sink(move |_, message| sink.lock().push(message.to_owned()));
        options.enable_logging = false;
        Logger::new(options).error("boom");
        assert!(seen.lock().is_empty());
    }

    #[test]
    fn level_names_parse_case_insensitively() {
        assert_eq!("WARN".parse::<LogLevel>().ok(), Some(LogLevel::Warn));
        assert_eq!(" info ".parse::<LogLevel>().ok(), Some(LogLevel::Info));
    }
}
