//! Log output for processes that host a channel.
//!
//! The library crates only emit `tracing` events. Call [`init_logging`] or
//! [`init_from_env`] once at startup to see them.

use std::str::FromStr;

use tracing::level_filters::LevelFilter;

pub const LOG_FORMAT_ENV: &str = "SCRIPTBRIDGE_LOG_FORMAT";
pub const LOG_LEVEL_ENV: &str = "SCRIPTBRIDGE_LOG_LEVEL";

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    #[default]
    Warn,
    Info,
    Debug,
    Trace,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized {kind} {value:?}")]
pub struct ParseLogSettingError {
    kind: &'static str,
    value: String,
}

impl FromStr for LogFormat {
    type Err = ParseLogSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" | "pretty" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            _ => Err(ParseLogSettingError {
                kind: "log format",
                value: s.to_string(),
            }),
        }
    }
}

impl FromStr for LogLevel {
    type Err = ParseLogSettingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "error" => Ok(LogLevel::Error),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "info" => Ok(LogLevel::Info),
            "debug" => Ok(LogLevel::Debug),
            "trace" => Ok(LogLevel::Trace),
            _ => Err(ParseLogSettingError {
                kind: "log level",
                value: s.to_string(),
            }),
        }
    }
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

/// Install a stderr subscriber. Does nothing if one is already installed.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_target(false)
        .with_thread_names(true);

    match format {
        LogFormat::Text => {
            let _ = builder.try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().try_init();
        }
    }
}

/// [`init_logging`] with settings read from `SCRIPTBRIDGE_LOG_FORMAT` and
/// `SCRIPTBRIDGE_LOG_LEVEL`. Unset or unparsable values fall back to text
/// output at `warn`.
pub fn init_from_env() {
    let (format, level) = settings_from(
        std::env::var(LOG_FORMAT_ENV).ok().as_deref(),
        std::env::var(LOG_LEVEL_ENV).ok().as_deref(),
    );
    init_logging(format, level);
}

fn settings_from(format: Option<&str>, level: Option<&str>) -> (LogFormat, LogLevel) {
    let format = format.and_then(|value| value.parse().ok()).unwrap_or_default();
    let level = level.and_then(|value| value.parse().ok()).unwrap_or_default();
    (format, level)
}
