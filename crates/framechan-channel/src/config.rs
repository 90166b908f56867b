use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Threshold for the channel's own log output.
///
/// Independent of the global `tracing` subscriber: a channel built with
/// `LogLevel::Error` stays quiet about anything milder even when the
/// subscriber would accept it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
    Off,
}

impl LogLevel {
    /// Whether an event at `level` should be emitted.
    pub fn enables(self, level: tracing::Level) -> bool {
        self <= Self::from(level)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
            Self::Off => "off",
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        if level == tracing::Level::TRACE {
            Self::Trace
        } else if level == tracing::Level::DEBUG {
            Self::Debug
        } else if level == tracing::Level::INFO {
            Self::Info
        } else if level == tracing::Level::WARN {
            Self::Warn
        } else {
            Self::Error
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "off" | "none" => Ok(Self::Off),
            other => Err(format!("unknown log level: {other}")),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Channel configuration. Fixed for the lifetime of the channel.
#[derive(Debug, Clone, Default)]
pub struct ChannelConfig {
    /// Threshold for failure reports. Default: warn.
    pub log_level: LogLevel,
    /// Upper bound for a single `wait` call. Default: none (wait until
    /// readable or destroyed).
    pub wait_timeout: Option<Duration>,
}

impl ChannelConfig {
    pub fn with_log_level(mut self, log_level: LogLevel) -> Self {
        self.log_level = log_level;
        self
    }

    pub fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = Some(timeout);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn threshold_filters_milder_levels() {
        assert!(LogLevel::Warn.enables(tracing::Level::ERROR));
        assert!(LogLevel::Warn.enables(tracing::Level::WARN));
        assert!(!LogLevel::Warn.enables(tracing::Level::DEBUG));
        assert!(LogLevel::Trace.enables(tracing::Level::TRACE));
        assert!(!LogLevel::Off.enables(tracing::Level::ERROR));
    }

    #[test]
    fn parses_level_names() {
        assert_eq!("debug".parse::<LogLevel>().unwrap(), LogLevel::Debug);
        assert_eq!(" WARNING ".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("off".parse::<LogLevel>().unwrap(), LogLevel::Off);
        assert!("loud".parse::<LogLevel>().is_err());
    }

    #[test]
    fn default_config_waits_indefinitely() {
        let config = ChannelConfig::default();
        assert_eq!(config.log_level, LogLevel::Warn);
        assert!(config.wait_timeout.is_none());

        let config = config.with_wait_timeout(Duration::from_millis(250));
        assert_eq!(config.wait_timeout, Some(Duration::from_millis(250)));
    }
}
