use serde::{Deserialize, Serialize};

/// The maximum level of log messages that are emitted.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    /// Disables all logging.
    Off,
    /// Only errors.
    Error,
    /// Errors and warnings.
    Warn,
    /// Informational messages and above.
    #[default]
    Info,
    /// Debugging messages and above.
    Debug,
    /// Everything.
    Trace,
}

impl From<Level> for tracing::level_filters::LevelFilter {
    fn from(level: Level) -> Self {
        match level {
            Level::Off => Self::OFF,
            Level::Error => Self::ERROR,
            Level::Warn => Self::WARN,
            Level::Info => Self::INFO,
            Level::Debug => Self::DEBUG,
            Level::Trace => Self::TRACE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_level() {
        let level: Level = serde_json::from_str("\"trace\"").unwrap();
        assert_eq!(level, Level::Trace);
        assert_eq!(serde_json::to_string(&Level::Off).unwrap(), "\"off\"");
    }

    #[test]
    fn test_level_filter() {
        use tracing::level_filters::LevelFilter;

        assert_eq!(LevelFilter::from(Level::Off), LevelFilter::OFF);
        assert_eq!(LevelFilter::from(Level::Warn), LevelFilter::WARN);
        assert_eq!(LevelFilter::from(Level::Trace), LevelFilter::TRACE);
    }
}
