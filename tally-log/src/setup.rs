use std::env;

use serde::{Deserialize, Serialize};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

use crate::Level;

// Import CRATE_NAMES, which lists all crates in the workspace.
include!(concat!(env!("OUT_DIR"), "/constants.gen.rs"));

/// Controls the log format.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Auto detect the best format.
    ///
    /// This chooses [`LogFormat::Pretty`] for TTY, otherwise [`LogFormat::Simplified`].
    Auto,

    /// Pretty printing with colors.
    ///
    /// ```text
    ///   INFO  tally_server::services::allow_list: updated allow-lists
    /// ```
    Pretty,

    /// Simplified plain text output.
    ///
    /// ```text
    /// 2024-07-03T02:08:00.000Z  INFO tally_server::services::allow_list: updated allow-lists
    /// ```
    Simplified,

    /// Dump out JSON lines.
    ///
    /// ```text
    /// {"timestamp":"2024-07-03T02:08:00.000Z","level":"INFO","fields":{"message":"metric reported","app_id":"app1","metric":"a","count":1},"target":"tally::metric"}
    /// ```
    Json,
}

/// Controls the logging system.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct LogConfig {
    /// The log level for Tally's own crates.
    pub level: Level,

    /// Controls the log output format.
    ///
    /// Defaults to [`LogFormat::Auto`], which detects the best format based on the TTY.
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::Info,
            format: LogFormat::Auto,
        }
    }
}

/// Returns the default filter: INFO for third-party crates, the configured level for ours.
fn default_filter(level: Level) -> EnvFilter {
    let level = LevelFilter::from(level);
    let mut filter = EnvFilter::new(LevelFilter::INFO.to_string());

    for name in CRATE_NAMES {
        if let Ok(directive) = format!("{name}={level}").parse() {
            filter = filter.add_directive(directive);
        }
    }

    // The per-metric records are emitted under a dedicated target.
    if let Ok(directive) = format!("tally::metric={level}").parse() {
        filter = filter.add_directive(directive);
    }

    filter
}

/// Initialize the logging system.
///
/// If `RUST_LOG` is set in the environment, it takes precedence over the configured level.
/// Calling this more than once has no effect.
///
/// # Example
///
/// ```ignore
/// let log_config = tally_log::LogConfig {
///     level: tally_log::Level::Debug,
///     ..Default::default()
/// };
///
/// tally_log::init(&log_config);
/// ```
pub fn init(config: &LogConfig) {
    let filter = match env::var(EnvFilter::DEFAULT_ENV) {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => default_filter(config.level),
    };

    let subscriber = tracing_subscriber::fmt::layer().with_target(true);

    let format = match (config.format, console::user_attended()) {
        (LogFormat::Auto, true) => LogFormat::Pretty,
        (LogFormat::Auto, false) => LogFormat::Simplified,
        (format, _) => format,
    };

    let registry = tracing_subscriber::registry().with(filter);
    let result = match format {
        LogFormat::Pretty => registry.with(subscriber.pretty()).try_init(),
        LogFormat::Json => registry
            .with(subscriber.json().flatten_event(false).with_current_span(true))
            .try_init(),
        LogFormat::Simplified | LogFormat::Auto => {
            registry.with(subscriber.compact().with_ansi(false)).try_init()
        }
    };

    // A global subscriber may already be installed, for instance by an embedding application.
    result.ok();
}
