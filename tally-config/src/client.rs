use std::time::Duration;

use serde::de::{Error as _, Unexpected};
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

fn default_timeout() -> u64 {
    5
}

fn deserialize_timeout<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    match u64::deserialize(deserializer)? {
        0 => Err(D::Error::invalid_value(
            Unexpected::Unsigned(0),
            &"a positive number of seconds",
        )),
        timeout => Ok(timeout),
    }
}

/// Configuration of the metric writer embedded in applications.
///
/// Only `server_url` is required:
///
/// ```
/// let config: tally_config::ClientConfig = serde_json::from_str(r#"{
///     "server_url": "https://metrics.example.com"
/// }"#).unwrap();
///
/// assert!(!config.no_metrics);
/// assert_eq!(config.timeout(), std::time::Duration::from_secs(5));
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Base URL of the collector. Reports are sent to `{server_url}/sendMetrics`.
    pub server_url: Url,
    /// Opts out of metric reporting. The writer performs no I/O at all when set.
    #[serde(default)]
    pub no_metrics: bool,
    /// Timeout for a single report in seconds. Must not be zero.
    #[serde(
        default = "default_timeout",
        deserialize_with = "deserialize_timeout"
    )]
    pub timeout: u64,
}

impl ClientConfig {
    /// Creates a configuration reporting to the given collector with default settings.
    pub fn new(server_url: Url) -> Self {
        Self {
            server_url,
            no_metrics: false,
            timeout: default_timeout(),
        }
    }

    /// Returns the timeout for a single report.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}
