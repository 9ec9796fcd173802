use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};

/// Path of the collector endpoint accepting [`MetricReport`]s.
pub const SEND_METRICS_PATH: &str = "/sendMetrics";

/// A batch of metric counters submitted by a single installation of an application.
///
/// All fields default when absent from the payload or `null`. A report without `appId` therefore
/// refers to the empty application id, which the collector never knows. Unknown fields are
/// ignored.
///
/// The install identifier is serialized as `installId`. Older clients send the same value as
/// `installTime`, which is accepted when deserializing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct MetricReport {
    /// Identifier of the reporting application.
    #[serde(deserialize_with = "null_as_default")]
    pub app_id: String,
    /// Version of the reporting application.
    #[serde(deserialize_with = "null_as_default")]
    pub app_version: String,
    /// Counters keyed by metric name.
    #[serde(deserialize_with = "null_as_default")]
    pub metrics: BTreeMap<String, i64>,
    /// Opaque identifier of the installation.
    #[serde(alias = "installTime", deserialize_with = "null_as_default")]
    pub install_id: String,
}

impl MetricReport {
    /// Creates a report carrying a single metric.
    pub fn single(
        app_id: impl Into<String>,
        app_version: impl Into<String>,
        install_id: impl Into<String>,
        name: impl Into<String>,
        count: i64,
    ) -> Self {
        Self {
            app_id: app_id.into(),
            app_version: app_version.into(),
            metrics: BTreeMap::from([(name.into(), count)]),
            install_id: install_id.into(),
        }
    }
}

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}
