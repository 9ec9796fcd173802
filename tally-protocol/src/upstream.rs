use serde::{Deserialize, Serialize};

/// Path of the manifest relative to the configuration base URL.
pub const MANIFEST_PATH: &str = "manifest.json";

/// File name of an application's allow-list, below a directory named after the application.
pub const APP_METRICS_FILE: &str = "metrics.json";

/// Lists the applications the collector tracks allow-lists for.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestResponse {
    /// Identifiers of all known applications.
    #[serde(default)]
    pub metrics_apps: Vec<String>,
}

/// The metric names a single application is allowed to report.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AllowedMetricsResponse {
    /// Allowed metric names.
    #[serde(default)]
    pub metrics: Vec<String>,
}
