use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use tally_config::ClientConfig;
use tally_protocol::MetricReport;
use tally_protocol::http::read_truncated;
use url::Url;

use crate::barrier::ShutdownBarrier;
use crate::install_id::InstallId;
use crate::store::LocalStore;

/// Maximum number of response body bytes retained in a [`WriteError::Status`].
const MAX_ERROR_BODY_BYTES: usize = 2048;

/// The `User-Agent` header sent with every report.
const CLIENT_USER_AGENT: &str = concat!("tally-client/", env!("CARGO_PKG_VERSION"));

const APPLICATION_JSON: &str = "application/json";

/// Callback receiving errors of [`MetricWriter::write_metric_async`].
pub type ErrorCallback = Arc<dyn Fn(&WriteError) + Send + Sync>;

/// An error returned when a metric could not be reported.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    /// The report could not be serialized.
    #[error("failed to serialize metric report")]
    Serialize(#[source] serde_json::Error),
    /// The request could not be sent or the response could not be received.
    #[error("failed to send metric report")]
    Send(#[source] reqwest::Error),
    /// The collector did not respond within the configured timeout.
    #[error("metric report timed out")]
    Timeout,
    /// The collector responded with a status outside of the success range.
    #[error("collector responded with {status}: {body}")]
    Status {
        /// The response status.
        status: StatusCode,
        /// The beginning of the response body.
        body: String,
    },
}

/// An error returned when a [`MetricWriter`] cannot be built.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The application id is empty.
    #[error("application id must not be empty")]
    MissingAppId,
    /// The collector URL cannot be used as a base URL.
    #[error("invalid collector url {0}")]
    InvalidServerUrl(Url),
    /// No directory for the install identifier could be determined.
    #[error("could not determine a directory for the install id")]
    NoStoreDir,
    /// The HTTP client could not be created.
    #[error("failed to create http client")]
    Client(#[source] reqwest::Error),
}

/// Sends metric reports of an enabled [`MetricWriter`].
pub struct Reporter {
    app_id: String,
    app_version: String,
    install_id: String,
    endpoint: Url,
    client: reqwest::Client,
    timeout: Duration,
    barrier: ShutdownBarrier,
    on_error: Option<ErrorCallback>,
}

impl Reporter {
    /// The install identifier attached to all reports.
    pub fn install_id(&self) -> &str {
        &self.install_id
    }

    /// The URL reports are posted to.
    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    async fn send(&self, name: &str, count: i64) -> Result<(), WriteError> {
        let report = MetricReport::single(
            self.app_id.as_str(),
            self.app_version.as_str(),
            self.install_id.as_str(),
            name,
            count,
        );
        let body = serde_json::to_vec(&report).map_err(WriteError::Serialize)?;

        let request = self
            .client
            .post(self.endpoint.clone())
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .header(CONTENT_TYPE, APPLICATION_JSON)
            .header(ACCEPT, APPLICATION_JSON)
            .body(body);

        let result = tokio::time::timeout(self.timeout, async {
            let response = request.send().await.map_err(WriteError::Send)?;

            let status = response.status();
            if status.is_success() {
                return Ok(());
            }

            let body = read_truncated(response, MAX_ERROR_BODY_BYTES).await;
            Err(WriteError::Status { status, body })
        })
        .await;

        result.unwrap_or(Err(WriteError::Timeout))
    }
}

impl fmt::Debug for Reporter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reporter")
            .field("app_id", &self.app_id)
            .field("app_version", &self.app_version)
            .field("install_id", &self.install_id)
            .field("endpoint", &self.endpoint.as_str())
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Reports usage metrics of an application to the collector.
///
/// The writer is a cheap handle that can be cloned and passed to wherever metrics are recorded.
/// All clones share the same connection pool and shutdown state.
///
/// A writer is [`Disabled`](Self::Disabled) if the user opted out of metrics. Disabled writers
/// never touch the disk or the network.
///
/// Before the application exits, call [`close`](Self::close) to wait for pending asynchronous
/// writes. After `close` has been called, all writes are silently dropped.
#[derive(Clone, Debug)]
pub enum MetricWriter {
    /// Metrics are reported to the collector.
    Enabled(Arc<Reporter>),
    /// Metrics are dropped.
    Disabled,
}

impl MetricWriter {
    /// Returns a builder for a writer reporting on behalf of the given application.
    pub fn builder<'a>(
        app_id: impl Into<String>,
        app_version: impl Into<String>,
        config: &'a ClientConfig,
    ) -> MetricWriterBuilder<'a> {
        MetricWriterBuilder {
            app_id: app_id.into(),
            app_version: app_version.into(),
            config,
            store_dir: None,
            client: None,
            on_error: None,
        }
    }

    /// Returns `true` if metrics are reported.
    ///
    /// This remains `true` after [`close`](Self::close), even though writes are dropped.
    pub fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }

    /// Reports a metric and waits for the collector's response.
    ///
    /// The request is bounded by the configured timeout. Dropping the returned future cancels the
    /// request, which allows callers to impose a tighter deadline.
    ///
    /// This is a no-op if the writer is disabled or closing.
    pub async fn write_metric(&self, name: &str, count: i64) -> Result<(), WriteError> {
        let Self::Enabled(reporter) = self else {
            return Ok(());
        };

        let Some(_token) = reporter.barrier.admit() else {
            return Ok(());
        };

        reporter.send(name, count).await
    }

    /// Reports a metric in the background and returns immediately.
    ///
    /// Failures are logged at debug level and passed to the error callback registered with
    /// [`MetricWriterBuilder::on_async_error`]. Must be called within a Tokio runtime, otherwise the
    /// metric is dropped.
    ///
    /// This is a no-op if the writer is disabled or closing.
    pub fn write_metric_async(&self, name: impl Into<String>, count: i64) {
        let Self::Enabled(reporter) = self else {
            return;
        };

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tally_log::debug!("no async runtime available, dropping metric");
            return;
        };

        let Some(token) = reporter.barrier.admit() else {
            return;
        };

        let reporter = Arc::clone(reporter);
        let name = name.into();

        runtime.spawn(async move {
            let _token = token;

            if let Err(error) = reporter.send(&name, count).await {
                tally_log::debug!(
                    error = &error as &dyn Error,
                    metric = %name,
                    "failed to write metric"
                );

                if let Some(on_error) = &reporter.on_error {
                    on_error(&error);
                }
            }
        });
    }

    /// Waits for all pending writes and disables the writer.
    ///
    /// Writes started before this call are awaited. Writes started after this call began never
    /// perform any I/O. Calling this more than once, or on clones of the same writer, is allowed.
    pub async fn close(&self) {
        if let Self::Enabled(reporter) = self {
            reporter.barrier.close().await;
        }
    }
}

/// Configures and creates a [`MetricWriter`].
pub struct MetricWriterBuilder<'a> {
    app_id: String,
    app_version: String,
    config: &'a ClientConfig,
    store_dir: Option<PathBuf>,
    client: Option<reqwest::Client>,
    on_error: Option<ErrorCallback>,
}

impl MetricWriterBuilder<'_> {
    /// Stores the install identifier in the given directory instead of the default one.
    pub fn store_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.store_dir = Some(dir.into());
        self
    }

    /// Sends reports with the given HTTP client.
    ///
    /// The configured timeout still applies to every report.
    pub fn http_client(mut self, client: reqwest::Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Registers a callback receiving errors of asynchronous writes.
    pub fn on_async_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&WriteError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(callback));
        self
    }

    /// Creates the writer.
    ///
    /// Returns [`MetricWriter::Disabled`] without further checks if the user opted out.
    /// Otherwise, loads or creates the install identifier.
    pub fn build(self) -> Result<MetricWriter, BuildError> {
        if self.config.no_metrics {
            return Ok(MetricWriter::Disabled);
        }

        if self.app_id.is_empty() {
            return Err(BuildError::MissingAppId);
        }

        let endpoint = send_metrics_url(&self.config.server_url)?;

        let store_dir = match self.store_dir {
            Some(dir) => dir,
            None => LocalStore::default_dir(&self.app_id).ok_or(BuildError::NoStoreDir)?,
        };
        let install_id = InstallId::load_or_create(&LocalStore::new(store_dir)).install_id;

        let timeout = self.config.timeout();
        let client = match self.client {
            Some(client) => client,
            None => reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .map_err(BuildError::Client)?,
        };

        Ok(MetricWriter::Enabled(Arc::new(Reporter {
            app_id: self.app_id,
            app_version: self.app_version,
            install_id,
            endpoint,
            client,
            timeout,
            barrier: ShutdownBarrier::new(),
            on_error: self.on_error,
        })))
    }
}

/// Appends the report path to the collector's base URL.
fn send_metrics_url(server_url: &Url) -> Result<Url, BuildError> {
    let mut url = server_url.clone();

    url.path_segments_mut()
        .map_err(|_| BuildError::InvalidServerUrl(server_url.clone()))?
        .pop_if_empty()
        .push(tally_protocol::SEND_METRICS_PATH.trim_start_matches('/'));

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(url: &str) -> ClientConfig {
        ClientConfig::new(url.parse().unwrap())
    }

    #[test]
    fn test_send_metrics_url() {
        let url = send_metrics_url(&"http://localhost:8080".parse().unwrap()).unwrap();
        assert_eq!(url.as_str(), "http://localhost:8080/sendMetrics");

        let url = send_metrics_url(&"https://example.com/metrics/".parse().unwrap()).unwrap();
        assert_eq!(url.as_str(), "https://example.com/metrics/sendMetrics");
    }

    #[test]
    fn test_opt_out_is_disabled() {
        let mut config = config("http://localhost:8080");
        config.no_metrics = true;

        // The store directory is never touched for disabled writers.
        let writer = MetricWriter::builder("app1", "1.0", &config)
            .store_dir("/nonexistent/tally")
            .build()
            .unwrap();

        assert!(!writer.is_enabled());
    }

    #[test]
    fn test_missing_app_id() {
        let config = config("http://localhost:8080");
        let result = MetricWriter::builder("", "1.0", &config).build();
        assert!(matches!(result, Err(BuildError::MissingAppId)));
    }

    #[test]
    fn test_invalid_server_url() {
        let config = config("mailto:metrics@example.com");
        let dir = tempfile::tempdir().unwrap();

        let result = MetricWriter::builder("app1", "1.0", &config)
            .store_dir(dir.path())
            .build();
        assert!(matches!(result, Err(BuildError::InvalidServerUrl(_))));
    }

    #[test]
    fn test_install_id_is_persisted() {
        let config = config("http://localhost:8080");
        let dir = tempfile::tempdir().unwrap();

        let build = || {
            MetricWriter::builder("app1", "1.0", &config)
                .store_dir(dir.path())
                .build()
                .unwrap()
        };

        let (MetricWriter::Enabled(first), MetricWriter::Enabled(second)) = (build(), build())
        else {
            panic!("writers should be enabled");
        };
        assert_eq!(first.install_id(), second.install_id());
    }

    #[tokio::test]
    async fn test_disabled_writes_are_noops() {
        let writer = MetricWriter::Disabled;

        writer.write_metric("runs", 1).await.unwrap();
        writer.write_metric_async("runs", 1);
        writer.close().await;
    }

    #[test]
    fn test_async_write_without_runtime() {
        let config = config("http://localhost:8080");
        let dir = tempfile::tempdir().unwrap();

        let writer = MetricWriter::builder("app1", "1.0", &config)
            .store_dir(dir.path())
            .build()
            .unwrap();

        // Dropped instead of panicking.
        writer.write_metric_async("runs", 1);
    }
}
