use std::future::Future;

use reqwest::header;
use serde::de::DeserializeOwned;
use tally_config::Config;
use tally_protocol::{APP_METRICS_FILE, AllowedMetricsResponse, MANIFEST_PATH, ManifestResponse};
use url::Url;

use crate::constants;
use crate::http::{HttpError, Response, StatusCode};

/// An error returned when the manifest or an allow-list could not be fetched.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// The request failed or the response body was invalid.
    #[error(transparent)]
    Http(#[from] HttpError),
    /// The upstream responded with a status outside of the success range.
    #[error("upstream responded with {status}: {body}")]
    Status {
        /// The response status.
        status: StatusCode,
        /// The beginning of the response body.
        body: String,
    },
    /// The request URL could not be constructed.
    #[error("invalid upstream url")]
    Url(#[from] url::ParseError),
}

/// Provides the manifest and per-app allow-lists to the
/// [`AllowListCache`](super::AllowListCache).
pub trait AllowListSource: Send + Sync {
    /// Fetches the list of applications to track.
    fn fetch_manifest(&self) -> impl Future<Output = Result<ManifestResponse, FetchError>> + Send;

    /// Fetches the allowed metric names of a single application.
    fn fetch_allow_list(
        &self,
        app_id: &str,
    ) -> impl Future<Output = Result<AllowedMetricsResponse, FetchError>> + Send;
}

/// Fetches allow-lists from the configured HTTP endpoint.
///
/// The manifest is read from `{url}/manifest.json` and allow-lists from
/// `{url}/{app_id}/metrics.json`. The app id is percent-encoded as a single path segment, so it
/// cannot point outside the base URL.
#[derive(Clone, Debug)]
pub struct UpstreamSource {
    client: reqwest::Client,
    base_url: Url,
    max_response_size: usize,
}

impl UpstreamSource {
    /// Creates a source for the upstream in the given config.
    pub fn new(config: &Config) -> Result<Self, HttpError> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .connect_timeout(config.http_connection_timeout())
            .user_agent(constants::SERVER)
            .build()?;

        Ok(Self::with_client(
            client,
            config.upstream_url().clone(),
            config.max_upstream_response_size(),
        ))
    }

    /// Creates a source using an existing HTTP client.
    pub fn with_client(client: reqwest::Client, mut base_url: Url, max_response_size: usize) -> Self {
        // Relative paths replace the last segment unless the base ends with a slash.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Self {
            client,
            base_url,
            max_response_size,
        }
    }

    /// Returns the normalized base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Builds the URL of a document below the base URL from unescaped path segments.
    fn url(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T>(&self, url: Url) -> Result<T, FetchError>
    where
        T: 'static + DeserializeOwned,
    {
        tally_log::trace!(url = %url, "fetching from upstream");

        let response = self
            .client
            .get(url)
            .header(header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(HttpError::from)?;
        let response = Response(response);

        let status = response.status();
        if !status.is_success() {
            let body = response.truncated(constants::MAX_ERROR_BODY_BYTES).await;
            return Err(FetchError::Status { status, body });
        }

        Ok(response.json(self.max_response_size).await?)
    }
}

impl AllowListSource for UpstreamSource {
    async fn fetch_manifest(&self) -> Result<ManifestResponse, FetchError> {
        self.get_json(self.url(&[MANIFEST_PATH])?).await
    }

    async fn fetch_allow_list(&self, app_id: &str) -> Result<AllowedMetricsResponse, FetchError> {
        self.get_json(self.url(&[app_id, APP_METRICS_FILE])?).await
    }
}
