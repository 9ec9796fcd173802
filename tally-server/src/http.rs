//! Size-limited reading of upstream responses.

#[doc(inline)]
pub use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Failure to send a request or to read its response.
#[derive(Debug, thiserror::Error)]
pub enum HttpError {
    /// The response body exceeded the size limit.
    #[error("payload too large")]
    Overflow,
    /// The request could not be sent or the body could not be read.
    #[error("could not send request")]
    Reqwest(#[from] reqwest::Error),
    /// The response body was not valid JSON of the expected shape.
    #[error("failed to parse JSON response")]
    Json(#[from] serde_json::Error),
}

pub struct Response(pub reqwest::Response);

impl Response {
    pub fn status(&self) -> StatusCode {
        self.0.status()
    }

    /// Reads the full body, failing with [`HttpError::Overflow`] if it exceeds `limit` bytes.
    pub async fn bytes(self, limit: usize) -> Result<Vec<u8>, HttpError> {
        let Self(mut response) = self;

        let mut body = Vec::with_capacity(limit.min(8192));
        while let Some(chunk) = response.chunk().await? {
            if (body.len() + chunk.len()) > limit {
                return Err(HttpError::Overflow);
            }

            body.extend_from_slice(&chunk);
        }

        Ok(body)
    }

    /// Reads up to `limit` bytes of the body as lossy UTF-8 and discards the rest.
    pub async fn truncated(self, limit: usize) -> String {
        tally_protocol::http::read_truncated(self.0, limit).await
    }

    pub async fn json<T>(self, limit: usize) -> Result<T, HttpError>
    where
        T: 'static + DeserializeOwned,
    {
        let bytes = self.bytes(limit).await?;
        serde_json::from_slice(&bytes).map_err(HttpError::Json)
    }
}
