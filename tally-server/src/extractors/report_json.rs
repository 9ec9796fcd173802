use std::error::Error;

use axum::extract::{FromRequest, Request};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde_json::error::Category;

use crate::utils::ApiErrorResponse;

/// The content type a request body must declare.
const JSON_CONTENT_TYPE: &str = "application/json";

/// Rejection of a request body that could not be decoded into a single JSON object.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The request did not declare a JSON body.
    #[error("invalid content type: content-type {0:?} is not \"application/json\"")]
    UnsupportedContentType(String),
    /// The body exceeded the configured maximum size.
    #[error("request body too large")]
    PayloadTooLarge,
    /// The body was empty.
    #[error("body must not be empty")]
    EmptyBody,
    /// The body was not valid JSON.
    #[error("malformed json")]
    MalformedJson(#[source] serde_json::Error),
    /// A field had the wrong type or an invalid value.
    #[error("invalid value for {path:?}: {message}")]
    InvalidValue {
        /// Path of the offending field.
        path: String,
        /// Description of the problem.
        message: String,
    },
    /// The JSON object was followed by more data.
    #[error("body contained more than one json object")]
    TrailingData,
    /// The body could not be read.
    #[error("failed to read request body")]
    ReadFailed(#[source] axum::Error),
}

impl DecodeError {
    fn status(&self) -> StatusCode {
        match self {
            Self::UnsupportedContentType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            Self::EmptyBody
            | Self::MalformedJson(_)
            | Self::InvalidValue { .. }
            | Self::TrailingData
            | Self::ReadFailed(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for DecodeError {
    fn into_response(self) -> Response {
        tally_log::warn!(error = &self as &dyn Error, "rejected metric report");
        (self.status(), ApiErrorResponse::from_error(&self)).into_response()
    }
}

/// Extracts exactly one JSON value of type `T` from a request body.
///
/// Unlike [`axum::Json`], this rejects trailing data after the value and reports the path of
/// fields with invalid values. A top-level `null` yields `T::default()`. The body limit is taken from
/// [`DefaultBodyLimit`](axum::extract::DefaultBodyLimit) on the route.
#[derive(Debug)]
pub struct ReportJson<T>(pub T);

impl<T, S> FromRequest<S> for ReportJson<T>
where
    T: DeserializeOwned + Default,
    S: Send + Sync,
{
    type Rejection = DecodeError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let content_type = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();

        if !content_type.starts_with(JSON_CONTENT_TYPE) {
            return Err(DecodeError::UnsupportedContentType(content_type.to_owned()));
        }

        let body = Bytes::from_request(request, state)
            .await
            .map_err(|rejection| match rejection.status() {
                StatusCode::PAYLOAD_TOO_LARGE => DecodeError::PayloadTooLarge,
                _ => DecodeError::ReadFailed(axum::Error::new(rejection)),
            })?;

        decode(&body).map(Self)
    }
}

fn decode<T: DeserializeOwned + Default>(body: &[u8]) -> Result<T, DecodeError> {
    if body.trim_ascii().is_empty() {
        return Err(DecodeError::EmptyBody);
    }

    let mut deserializer = serde_json::Deserializer::from_slice(body);
    let value = serde_path_to_error::deserialize::<_, Option<T>>(&mut deserializer);
    let value = value.map_err(|error| match error.inner().classify() {
        Category::Data => DecodeError::InvalidValue {
            path: error.path().to_string(),
            message: error.inner().to_string(),
        },
        Category::Syntax | Category::Eof | Category::Io => {
            DecodeError::MalformedJson(error.into_inner())
        }
    })?;

    deserializer.end().map_err(|_| DecodeError::TrailingData)?;
    Ok(value.unwrap_or_default())
}
