//! Helpers for reading HTTP responses exchanged between Tally components.

/// Reads up to `limit` bytes of the response body as lossy UTF-8 and discards the rest.
///
/// Read errors end the body early. This is meant for carrying error responses into errors and
/// logs.
pub async fn read_truncated(mut response: reqwest::Response, limit: usize) -> String {
    let mut body = Vec::new();

    while body.len() < limit {
        match response.chunk().await {
            Ok(Some(chunk)) => {
                let remaining = limit - body.len();
                body.extend_from_slice(&chunk[..chunk.len().min(remaining)]);
            }
            Ok(None) | Err(_) => break,
        }
    }

    String::from_utf8_lossy(&body).into_owned()
}
