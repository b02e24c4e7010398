//! Provider and persistence error types.

use thiserror::Error;

pub use codeviva_core::error::ProviderError;

/// Errors from the persistence script.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// No script URL is configured.
    #[error("persistence URL is not configured")]
    NotConfigured,

    /// The script could not be reached.
    #[error("persistence request failed: {0}")]
    Network(String),

    /// The script answered with a non-success status.
    #[error("persistence server returned HTTP {0}")]
    Status(u16),

    /// The script reported an error in its response body.
    #[error("persistence server error: {0}")]
    Server(String),

    /// The response body was not the expected JSON.
    #[error("unexpected persistence response: {0}")]
    InvalidResponse(String),
}

/// Map an HTTP error response to a [`ProviderError`], passing successes through.
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    let status = response.status().as_u16();
    if status < 400 {
        return Ok(response);
    }

    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(5)
            * 1000;
        return Err(ProviderError::RateLimited {
            retry_after_ms: retry_after,
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(match status {
        401 | 403 => ProviderError::AuthenticationFailed(body),
        // Gemini rejects bad keys with a plain 400
        400 if body.contains("API_KEY_INVALID") => ProviderError::AuthenticationFailed(body),
        404 => ProviderError::ModelNotFound(body),
        _ => ProviderError::ApiError {
            status,
            message: body,
        },
    })
}

/// Map a transport failure.
pub(crate) fn transport_error(e: reqwest::Error, timeout_secs: u64) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(timeout_secs)
    } else {
        ProviderError::NetworkError(e.to_string())
    }
}
