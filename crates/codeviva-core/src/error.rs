//! Error types shared across the workspace.
//!
//! `ProviderError` lives here rather than in `codeviva-providers` so that the
//! generation retry loop can downcast and classify failures without string
//! matching.

use thiserror::Error;

/// Errors that can occur when interacting with an AI provider.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// The API returned a 429 rate limit response.
    #[error("rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    /// Authentication failed (invalid API key).
    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The requested model was not found.
    #[error("model not found: {0}")]
    ModelNotFound(String),

    /// The API returned an error response.
    #[error("API error (HTTP {status}): {message}")]
    ApiError { status: u16, message: String },

    /// The response arrived but did not have the expected shape.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The request timed out.
    #[error("request timed out after {0}s")]
    Timeout(u64),

    /// A network error occurred.
    #[error("network error: {0}")]
    NetworkError(String),
}

impl ProviderError {
    /// Returns `true` if this error is permanent and should not be retried.
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ProviderError::AuthenticationFailed(_) | ProviderError::ModelNotFound(_)
        )
    }

    /// Returns the retry-after delay in milliseconds, if applicable.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms } => Some(*retry_after_ms),
            _ => None,
        }
    }
}

/// Errors raised while preparing or driving an exam session.
#[derive(Debug, Error)]
pub enum ExamError {
    /// Generation produced nothing to ask; the exam must not start.
    #[error("no questions were generated, the exam cannot start")]
    NoQuestions,

    /// The generation request itself failed.
    #[error("question generation failed: {0}")]
    Generation(String),

    /// A manual submission carried no text.
    #[error("answer is empty")]
    EmptyAnswer,

    /// An action arrived in a phase that does not accept it.
    #[error("cannot {action} while the session is {phase}")]
    InvalidTransition {
        action: &'static str,
        phase: &'static str,
    },

    /// The session was cancelled before reaching its summary.
    #[error("exam aborted after {answered} answered question(s)")]
    Aborted { answered: usize },
}

/// Errors raised while reading an uploaded project archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The bytes are not a readable ZIP archive.
    #[error("failed to extract files, ensure the upload is a valid ZIP: {0}")]
    InvalidArchive(String),

    /// The archive could not be read from disk.
    #[error("failed to read archive {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permanent_provider_errors() {
        assert!(ProviderError::AuthenticationFailed("bad key".into()).is_permanent());
        assert!(ProviderError::ModelNotFound("gemini-x".into()).is_permanent());
        assert!(!ProviderError::Timeout(8).is_permanent());
        assert!(!ProviderError::RateLimited { retry_after_ms: 10 }.is_permanent());
    }

    #[test]
    fn retry_after_only_for_rate_limits() {
        let limited = ProviderError::RateLimited {
            retry_after_ms: 5000,
        };
        assert_eq!(limited.retry_after_ms(), Some(5000));
        assert_eq!(ProviderError::NetworkError("reset".into()).retry_after_ms(), None);
    }

    #[test]
    fn invalid_transition_message() {
        let err = ExamError::InvalidTransition {
            action: "submit",
            phase: "evaluating",
        };
        assert_eq!(err.to_string(), "cannot submit while the session is evaluating");
    }
}
