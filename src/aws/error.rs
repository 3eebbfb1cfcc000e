//! Error type shared by the AWS adapters.

use aws_sdk_eventbridge::error::DisplayErrorContext;
use thiserror::Error;

/// Error surfaced by AWS control-plane calls.
#[derive(Debug, Error)]
pub enum AwsApiError {
    /// Raised when a service call fails.
    #[error("{operation} failed: {message}")]
    Api {
        /// Operation that failed, for example `PutRule`.
        operation: &'static str,
        /// Rendered service error, including its causal chain.
        message: String,
    },
    /// Raised when a request body cannot be encoded.
    #[error("cannot encode {what}: {message}")]
    Encode {
        /// What was being encoded.
        what: &'static str,
        /// Human-readable description of the failure.
        message: String,
    },
    /// Raised when a successful response omits a field the caller requires.
    #[error("{operation} response missing {field}")]
    MissingField {
        /// Operation whose response was incomplete.
        operation: &'static str,
        /// Field that was absent.
        field: &'static str,
    },
}

impl AwsApiError {
    /// Wraps a service error with the operation that produced it.
    pub(crate) fn api<E>(operation: &'static str, err: E) -> Self
    where
        E: std::error::Error,
    {
        Self::Api {
            operation,
            message: DisplayErrorContext(err).to_string(),
        }
    }
}
