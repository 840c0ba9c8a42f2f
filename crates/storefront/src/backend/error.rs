//! Backend-related errors.

use std::time::Duration;

use thiserror::Error;

use crate::orders::FieldError;

/// Errors that can occur when talking to the marketplace backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// The request never got a response.
    #[error("backend request failed: {0}")]
    Request(String),

    /// No response within the configured timeout.
    #[error("backend did not respond within {0:?}")]
    Timeout(Duration),

    /// The backend answered with a server error.
    #[error("backend unavailable (HTTP {status})")]
    Unavailable {
        /// HTTP status code.
        status: u16,
    },

    /// The backend refused the request as invalid.
    #[error("backend rejected the request (HTTP {status}): {message}")]
    Rejected {
        /// HTTP status code.
        status: u16,
        /// Message from the response body.
        message: String,
        /// Field-level problems, if the backend listed any.
        field_errors: Vec<FieldError>,
    },

    /// The bearer credential was missing or refused.
    #[error("backend refused the credential (HTTP {status})")]
    Unauthorized {
        /// HTTP status code.
        status: u16,
    },

    /// The order is not in a state that allows the request.
    #[error("backend reported a conflict: {0}")]
    Conflict(String),

    /// The backend does not know the referenced resource.
    #[error("backend has no such resource: {0}")]
    NotFound(String),

    /// The response body could not be decoded.
    #[error("backend response error: {0}")]
    Response(String),

    /// Payment authorization was declined.
    #[error("payment declined: {0}")]
    PaymentDeclined(String),
}

impl BackendError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Request(_) | Self::Timeout(_) | Self::Unavailable { .. }
        )
    }
}
