//! Error type for the relay gateway.
//!
//! Every handler failure funnels into [`RelayError`], which knows its HTTP
//! status via [`RelayError::http_status`] and renders itself as the JSON error
//! body the player expects.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use std::fmt;

/// Failure modes of a relayed or locally answered request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// The request was malformed (missing or undecodable target, bad method).
    #[error("{0}")]
    Validation(String),

    /// The target host is not covered by the allow-list.
    #[error("Domain not allowed")]
    DomainNotAllowed {
        /// Host that was rejected, kept for logging only.
        host: String,
    },

    /// A locally served entity (e.g. a clear-key channel) does not exist.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g. "channel").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// The upstream fetch failed before a response was available.
    #[error("Proxy failed")]
    Upstream {
        /// Human-readable transport failure (DNS, connect, timeout, ...).
        details: String,
    },

    /// Catch-all for unexpected internal errors.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl RelayError {
    /// Map this error to an HTTP status code.
    pub fn http_status(&self) -> u16 {
        match self {
            RelayError::Validation(_) => 400,
            RelayError::DomainNotAllowed { .. } => 403,
            RelayError::NotFound { .. } => 404,
            RelayError::Upstream { .. } => 500,
            RelayError::Internal(_) => 500,
        }
    }

    /// Convenience constructor for [`RelayError::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        RelayError::Validation(message.into())
    }

    /// Convenience constructor for [`RelayError::NotFound`].
    pub fn not_found(entity: impl Into<String>, id: impl fmt::Display) -> Self {
        RelayError::NotFound {
            entity: entity.into(),
            id: id.to_string(),
        }
    }

    /// Convenience constructor for [`RelayError::Upstream`].
    pub fn upstream(details: impl fmt::Display) -> Self {
        RelayError::Upstream {
            details: details.to_string(),
        }
    }
}

/// Result alias using [`RelayError`].
pub type Result<T> = std::result::Result<T, RelayError>;

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        match &self {
            RelayError::DomainNotAllowed { host } => {
                tracing::warn!(host = %host, "Rejected target outside the allow-list");
            }
            _ if status.is_server_error() => {
                tracing::error!(status = %status, error = ?self, "Relay request failed");
            }
            _ => {
                tracing::debug!(status = %status, error = %self, "Rejected relay request");
            }
        }

        let body = match &self {
            RelayError::Upstream { details } => json!({
                "error": self.to_string(),
                "details": details,
            }),
            _ => json!({ "error": self.to_string() }),
        };

        (status, axum::Json(body)).into_response()
    }
}
