use axum::body::Body;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};

use crate::protocol::error_shapes::openai_error_payload;

/// Error type threaded through every request stage.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("{message}")]
    Validation { status: StatusCode, message: String },
    #[error("Upstream response relayed: status={status}")]
    Upstream {
        status: StatusCode,
        content_type: Option<HeaderValue>,
        body: Bytes,
    },
    #[error("Transport error: {0}")]
    Transport(String),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Broad error category for the client-facing error envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    InvalidRequest,
    Authentication,
    Permission,
    NotFound,
    RateLimit,
    ServerError,
}

#[must_use]
pub fn category_from_status(status: StatusCode) -> ErrorCategory {
    match status.as_u16() {
        401 => ErrorCategory::Authentication,
        403 => ErrorCategory::Permission,
        404 => ErrorCategory::NotFound,
        429 => ErrorCategory::RateLimit,
        400..=499 => ErrorCategory::InvalidRequest,
        _ => ErrorCategory::ServerError,
    }
}

const GENERIC_SERVER_ERROR: &str = "Internal server error";

impl ProxyError {
    /// A 400 carrying `message` verbatim to the client.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::Validation {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn with_status(status: StatusCode, message: impl Into<String>) -> Self {
        Self::Validation {
            status,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::Validation { status, .. } | ProxyError::Upstream { status, .. } => *status,
            ProxyError::Transport(_) | ProxyError::Config(_) | ProxyError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        category_from_status(self.status())
    }
}

impl axum::response::IntoResponse for ProxyError {
    fn into_response(self) -> axum::response::Response {
        match self {
            ProxyError::Upstream {
                status,
                content_type,
                body,
            } => {
                tracing::warn!(status = status.as_u16(), "relaying upstream response unchanged");
                let mut response = axum::response::Response::new(Body::from(body));
                *response.status_mut() = status;
                if let Some(content_type) = content_type {
                    response.headers_mut().insert(CONTENT_TYPE, content_type);
                }
                response
            }
            ProxyError::Validation { status, message } => {
                tracing::debug!(status = status.as_u16(), "{message}");
                let payload = openai_error_payload(category_from_status(status), &message);
                (status, axum::Json(payload)).into_response()
            }
            other => {
                tracing::error!("{other}");
                let status = other.status();
                let payload = openai_error_payload(other.category(), GENERIC_SERVER_ERROR);
                (status, axum::Json(payload)).into_response()
            }
        }
    }
}
