//! Error types for the HTTP layer.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use domains::{AuthError, DomainError};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, error};

const UNAVAILABLE: &str = "service temporarily unavailable";

/// Everything a handler can fail with. Always rendered as
/// `{ "success": false, "message": ... }`.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    /// Body that is not JSON or does not have the operation's shape.
    #[error("{0}")]
    BadRequest(String),

    #[error("blob storage failed: {0}")]
    Blob(anyhow::Error),

    #[error("response encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl ApiError {
    /// - Validation, malformed body: 400
    /// - Missing or invalid session: 401
    /// - Forbidden: 403
    /// - Not found: 404
    /// - State conflict: 409
    /// - Store, blob, encoding: 500
    #[must_use]
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Domain(err) => match err {
                DomainError::Validation(_) => StatusCode::BAD_REQUEST,
                DomainError::NotFound(_) => StatusCode::NOT_FOUND,
                DomainError::Forbidden(_) => StatusCode::FORBIDDEN,
                DomainError::Conflict(_) => StatusCode::CONFLICT,
                DomainError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Auth(_) => StatusCode::UNAUTHORIZED,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Blob(_) | Self::Encode(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text shown to the user. Internal failures are never described.
    pub fn public_message(&self) -> String {
        if self.status_code().is_server_error() {
            UNAVAILABLE.to_string()
        } else {
            self.to_string()
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            debug!(error = %self, status = status.as_u16(), "request rejected");
        }
        let body = json!({ "success": false, "message": self.public_message() });
        (status, Json(body)).into_response()
    }
}
