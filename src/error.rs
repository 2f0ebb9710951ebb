//! Application error taxonomy and its HTTP mapping.
//!
//! Handlers return `Result<_, AppError>`; the `IntoResponse` impl turns
//! every failure into a structured `{"success": false, "error": ...}` body
//! so callers never see a raw 500 with a stack trace.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Local persistence failed. Write failures are never swallowed.
    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    /// The partner API answered with a non-success envelope or transport
    /// failure. Carries enough detail for retry-vs-surface decisions.
    #[error("remote API error ({remote_code}): {remote_message}")]
    Remote {
        http_status: u16,
        remote_code: String,
        remote_message: String,
    },

    /// The access token was rejected; refresh-and-retry-once applies.
    /// If the retry also fails the caller surfaces "reconnect required".
    #[error("access token expired or rejected")]
    TokenExpired,

    /// Malformed caller input; never reaches the remote API.
    #[error("invalid request: {0}")]
    Validation(String),

    /// No stored credential for the shop.
    #[error("shop not connected")]
    NotConnected,

    /// A sync for this entity type is already in flight.
    #[error("a {0} sync is already running")]
    SyncInFlight(&'static str),
}

impl AppError {
    pub fn remote(http_status: u16, code: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Remote {
            http_status,
            remote_code: code.into(),
            remote_message: message.into(),
        }
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        // Timeouts and connection failures are transient remote errors,
        // retryable at the next user-triggered sync.
        let status = e.status().map(|s| s.as_u16()).unwrap_or(0);
        let code = if e.is_timeout() { "timeout" } else { "transport" };
        AppError::remote(status, code, e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::NotConnected => (
                StatusCode::UNAUTHORIZED,
                "shop not connected; visit /connect first".to_string(),
            ),
            AppError::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "access token invalid; reconnect required".to_string(),
            ),
            AppError::SyncInFlight(_) => (StatusCode::CONFLICT, self.to_string()),
            AppError::Remote { .. } => {
                error!(err = %self, "remote API call failed");
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
            AppError::Storage(e) => {
                error!(err = %e, "storage error");
                (StatusCode::INTERNAL_SERVER_ERROR, "storage error".to_string())
            }
        };

        let body = Json(json!({ "success": false, "error": message }));
        (status, body).into_response()
    }
}
