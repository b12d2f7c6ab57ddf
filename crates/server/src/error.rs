use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;
use tracing::error;

use holocene_store::StoreError;

/// Errors surfaced by API handlers. Every variant renders as JSON
/// `{"error": ...}` with the matching status; internal details go to the log
/// only.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Bad input at the API boundary.
    #[error("{0}")]
    Validation(String),

    /// The requested row does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Missing or invalid credential.
    #[error("{0}")]
    Unauthorized(String),

    /// The caller may not access the resource.
    #[error("{0}")]
    Forbidden(String),

    /// A proxied upstream answered with a failure status.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    /// A store failure or other bug.
    #[error("internal error")]
    Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        Self::Internal(Box::new(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            Self::Upstream { status, message } => (
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY),
                message.clone(),
            ),
            Self::Internal(source) => {
                error!(error = %source, "internal error in api handler");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}
