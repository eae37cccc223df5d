use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};

/// Handler-level failures. Lab and model errors never get here; they are
/// rendered into the page instead.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Internal(detail) => {
                tracing::error!(detail, "Request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Html("<!DOCTYPE html><p>Erro interno do servidor.</p>"),
                )
                    .into_response()
            }
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::Internal(format!("analysis worker failed: {err}"))
    }
}

impl From<serde_urlencoded::ser::Error> for ApiError {
    fn from(err: serde_urlencoded::ser::Error) -> Self {
        ApiError::Internal(format!("cannot encode redirect: {err}"))
    }
}
