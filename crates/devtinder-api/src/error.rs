use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use devtinder_db::StoreError;

/// HTTP rendering of a failed request: status code plus the
/// `{success: false, message}` envelope every client screen expects.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "message": self.message })),
        )
            .into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        let status = match &e {
            StoreError::SelfConnection
            | StoreError::AlreadyConnected
            | StoreError::RequestAlreadySent
            | StoreError::RequestAlreadyReceived
            | StoreError::NoSuchRequest
            | StoreError::NotConnected
            | StoreError::EmptyContent => StatusCode::BAD_REQUEST,
            StoreError::UserNotFound => StatusCode::NOT_FOUND,
            StoreError::Sqlite(_) | StoreError::LockPoisoned => {
                error!("store failure: {}", e);
                return Self::internal();
            }
        };

        Self::new(status, e.to_string())
    }
}

/// Maps a `spawn_blocking` join failure — the task panicked or was
/// cancelled, never a domain error.
pub fn join_error(e: tokio::task::JoinError) -> ApiError {
    error!("spawn_blocking join error: {}", e);
    ApiError::internal()
}
