use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use statsync_core::SyncError;

use crate::infra::app_state::UnknownJob;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err.root() {
            SyncError::Upstream { .. }
            | SyncError::Network(_)
            | SyncError::Decode(_) => Self::bad_gateway(err.to_string()),
            SyncError::InvalidSubjectId(_) => Self::bad_request(err.to_string()),
            SyncError::AlreadyLocked { .. } => Self::conflict(err.to_string()),
            SyncError::Persistence(_) => {
                tracing::error!(error = %err, "database operation failed");
                Self::internal("Database operation failed")
            }
            _ => Self::internal(err.to_string()),
        }
    }
}

impl From<UnknownJob> for AppError {
    fn from(err: UnknownJob) -> Self {
        Self::not_found(err.to_string())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn sync_errors_map_to_statuses() {
        let cases = [
            (SyncError::upstream(503, "down"), StatusCode::BAD_GATEWAY),
            (
                SyncError::InvalidSubjectId("xyz".into()),
                StatusCode::BAD_REQUEST,
            ),
            (
                SyncError::AlreadyLocked {
                    key: "autosync".into(),
                },
                StatusCode::CONFLICT,
            ),
            (
                SyncError::Internal("boom".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                SyncError::Shared(Arc::new(SyncError::upstream(503, "down"))),
                StatusCode::BAD_GATEWAY,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn persistence_details_are_not_rendered() {
        let err = AppError::from(SyncError::Persistence(
            "relation \"snapshots\" does not exist".into(),
        ));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message, "Database operation failed");
    }
}
