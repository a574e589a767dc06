use std::sync::Arc;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    /// Non-2xx answer from a provider call.
    #[error("Upstream error: status {status}: {message}")]
    Upstream { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Malformed base64/JSON from a provider.
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Lock already held: {key}")]
    AlreadyLocked { key: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid subject id: {0}")]
    InvalidSubjectId(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// One failure handed to every caller that waited on the same work.
    #[error(transparent)]
    Shared(Arc<SyncError>),
}

impl SyncError {
    pub fn upstream(status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// The error behind any [`SyncError::Shared`] wrapping.
    pub fn root(&self) -> &SyncError {
        match self {
            Self::Shared(inner) => inner.root(),
            other => other,
        }
    }

    /// Persistence failures abort the current run instead of being counted
    /// as a single failed item.
    pub fn is_persistence(&self) -> bool {
        matches!(self.root(), Self::Persistence(_))
    }

    pub fn is_already_locked(&self) -> bool {
        matches!(self.root(), Self::AlreadyLocked { .. })
    }

    pub fn upstream_status(&self) -> Option<u16> {
        match self.root() {
            Self::Upstream { status, .. } => Some(*status),
            Self::Network(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[cfg(feature = "postgres")]
impl From<sqlx::migrate::MigrateError> for SyncError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Persistence(format!("migration failed: {err}"))
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
