//! Error types for the notes store
//!
//! All errors use thiserror for structured error handling.
//! These errors can be serialized for the UI layer.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Note store unavailable at {path:?}: {source}")]
    StoreUnavailable {
        path: PathBuf,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Unsupported note store format at {path:?}: expected version {expected}, found {found:?}")]
    FormatMismatch {
        path: PathBuf,
        expected: i64,
        found: Option<i64>,
    },

    #[error("Note not found: {0}")]
    NoteNotFound(i64),

    #[error("Note index {index} out of range (cached notes: {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Generic(String),
}

impl AppError {
    pub fn store_unavailable(
        path: impl Into<PathBuf>,
        source: impl Into<Box<dyn std::error::Error + Send + Sync>>,
    ) -> Self {
        AppError::StoreUnavailable {
            path: path.into(),
            source: source.into(),
        }
    }

    /// True for lookups that missed, as opposed to storage failures.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::NoteNotFound(_) | AppError::IndexOutOfRange { .. }
        )
    }
}

impl serde::Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
