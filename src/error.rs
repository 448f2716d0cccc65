// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Error types for Raseed

use thiserror::Error;

/// Result type alias for Raseed operations
pub type Result<T> = std::result::Result<T, RaseedError>;

/// Raseed error types
#[derive(Error, Debug)]
pub enum RaseedError {
    /// The receipt text could not be turned into a receipt; the user must retake the photo.
    #[error("Could not read receipt: {0}")]
    ParseFailure(String),

    /// The language model was unreachable, timed out or answered with garbage.
    #[error("Analysis unavailable: {0}")]
    AnalysisUnavailable(String),

    /// The store could not be reached. Nothing was written.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Authentication failed: {0}")]
    AuthFailure(String),

    #[error("OCR service unavailable: {0}")]
    OcrUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("File system error: {0}")]
    FileSystem(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Template error: {0}")]
    Template(#[from] minijinja::Error),
}

impl RaseedError {
    /// Whether retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::AnalysisUnavailable(_) | Self::StorageUnavailable(_) | Self::OcrUnavailable(_)
        )
    }
}

impl From<rusqlite::Error> for RaseedError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match err.sqlite_error_code() {
            Some(
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull,
            ) => Self::StorageUnavailable(err.to_string()),
            _ => Self::Database(err),
        }
    }
}
