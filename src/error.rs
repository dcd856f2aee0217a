//! Library-wide error type.
//!
//! Store methods return `rusqlite::Result`; everything above the store
//! (validation, AI calls, settings) speaks `GenieError`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenieError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("GEMINI_API_KEY is not configured")]
    AiNotConfigured,

    #[error("AI service is temporarily unavailable")]
    AiUnavailable { status: u16, body: String },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Settings error: {0}")]
    Settings(String),
}

pub type Result<T> = std::result::Result<T, GenieError>;

pub(crate) fn not_found(msg: impl Into<String>) -> GenieError {
    GenieError::NotFound(msg.into())
}

pub(crate) fn invalid(msg: impl Into<String>) -> GenieError {
    GenieError::InvalidInput(msg.into())
}
