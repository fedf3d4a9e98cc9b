//! Error types for the HRRR browser.

use thiserror::Error;

use crate::time::TimeParseError;

/// Result type alias using BrowserError.
pub type BrowserResult<T> = Result<T, BrowserError>;

/// Primary error type for browser operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    // === Input Errors ===
    #[error(transparent)]
    InvalidTime(#[from] TimeParseError),

    // === Data Errors ===
    #[error("Tile service returned HTTP {status} for {url}")]
    UpstreamStatus { status: u16, url: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request was superseded")]
    Cancelled,

    // === Overlay Errors ===
    #[error("Overlay error: {0}")]
    Overlay(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BrowserError {
    /// Whether this error represents a superseded request rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, BrowserError::Cancelled)
    }

    /// Short message suitable for the status banner.
    pub fn user_message(&self) -> &'static str {
        match self {
            BrowserError::UpstreamStatus { .. } | BrowserError::Network(_) => {
                "Error loading data. Please try again."
            }
            BrowserError::Overlay(_) => {
                "Error loading weather data. Please try a different date or hour."
            }
            BrowserError::InvalidTime(_) => "Invalid date or hour selection.",
            BrowserError::Cancelled => "",
            BrowserError::Internal(_) => "Unexpected error.",
        }
    }
}

impl From<std::io::Error> for BrowserError {
    fn from(err: std::io::Error) -> Self {
        BrowserError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for BrowserError {
    fn from(err: serde_json::Error) -> Self {
        BrowserError::Internal(format!("JSON error: {}", err))
    }
}
