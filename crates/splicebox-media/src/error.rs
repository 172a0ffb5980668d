//! Error types for splicebox-media.

use thiserror::Error;

/// Result type for splicebox-media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for splicebox-media operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A box header could not be read, or a field lies outside its payload.
    #[error("Malformed box at offset {offset}: {reason}")]
    MalformedBox { offset: usize, reason: String },

    /// A box the muxer cannot do without is absent.
    #[error("Missing required box: {0}")]
    MissingRequiredBox(&'static str),

    /// A capture lacks an init segment or fragments.
    #[error("Incomplete capture: {0}")]
    IncompleteCapture(&'static str),
}

impl Error {
    /// Create a malformed box error.
    pub fn malformed(offset: usize, reason: impl Into<String>) -> Self {
        Self::MalformedBox {
            offset,
            reason: reason.into(),
        }
    }
}
