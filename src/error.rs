//! Error types for the notes service.
//!
//! Every fallible adapter returns `NotesError`. The state container never lets
//! one escape: it logs the error and keeps its display string in `error`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum NotesError {
    /// A required service URL or key is missing from the environment.
    #[error("{service} service not configured")]
    NotConfigured { service: &'static str },

    /// No user identity could be resolved for a remote write.
    #[error("User not authenticated")]
    NotAuthenticated,

    /// The hosted table store answered with a non-success status.
    #[error("Remote store error ({status}): {message}")]
    Remote { status: u16, message: String },

    /// The proxy or the external model answered with a non-success status.
    #[error("AI API error: {0}")]
    Upstream(String),

    /// The model reply matched none of the known response shapes.
    #[error("Unparseable model response")]
    UnparseableReply,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),
}

pub type Result<T> = std::result::Result<T, NotesError>;
