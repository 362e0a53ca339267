//! Error types for stub declaration and verification.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the stub server core.
#[derive(Debug, Error)]
pub enum MockError {
    /// A response body file is missing or unreadable at declaration time.
    #[error("File does not exist or is not accessible at {}: {source}", path.display())]
    FileNotFound {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file range does not fit the file it points into.
    #[error("Invalid byte range {from}..{to} for {} ({len} bytes)", path.display())]
    InvalidFileRange {
        path: PathBuf,
        from: u64,
        to: u64,
        len: u64,
    },

    /// Verification asked for a request the stub never received.
    #[error("No requests have been observed for {method} {path}")]
    EmptyHistory { method: String, path: String },

    /// I/O failure while producing a response body.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Result type used across the crate.
pub type Result<T> = std::result::Result<T, MockError>;
