//! Error types for recon-core

use crate::rules::Side;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in recon-core
///
/// Cancellation is not represented here: a cancelled run still returns
/// `Ok` with a partial [`ComparisonResult`](crate::ComparisonResult).
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to open or read a source file
    #[error("failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or write an export file
    #[error("failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Separator is not exactly one character, or is a line break
    #[error("invalid separator {0:?}: expected a single character other than a line break")]
    InvalidSeparator(String),

    /// Rule or job configuration rejected before streaming
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A side was used before its file was loaded
    #[error("file {0} has not been loaded")]
    FileNotLoaded(Side),

    /// Export requested before any comparison completed
    #[error("no comparison result available")]
    NoResult,

    /// Second build-side row with an already indexed key in unique-key mode
    #[error("duplicate match key {key:?} in file B (row {index})")]
    DuplicateKey { key: String, index: usize },

    /// CSV writer error from the csv crate
    #[error("CSV error in '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for configuration problems caught before any file is streamed
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            Error::InvalidSeparator(_) | Error::InvalidConfig(_) | Error::Json(_)
        )
    }
}
