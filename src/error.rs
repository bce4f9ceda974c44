//! Error types for archive parsing and range extraction.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by [`Archive`](crate::Archive) construction and extraction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArchiveError {
    /// The buffer is not a well-formed pack. Fatal for that buffer.
    #[error("Invalid pack: {0}")]
    Format(String),

    /// No file entry carries the requested index.
    #[error("Unknown file index: {file_index}")]
    UnknownIndex {
        /// The index that was requested
        file_index: u32,
    },

    /// The requested range does not fit inside the file.
    #[error("Range {offset}+{size} out of bounds for file {file_index} (length {length})")]
    OutOfRange {
        /// The file the range was requested from
        file_index: u32,
        /// Requested start, relative to the file content
        offset: u64,
        /// Requested byte count
        size: u64,
        /// Valid length of the file
        length: u64,
    },
}

impl ArchiveError {
    pub(crate) fn format(msg: impl Into<String>) -> Self {
        ArchiveError::Format(msg.into())
    }

    /// Machine-readable category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ArchiveError::Format(_) => ErrorKind::Format,
            ArchiveError::UnknownIndex { .. } => ErrorKind::UnknownIndex,
            ArchiveError::OutOfRange { .. } => ErrorKind::OutOfRange,
        }
    }
}

/// Category of a failure reported across the worker boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Format,
    UnknownIndex,
    OutOfRange,
}

/// Serializable form of an [`ArchiveError`] carried inside a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{message}")]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    /// Length of the addressed file, set for `out_of_range` failures.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub valid_length: Option<u64>,
}

impl From<&ArchiveError> for ErrorPayload {
    fn from(err: &ArchiveError) -> Self {
        let valid_length = match err {
            ArchiveError::OutOfRange { length, .. } => Some(*length),
            _ => None,
        };
        Self {
            kind: err.kind(),
            message: err.to_string(),
            valid_length,
        }
    }
}

impl From<ArchiveError> for ErrorPayload {
    fn from(err: ArchiveError) -> Self {
        ErrorPayload::from(&err)
    }
}
