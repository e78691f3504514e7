use std::path::PathBuf;
use thiserror::Error;

/// Why a single tag-file line was rejected.
///
/// Bulk operations never surface these to the caller; the offending line is
/// logged and skipped.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// `!_TAG_...` pseudo-tag (metadata header)
    #[error("header line")]
    Header,

    #[error("line does not match the tag grammar")]
    Grammar,

    #[error("malformed extension field (missing ':'): {field:?}")]
    MalformedField { field: String },
}

#[derive(Error, Debug)]
pub enum TagStoreError {
    #[error("Tag file not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),
}

pub type Result<T> = std::result::Result<T, TagStoreError>;
