//! Error types for the storage layer.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type.
#[derive(Error, Debug)]
pub enum Error {
    /// A sibling object or property with this name already exists.
    #[error("Duplicate name '{name}' under '{parent}'")]
    DuplicateName { parent: String, name: String },

    /// Positional lookup past the end of a collection.
    #[error("Index {index} out of range (count: {count})")]
    OutOfRange { index: usize, count: usize },

    /// Negative sample index or unknown time-sampling index.
    #[error("Invalid index: {0}")]
    InvalidIndex(i64),

    /// An instance would make the hierarchy reach itself.
    #[error("Cyclic instance: '{instance}' cannot target '{target}'")]
    CyclicInstance { instance: String, target: String },

    /// The storage backend failed to open a file.
    #[error("Failed to open '{}' with the {engine} engine: {reason}", path.display())]
    ArchiveOpenFailed {
        path: PathBuf,
        engine: String,
        reason: String,
    },

    /// Property exists but has the wrong shape or contents.
    #[error("Malformed property '{name}': {reason}")]
    MalformedProperty { name: String, reason: String },

    /// Extent 0 or an element type that cannot carry samples.
    #[error("Invalid data type: {0}")]
    InvalidDataType(String),

    /// Time sampling definition rejected at construction.
    #[error("Invalid time sampling: {0}")]
    InvalidTimeSampling(String),

    /// `set_from_previous` on a property with no samples yet.
    #[error("Property '{0}' has no previous sample")]
    NoPreviousSample(String),

    /// Layering in strict mode found a compound/leaf clash.
    #[error("Layer conflict at '{name}': {previous} overridden by {current}")]
    LayerConflict {
        name: String,
        previous: String,
        current: String,
    },

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Type mismatch: expected {expected}, got {actual}")]
    TypeMismatch { expected: String, actual: String },

    #[error("Invalid archive: magic bytes not recognized")]
    InvalidMagic,

    #[error("Unsupported archive version: {0}")]
    UnsupportedVersion(u16),

    #[error("Unexpected end of file at position {0}")]
    UnexpectedEof(u64),

    #[error("Invalid file structure: {0}")]
    InvalidStructure(String),

    #[error("Invalid metadata: {0}")]
    InvalidMetadata(String),

    /// Archive already closed.
    #[error("Archive is closed and cannot be modified")]
    Frozen,

    #[error("Memory mapping failed: {0}")]
    MmapFailed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidStructure(msg.into())
    }

    pub fn malformed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedProperty {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn mismatch(expected: impl ToString, actual: impl ToString) -> Self {
        Self::TypeMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = Error::OutOfRange { index: 5, count: 3 };
        assert!(e.to_string().contains('5'));
        assert!(e.to_string().contains('3'));

        let e = Error::ArchiveOpenFailed {
            path: PathBuf::from("/tmp/missing.abc"),
            engine: "ogawa".into(),
            reason: "not found".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("/tmp/missing.abc"));
        assert!(msg.contains("ogawa"));
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "test");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
