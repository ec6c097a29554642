use std::io;
use thiserror::Error;

/// Result type for mobi-forge operations
pub type Result<T> = std::result::Result<T, MobiError>;

/// Unified error type for layout, codec and container operations
#[derive(Debug, Error)]
pub enum MobiError {
    // Layout errors
    #[error("Unresolved {kind} reference: '{key}' is not defined")]
    UnresolvedReference { kind: &'static str, key: String },

    #[error("Layout is locked, cannot {0}")]
    LockViolation(&'static str),

    #[error("Layout is not locked, call lock() before write()")]
    NotLocked,

    #[error("Label defined more than once: {0}")]
    DuplicateLabel(String),

    #[error("Negative length: '{end}' precedes '{start}'")]
    NegativeLength { start: String, end: String },

    #[error("Invalid integer slot width: {0} (expected 1..=8)")]
    InvalidWidth(usize),

    #[error("Value for '{key}' does not fit in {width} bytes")]
    ValueOverflow { key: String, width: usize },

    #[error("Unknown layout buffer: {0}")]
    UnknownBuffer(usize),

    // Container errors
    #[error("Unknown metadata field: {0}")]
    UnknownField(String),

    #[error("Invalid value for metadata field '{field}': {reason}")]
    InvalidFieldValue { field: String, reason: String },

    #[error("Image {index} is {size} bytes (max {max})")]
    UnsupportedImageSize { index: usize, size: usize, max: usize },

    #[error("Invalid format configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid container format: {0}")]
    InvalidFormat(String),

    #[error("Decompression failed: {0}")]
    DecompressionFailed(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    // Serialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    TomlError(String),
}

impl From<toml::de::Error> for MobiError {
    fn from(err: toml::de::Error) -> Self {
        MobiError::TomlError(err.to_string())
    }
}

impl From<toml::ser::Error> for MobiError {
    fn from(err: toml::ser::Error) -> Self {
        MobiError::TomlError(err.to_string())
    }
}
