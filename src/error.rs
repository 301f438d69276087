//! Error types for procsym.
//!
//! Callers of [`crate::open`] only ever see success or absence; these types
//! carry the cause internally so it can be logged before being collapsed.

use thiserror::Error;

use crate::codec::CodecError;
use crate::formats::elf::ElfError;

/// Main error type for module enumeration and loading.
#[derive(Debug, Error)]
pub enum DlError {
    /// No loaded image matched the requested name
    #[error("No loaded image matches {0:?}")]
    NotFound(String),

    /// ELF structures could not be decoded
    #[error("Malformed image: {0}")]
    MalformedImage(#[from] ElfError),

    /// A structure required for lookup is absent
    #[error("Missing {0}")]
    MissingStructure(&'static str),

    /// File open/stat/map errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Embedded debug data could not be decompressed
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The enumeration primitive itself failed
    #[error("Enumeration failed: {0}")]
    Enumeration(String),
}

/// Result type alias for procsym operations
pub type Result<T> = std::result::Result<T, DlError>;
