use oocmap_core::FormatError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OocMapError {
    /// The looked-up key is not present. Also raised for keys whose encoding
    /// proves they cannot be present (see [`OocMapError::ImmutableValueNotFound`]).
    #[error("key not found: {0}")]
    KeyNotFound(String),

    #[error("unhashable value kind: {0}")]
    Unhashable(&'static str),

    #[error("expected a {expected}, got a {actual}")]
    KindMismatch {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },

    /// A read-only encode looked up a content hash that is not in its table.
    /// At lookup boundaries this means the key cannot exist.
    #[error("immutable value is not present in the store")]
    ImmutableValueNotFound,

    /// A list or dict was encoded where a hashable value is required.
    #[error("mutable value not allowed here")]
    MutableValueNotAllowed,

    /// An encode branch would have written during a read-side operation.
    #[error("write not allowed in a read-only operation")]
    WriteNotAllowed,

    /// A stored record has the wrong size or shape. Data corruption.
    #[error("stored record has unexpected size or shape")]
    UnexpectedData,

    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("database error: {0}")]
    Db(#[from] lmdb::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, OocMapError>;

impl OocMapError {
    /// True for the errors that mean "this key cannot be in the store",
    /// which lookup boundaries translate into a missing-key report.
    pub(crate) fn proves_absence(&self) -> bool {
        matches!(
            self,
            OocMapError::ImmutableValueNotFound | OocMapError::WriteNotAllowed
        )
    }
}
