use thiserror::Error;

/// Errors produced by the record format itself, independent of any store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("unknown type code {0}")]
    UnknownTypeCode(u8),

    #[error("unknown hardcoded value {0}")]
    UnknownHardcodedValue(u64),

    #[error("unsupported value kind: {0}")]
    UnsupportedKind(&'static str),

    #[error("encoded record is {actual} bytes, expected {expected}")]
    BadRecordLength { expected: usize, actual: usize },

    #[error("text payload of {len} bytes is not a multiple of the {width}-byte unit")]
    MisalignedText { len: usize, width: usize },

    #[error("invalid code unit {0:#x}")]
    InvalidCodeUnit(u32),
}
