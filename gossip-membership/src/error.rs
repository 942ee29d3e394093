use thiserror::Error;

/// Malformed wire payload. The message carrying it is dropped.
#[derive(Debug, Clone, Eq, PartialEq, Error)]
pub enum FormatError {
    #[error("buffer truncated, expected {expected} bytes but got {actual}")]
    Truncated { expected: usize, actual: usize },
    #[error("entry block of {len} bytes is not a multiple of the {record} byte record")]
    Misaligned { len: u64, record: usize },
    #[error("unknown message kind {0}")]
    UnknownKind(u32),
    #[error("record decode failed: {0}")]
    Record(String),
}

#[derive(Debug, Clone, Eq, PartialEq, Error)]
#[error("invalid address `{0}`, expected a.b.c.d:port")]
pub struct AddressParseError(pub String);
