//! Error types for schema definition and encode/decode calls.

use pack_buffers::BufferError;
use thiserror::Error;

/// Raised while defining a schema, never during encode/decode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("{path}: fixed length must be positive")]
    NonPositiveLength { path: String },
    #[error("{path}: field name must not be empty")]
    EmptyFieldName { path: String },
    #[error("{path}: duplicate field `{name}`")]
    DuplicateField { path: String, name: String },
    #[error("{path}: enum `{name}` must have between 1 and 65536 items, got {count}")]
    EnumCapacity {
        path: String,
        name: String,
        count: usize,
    },
    #[error("{path}: enum `{name}` lists item `{item}` twice")]
    DuplicateEnumItem {
        path: String,
        name: String,
        item: String,
    },
    #[error("{path}: enum `{name}` uses value {value} for more than one item")]
    DuplicateEnumValue {
        path: String,
        name: String,
        value: u16,
    },
}

/// Raised by a single write or read call. The call produces no output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PackError {
    #[error("{kind} holds at most {max} items, got {len}")]
    CapacityExceeded {
        kind: &'static str,
        len: usize,
        max: usize,
    },
    #[error("{kind} expects exactly {expected} bytes, got {actual}")]
    FixedLengthMismatch {
        kind: &'static str,
        expected: usize,
        actual: usize,
    },
    #[error("{value} does not fit in {kind}")]
    OutOfRange { kind: &'static str, value: String },
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
    #[error("missing required field `{0}`")]
    MissingField(String),
    #[error("`{item}` is not an item of enum `{name}`")]
    UnknownEnumItem { name: String, item: String },
    #[error("buffer underrun: {0}")]
    BufferUnderrun(BufferError),
    #[error("invalid UTF-8 at offset {offset}")]
    InvalidUtf8 { offset: usize },
    #[error("invalid {kind} data: {detail}")]
    InvalidData { kind: &'static str, detail: String },
    #[error("instance was not tagged before emission")]
    UntaggedInstance,
    #[error("object `{prototype}`: {detail}")]
    Object { prototype: String, detail: String },
}

impl From<BufferError> for PackError {
    fn from(err: BufferError) -> Self {
        match err {
            BufferError::InvalidUtf8 { offset } => PackError::InvalidUtf8 { offset },
            other => PackError::BufferUnderrun(other),
        }
    }
}

pub type Result<T, E = PackError> = std::result::Result<T, E>;
