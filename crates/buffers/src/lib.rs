//! Binary cursor utilities for Pack.
//!
//! # Overview
//!
//! - [`BitCursor`] - Reads and writes a fixed buffer at byte and bit offsets
//! - [`encode_minifloat`] / [`decode_minifloat`] - Custom small float formats
//!
//! # Example
//!
//! ```
//! use pack_buffers::BitCursor;
//!
//! let mut writer = BitCursor::new(vec![0u8; 8]);
//! writer.write_u8(0x01);
//! writer.write_u16(0x0203);
//! writer.write_bytes(b"hello");
//! let data = writer.into_inner();
//!
//! let mut reader = BitCursor::new(data.as_slice());
//! assert_eq!(reader.u8(), 0x01);
//! assert_eq!(reader.u16(), 0x0203);
//! assert_eq!(reader.string(5).unwrap(), "hello");
//! ```

mod cursor;
mod minifloat;

pub use cursor::BitCursor;
pub use minifloat::{decode_minifloat, encode_minifloat, MAX_EXPONENT_BITS};

use thiserror::Error;

/// Error type for checked buffer operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    /// Fewer bytes remain than an operation needs.
    #[error("end of buffer at offset {offset}: needed {needed} bytes, {remaining} remaining")]
    EndOfBuffer {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    /// Invalid UTF-8 sequence.
    #[error("invalid UTF-8 sequence at offset {offset}")]
    InvalidUtf8 { offset: usize },
}
