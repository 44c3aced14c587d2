//! Byte- and bit-addressable cursor over a fixed buffer.

use std::str;

use crate::minifloat::{decode_minifloat, encode_minifloat};
use crate::BufferError;

/// A cursor over a fixed-size byte buffer.
///
/// Fixed-width reads and writes are little-endian and advance the cursor by
/// their width. The `n_bit_*` family addresses a 32-bit window that starts at
/// the current offset and never moves the cursor; callers advance it with
/// [`BitCursor::move_cursor`] once every field sharing the window is done.
///
/// Offsets are not bounds-checked. Moving outside the buffer is allowed, and
/// the next access outside it panics on slice indexing. Composite decoders
/// call [`BitCursor::ensure`] first when they want a recoverable error.
///
/// # Example
///
/// ```
/// use pack_buffers::BitCursor;
///
/// let mut w = BitCursor::new(vec![0u8; 6]);
/// w.write_u16(0x0201);
/// w.write_n_bit_uint(3, 0, 0b101);
/// w.write_n_bit_int(5, 3, -4);
/// w.move_cursor(1);
/// w.write_u8(0xff);
///
/// let data = w.into_inner();
/// assert_eq!(&data[..2], &[0x01, 0x02]);
///
/// let mut r = BitCursor::new(data.as_slice());
/// assert_eq!(r.u16(), 0x0201);
/// assert_eq!(r.n_bit_uint(3, 0), 0b101);
/// assert_eq!(r.n_bit_int(5, 3), -4);
/// r.move_cursor(1);
/// assert_eq!(r.u8(), 0xff);
/// ```
#[derive(Debug, Clone)]
pub struct BitCursor<B> {
    /// The underlying buffer.
    pub uint8: B,
    /// Current byte offset.
    pub x: usize,
}

#[inline]
fn mask(count: u32) -> u64 {
    (1u64 << count) - 1
}

#[inline]
fn span(count: u32, bit_offset: u32) -> usize {
    ((bit_offset + count + 7) / 8) as usize
}

impl<B: AsRef<[u8]>> BitCursor<B> {
    /// Creates a cursor at offset 0.
    pub fn new(uint8: B) -> Self {
        Self { uint8, x: 0 }
    }

    /// Consumes the cursor and returns the buffer.
    pub fn into_inner(self) -> B {
        self.uint8
    }

    /// Total buffer length in bytes.
    pub fn len(&self) -> usize {
        self.uint8.as_ref().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes left between the offset and the end of the buffer.
    pub fn remaining(&self) -> usize {
        self.len().saturating_sub(self.x)
    }

    /// Fails with [`BufferError::EndOfBuffer`] unless `n` more bytes exist.
    pub fn ensure(&self, n: usize) -> Result<(), BufferError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(BufferError::EndOfBuffer {
                offset: self.x,
                needed: n,
                remaining,
            });
        }
        Ok(())
    }

    /// Shifts the offset by `delta` bytes, forwards or backwards.
    ///
    /// The new offset is not checked against the buffer.
    #[inline]
    pub fn move_cursor(&mut self, delta: isize) {
        self.x = self.x.wrapping_add_signed(delta);
    }

    #[inline]
    fn array<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        out.copy_from_slice(&self.uint8.as_ref()[self.x..self.x + N]);
        self.x += N;
        out
    }

    /// Reads an unsigned 8-bit integer.
    #[inline]
    pub fn u8(&mut self) -> u8 {
        let val = self.uint8.as_ref()[self.x];
        self.x += 1;
        val
    }

    /// Reads a signed 8-bit integer.
    #[inline]
    pub fn i8(&mut self) -> i8 {
        self.u8() as i8
    }

    #[inline]
    pub fn u16(&mut self) -> u16 {
        u16::from_le_bytes(self.array())
    }

    #[inline]
    pub fn i16(&mut self) -> i16 {
        i16::from_le_bytes(self.array())
    }

    #[inline]
    pub fn u32(&mut self) -> u32 {
        u32::from_le_bytes(self.array())
    }

    #[inline]
    pub fn i32(&mut self) -> i32 {
        i32::from_le_bytes(self.array())
    }

    #[inline]
    pub fn u64(&mut self) -> u64 {
        u64::from_le_bytes(self.array())
    }

    #[inline]
    pub fn i64(&mut self) -> i64 {
        i64::from_le_bytes(self.array())
    }

    #[inline]
    pub fn f32(&mut self) -> f32 {
        f32::from_le_bytes(self.array())
    }

    #[inline]
    pub fn f64(&mut self) -> f64 {
        f64::from_le_bytes(self.array())
    }

    /// Reads `count` bits starting `bit_offset` bits past the offset.
    ///
    /// Only the bytes the field covers are touched.
    fn read_bits(&self, count: u32, bit_offset: u32) -> u64 {
        debug_assert!(count >= 1 && bit_offset + count <= 32);
        let buf = self.uint8.as_ref();
        let mut word = 0u64;
        for i in 0..span(count, bit_offset) {
            word |= (buf[self.x + i] as u64) << (8 * i);
        }
        (word >> bit_offset) & mask(count)
    }

    /// Reads an `n`-bit unsigned integer at `bit_offset` (0–31) within the
    /// 32-bit window at the offset. Does not move the cursor.
    pub fn n_bit_uint(&self, n: u32, bit_offset: u32) -> u32 {
        self.read_bits(n, bit_offset) as u32
    }

    /// Reads an `n`-bit two's-complement integer at `bit_offset`. Does not
    /// move the cursor.
    pub fn n_bit_int(&self, n: u32, bit_offset: u32) -> i32 {
        let raw = self.read_bits(n, bit_offset);
        let shift = 64 - n;
        (((raw << shift) as i64) >> shift) as i32
    }

    /// Reads a float with `n` exponent bits and `m` mantissa bits (plus a
    /// sign bit) at `bit_offset`. Requires `n + m <= 31 - bit_offset` and
    /// `n <= MAX_EXPONENT_BITS` (10). Does not move the cursor.
    pub fn n_bit_float(&self, n: u32, m: u32, bit_offset: u32) -> f64 {
        let bits = self.read_bits(n + m + 1, bit_offset) as u32;
        decode_minifloat(bits, n, m)
    }
}

impl<'a> BitCursor<&'a [u8]> {
    /// Returns the next `count` bytes and advances past them.
    pub fn bytes(&mut self, count: usize) -> &'a [u8] {
        let start = self.x;
        self.x += count;
        &self.uint8[start..self.x]
    }

    /// Reads a UTF-8 string of `count` bytes and advances past it.
    pub fn string(&mut self, count: usize) -> Result<&'a str, BufferError> {
        let offset = self.x;
        let data = self.bytes(count);
        std::str::from_utf8(data).map_err(|_| BufferError::InvalidUtf8 { offset })
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitCursor<B> {
    #[inline]
    fn put<const N: usize>(&mut self, data: [u8; N]) {
        self.uint8.as_mut()[self.x..self.x + N].copy_from_slice(&data);
        self.x += N;
    }

    #[inline]
    pub fn write_u8(&mut self, val: u8) {
        self.put([val]);
    }

    #[inline]
    pub fn write_i8(&mut self, val: i8) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_u16(&mut self, val: u16) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_i16(&mut self, val: i16) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_u32(&mut self, val: u32) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_i32(&mut self, val: i32) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_u64(&mut self, val: u64) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_i64(&mut self, val: i64) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_f32(&mut self, val: f32) {
        self.put(val.to_le_bytes());
    }

    #[inline]
    pub fn write_f64(&mut self, val: f64) {
        self.put(val.to_le_bytes());
    }

    /// Copies `data` in at the offset and advances past it.
    pub fn write_bytes(&mut self, data: &[u8]) {
        let end = self.x + data.len();
        self.uint8.as_mut()[self.x..end].copy_from_slice(data);
        self.x = end;
    }

    /// Writes `count` low bits of `value` at `bit_offset`, keeping every
    /// other bit of the touched bytes.
    fn write_bits(&mut self, count: u32, bit_offset: u32, value: u64) {
        debug_assert!(count >= 1 && bit_offset + count <= 32);
        let x = self.x;
        let bytes = span(count, bit_offset);
        let buf = self.uint8.as_mut();
        let mut word = 0u64;
        for i in 0..bytes {
            word |= (buf[x + i] as u64) << (8 * i);
        }
        let field = mask(count) << bit_offset;
        word = (word & !field) | ((value << bit_offset) & field);
        for i in 0..bytes {
            buf[x + i] = (word >> (8 * i)) as u8;
        }
    }

    /// Writes an `n`-bit unsigned integer at `bit_offset`. Bits of `value`
    /// above `n` are dropped. Does not move the cursor.
    pub fn write_n_bit_uint(&mut self, n: u32, bit_offset: u32, value: u32) {
        self.write_bits(n, bit_offset, value as u64);
    }

    /// Writes an `n`-bit two's-complement integer at `bit_offset`. Does not
    /// move the cursor.
    pub fn write_n_bit_int(&mut self, n: u32, bit_offset: u32, value: i32) {
        self.write_bits(n, bit_offset, value as u32 as u64);
    }

    /// Writes `value` as a float with `n` exponent and `m` mantissa bits at
    /// `bit_offset`, saturating at the largest finite value. The limits of
    /// [`BitCursor::n_bit_float`] apply. Does not move the cursor.
    pub fn write_n_bit_float(&mut self, n: u32, m: u32, bit_offset: u32, value: f64) {
        let bits = encode_minifloat(value, n, m);
        self.write_bits(n + m + 1, bit_offset, bits as u64);
    }
}
