//! BitCursor fixed-width and bit-packing matrix.

use pack_buffers::{BitCursor, BufferError};
use proptest::prelude::*;

// ---------------------------------------------------------------------------
// Fixed-width roundtrip matrix
// ---------------------------------------------------------------------------

#[test]
fn roundtrip_fixed_width_matrix() {
    let mut w = BitCursor::new(vec![0u8; 1 + 1 + 2 + 2 + 4 + 4 + 4 + 8 + 8]);
    w.write_u8(u8::MAX);
    w.write_i8(i8::MIN);
    w.write_u16(0xbeef);
    w.write_i16(-1000);
    w.write_u32(0xdead_beef);
    w.write_i32(i32::MIN);
    w.write_f32(2.5);
    w.write_f64(-1.0e300);
    w.write_i64(-1_700_000_000_000);
    assert_eq!(w.x, w.len());

    let data = w.into_inner();
    let mut r = BitCursor::new(data.as_slice());
    assert_eq!(r.u8(), u8::MAX);
    assert_eq!(r.i8(), i8::MIN);
    assert_eq!(r.u16(), 0xbeef);
    assert_eq!(r.i16(), -1000);
    assert_eq!(r.u32(), 0xdead_beef);
    assert_eq!(r.i32(), i32::MIN);
    assert_eq!(r.f32(), 2.5);
    assert_eq!(r.f64(), -1.0e300);
    assert_eq!(r.i64(), -1_700_000_000_000);
    assert_eq!(r.remaining(), 0);
}

#[test]
fn byte_order_is_little_endian() {
    let mut w = BitCursor::new(vec![0u8; 8]);
    w.write_u32(0x0102_0304);
    w.write_f32(1.0);
    assert_eq!(w.into_inner(), vec![0x04, 0x03, 0x02, 0x01, 0x00, 0x00, 0x80, 0x3f]);
}

#[test]
fn ensure_reports_remaining() {
    let data = [0u8; 3];
    let mut r = BitCursor::new(&data[..]);
    r.move_cursor(1);
    assert_eq!(r.ensure(2), Ok(()));
    assert_eq!(
        r.ensure(3),
        Err(BufferError::EndOfBuffer {
            offset: 1,
            needed: 3,
            remaining: 2
        })
    );
}

// ---------------------------------------------------------------------------
// Bit-packing
// ---------------------------------------------------------------------------

#[test]
fn several_fields_share_one_window() {
    let mut w = BitCursor::new(vec![0u8; 4]);
    w.write_n_bit_uint(5, 0, 17);
    w.write_n_bit_int(7, 5, -33);
    w.write_n_bit_uint(20, 12, 0xf_abcd);
    assert_eq!(w.x, 0);

    let data = w.into_inner();
    let r = BitCursor::new(data.as_slice());
    assert_eq!(r.n_bit_uint(5, 0), 17);
    assert_eq!(r.n_bit_int(7, 5), -33);
    assert_eq!(r.n_bit_uint(20, 12), 0xf_abcd);
}

#[test]
fn n_bit_float_in_window() {
    let mut w = BitCursor::new(vec![0u8; 4]);
    w.write_n_bit_float(4, 11, 0, 0.5);
    w.write_n_bit_float(4, 11, 16, -0.25);
    let data = w.into_inner();
    let r = BitCursor::new(data.as_slice());
    assert_eq!(r.n_bit_float(4, 11, 0), 0.5);
    assert_eq!(r.n_bit_float(4, 11, 16), -0.25);
}

fn width_and_offset() -> impl Strategy<Value = (u32, u32)> {
    (1u32..=32).prop_flat_map(|n| (Just(n), 0..=(32 - n)))
}

proptest! {
    #[test]
    fn n_bit_uint_roundtrip((n, offset) in width_and_offset(), raw in any::<u32>()) {
        let value = if n == 32 { raw } else { raw & ((1u32 << n) - 1) };
        let mut w = BitCursor::new(vec![0u8; 4]);
        w.write_n_bit_uint(n, offset, value);
        let data = w.into_inner();
        let r = BitCursor::new(data.as_slice());
        prop_assert_eq!(r.n_bit_uint(n, offset), value);
    }

    #[test]
    fn n_bit_int_roundtrip((n, offset) in width_and_offset(), raw in any::<i32>()) {
        let shift = 32 - n;
        let value = (raw << shift) >> shift;
        let mut w = BitCursor::new(vec![0u8; 4]);
        w.write_n_bit_int(n, offset, value);
        let data = w.into_inner();
        let r = BitCursor::new(data.as_slice());
        prop_assert_eq!(r.n_bit_int(n, offset), value);
    }

    #[test]
    fn n_bit_write_leaves_other_bits((n, offset) in width_and_offset(), fill in any::<u32>(), raw in any::<u32>()) {
        let mut w = BitCursor::new(fill.to_le_bytes().to_vec());
        w.write_n_bit_uint(n, offset, raw);
        let data = w.into_inner();
        let after = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        let field = if n == 32 { u32::MAX } else { ((1u32 << n) - 1) << offset };
        prop_assert_eq!(after & !field, fill & !field);
    }
}
