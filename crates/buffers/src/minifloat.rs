//! Small custom floating point formats.
//!
//! A format is a sign bit, `n` exponent bits and `m` mantissa bits, laid out
//! from low to high as `[mantissa | exponent | sign]`. The exponent bias is
//! `2^(n-1) - 1`. An exponent field of zero holds zero and the subnormals;
//! every other field is a normal number, so there is no Inf or NaN.
//!
//! `n` may be at most [`MAX_EXPONENT_BITS`]. A wider exponent reaches past
//! the range of `f64`, where the largest field would decode as infinity.

/// Widest exponent whose every value is a finite `f64`.
pub const MAX_EXPONENT_BITS: u32 = 10;

#[inline]
fn bias(n: u32) -> i32 {
    (1i32 << (n - 1)) - 1
}

/// Decodes the low `n + m + 1` bits of `bits`.
///
/// # Example
///
/// ```
/// use pack_buffers::decode_minifloat;
///
/// // 1.0 in a 4-bit exponent, 3-bit mantissa format.
/// assert_eq!(decode_minifloat(0b0_0111_000, 4, 3), 1.0);
/// assert_eq!(decode_minifloat(0b1_1000_100, 4, 3), -3.0);
/// ```
pub fn decode_minifloat(bits: u32, n: u32, m: u32) -> f64 {
    debug_assert!((1..=MAX_EXPONENT_BITS).contains(&n) && n + m <= 31);
    let mantissa = (bits as u64) & ((1u64 << m) - 1);
    let field = ((bits as u64) >> m) & ((1u64 << n) - 1);
    let negative = ((bits as u64) >> (n + m)) & 1 == 1;
    let fraction = mantissa as f64 / (1u64 << m) as f64;
    let magnitude = if field == 0 {
        fraction * 2f64.powi(1 - bias(n))
    } else {
        (1.0 + fraction) * 2f64.powi(field as i32 - bias(n))
    };
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

/// Encodes `value`, rounding to nearest.
///
/// Magnitudes beyond the format's range (infinities included) saturate to
/// the largest finite value. NaN encodes as positive zero.
pub fn encode_minifloat(value: f64, n: u32, m: u32) -> u32 {
    debug_assert!((1..=MAX_EXPONENT_BITS).contains(&n) && n + m <= 31);
    if value.is_nan() {
        return 0;
    }
    let sign = if value.is_sign_negative() {
        1u32 << (n + m)
    } else {
        0
    };
    let abs = value.abs();
    if abs == 0.0 {
        return sign;
    }

    let max_field = ((1u64 << n) - 1) as u32;
    let max_mantissa = ((1u64 << m) - 1) as u32;
    let largest = (max_field << m) | max_mantissa;
    if abs >= decode_minifloat(largest, n, m) {
        return sign | largest;
    }

    let scale = (1u64 << m) as f64;
    let min_normal = 2f64.powi(1 - bias(n));
    if abs < min_normal {
        // Rounding up to 2^m lands exactly on the smallest normal.
        let mantissa = (abs / min_normal * scale).round() as u32;
        return sign | mantissa;
    }

    let mut exponent = abs.log2().floor() as i32;
    if 2f64.powi(exponent) > abs {
        exponent -= 1;
    } else if 2f64.powi(exponent + 1) <= abs {
        exponent += 1;
    }
    let fraction = abs / 2f64.powi(exponent) - 1.0;
    let mut mantissa = (fraction * scale).round() as u32;
    let mut field = (exponent + bias(n)) as u32;
    if mantissa > max_mantissa {
        mantissa = 0;
        field += 1;
        if field > max_field {
            return sign | largest;
        }
    }
    sign | (field << m) | mantissa
}
