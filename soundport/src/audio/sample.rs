//! Sample format conversions
//!
//! Converts between application-facing `f32` samples in `[-1.0, 1.0]` and the
//! fixed-point formats devices speak natively.
//!
//! # Quantisation
//!
//! - Integer to float divides by `2^(bits-1)`, so the most negative code maps
//!   to exactly `-1.0` and the most positive code sits one step below `1.0`.
//! - Unsigned formats are offset by their midpoint first.
//! - Float to integer clamps, scales, rounds half to even and saturates.
//! - Integer-first round trips are exact up to 24 bits. Wider integers pass
//!   through `f32` and keep only its 24-bit mantissa.
//!
//! # Example
//!
//! ```
//! use soundport::audio::sample::{Sample, I24};
//!
//! let native = i16::from_f32(0.5);
//! assert_eq!(native, 16384);
//! assert_eq!(native.to_f32(), 0.5);
//!
//! let packed = I24::from_i32(-1);
//! assert_eq!(packed.to_i32(), -1);
//! ```

use serde::{Deserialize, Serialize};

/// Native sample formats understood by the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SampleFormat {
    /// Signed 8-bit integer
    I8,
    /// Unsigned 8-bit integer (midpoint 128)
    U8,
    /// Signed 16-bit integer
    I16,
    /// Unsigned 16-bit integer (midpoint 32768)
    U16,
    /// Signed 24-bit integer in a 32-bit container
    I24,
    /// Unsigned 24-bit integer in a 32-bit container
    U24,
    /// Signed 32-bit integer
    I32,
    /// Unsigned 32-bit integer (midpoint 2^31)
    U32,
    /// Signed 64-bit integer
    I64,
    /// Unsigned 64-bit integer (midpoint 2^63)
    U64,
    /// 32-bit IEEE float
    F32,
    /// 64-bit IEEE float
    F64,
}

impl SampleFormat {
    /// Every format, narrowest first
    pub const ALL: [SampleFormat; 12] = [
        SampleFormat::I8,
        SampleFormat::U8,
        SampleFormat::I16,
        SampleFormat::U16,
        SampleFormat::I24,
        SampleFormat::U24,
        SampleFormat::I32,
        SampleFormat::U32,
        SampleFormat::F32,
        SampleFormat::I64,
        SampleFormat::U64,
        SampleFormat::F64,
    ];

    /// Significant bits per sample
    pub fn bits(&self) -> u32 {
        match self {
            SampleFormat::I8 | SampleFormat::U8 => 8,
            SampleFormat::I16 | SampleFormat::U16 => 16,
            SampleFormat::I24 | SampleFormat::U24 => 24,
            SampleFormat::I32 | SampleFormat::U32 | SampleFormat::F32 => 32,
            SampleFormat::I64 | SampleFormat::U64 | SampleFormat::F64 => 64,
        }
    }

    /// Bytes occupied in packed form (24-bit formats pack into 3 bytes)
    pub fn packed_size(&self) -> usize {
        (self.bits() / 8) as usize
    }

    /// Whether this is a floating point format
    pub fn is_float(&self) -> bool {
        matches!(self, SampleFormat::F32 | SampleFormat::F64)
    }

    /// Whether this is a signed integer or float format
    pub fn is_signed(&self) -> bool {
        !matches!(
            self,
            SampleFormat::U8
                | SampleFormat::U16
                | SampleFormat::U24
                | SampleFormat::U32
                | SampleFormat::U64
        )
    }

    /// Size of one quantisation step in the float domain
    ///
    /// Float formats travel through `f32`, so both report its epsilon.
    pub fn step(&self) -> f32 {
        match self {
            SampleFormat::F32 | SampleFormat::F64 => f32::EPSILON,
            other => 1.0 / (1u64 << (other.bits() - 1)) as f32,
        }
    }
}

impl std::fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SampleFormat::I8 => "i8",
            SampleFormat::U8 => "u8",
            SampleFormat::I16 => "i16",
            SampleFormat::U16 => "u16",
            SampleFormat::I24 => "i24",
            SampleFormat::U24 => "u24",
            SampleFormat::I32 => "i32",
            SampleFormat::U32 => "u32",
            SampleFormat::I64 => "i64",
            SampleFormat::U64 => "u64",
            SampleFormat::F32 => "f32",
            SampleFormat::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Signed 24-bit sample stored in the low bits of an `i32`
///
/// The stored value is always masked to 24 bits; bit 23 is the sign bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct I24(i32);

impl I24 {
    /// Smallest representable value
    pub const MIN: I24 = I24(0x80_0000);
    /// Largest representable value
    pub const MAX: I24 = I24(0x7F_FFFF);
    /// Zero
    pub const ZERO: I24 = I24(0);

    /// Truncate a 32-bit value to its low 24 bits
    pub const fn from_i32(value: i32) -> Self {
        Self(value & 0xFF_FFFF)
    }

    /// Read back as a sign-extended 32-bit value
    pub const fn to_i32(self) -> i32 {
        (self.0 << 8) >> 8
    }

    /// Raw masked bits
    pub const fn bits(self) -> u32 {
        self.0 as u32
    }

    /// Packed little-endian representation
    pub fn to_le_bytes(self) -> [u8; 3] {
        let [b0, b1, b2, _] = self.0.to_le_bytes();
        [b0, b1, b2]
    }

    /// Unpack from little-endian bytes
    pub fn from_le_bytes(bytes: [u8; 3]) -> Self {
        Self::from_i32(i32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }
}

impl From<I24> for i32 {
    fn from(value: I24) -> Self {
        value.to_i32()
    }
}

/// Unsigned 24-bit sample stored in the low bits of a `u32`
///
/// The stored value is always masked to 24 bits and never sign-extended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct U24(u32);

impl U24 {
    /// Smallest representable value
    pub const MIN: U24 = U24(0);
    /// Largest representable value
    pub const MAX: U24 = U24(0xFF_FFFF);
    /// Midpoint, the unsigned representation of silence
    pub const MID: U24 = U24(0x80_0000);

    /// Truncate a 32-bit value to its low 24 bits
    pub const fn from_i32(value: i32) -> Self {
        Self(value as u32 & 0xFF_FFFF)
    }

    /// Truncate an unsigned 32-bit value to its low 24 bits
    pub const fn from_u32(value: u32) -> Self {
        Self(value & 0xFF_FFFF)
    }

    /// Read back without sign extension
    pub const fn to_u32(self) -> u32 {
        self.0
    }

    /// Packed little-endian representation
    pub fn to_le_bytes(self) -> [u8; 3] {
        let [b0, b1, b2, _] = self.0.to_le_bytes();
        [b0, b1, b2]
    }

    /// Unpack from little-endian bytes
    pub fn from_le_bytes(bytes: [u8; 3]) -> Self {
        Self(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], 0]))
    }
}

impl From<U24> for u32 {
    fn from(value: U24) -> Self {
        value.to_u32()
    }
}

/// A native sample type the realtime callbacks can be monomorphised over
pub trait Sample: Copy + Send + 'static {
    /// Format tag of this type
    const FORMAT: SampleFormat;

    /// Native representation of silence
    const EQUILIBRIUM: Self;

    /// Map to `[-1.0, 1.0]`
    fn to_f32(self) -> f32;

    /// Quantise from float, clamping out-of-range input
    fn from_f32(value: f32) -> Self;
}

/// Clamp to the unit range, mapping NaN to silence
#[inline]
fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() { 0.0 } else { value.clamp(-1.0, 1.0) }
}

/// Scale a unit float by `2^(bits-1)` and round half to even within `[min, max]`
#[inline]
fn quantize(value: f32, scale: f64, min: f64, max: f64) -> f64 {
    (clamp_unit(value) as f64 * scale).round_ties_even().clamp(min, max)
}

const SCALE_8: f64 = 128.0;
const SCALE_16: f64 = 32_768.0;
const SCALE_24: f64 = 8_388_608.0;
const SCALE_32: f64 = 2_147_483_648.0;
const SCALE_64: f64 = 9_223_372_036_854_775_808.0;
const MID_64: u64 = 1 << 63;

impl Sample for i8 {
    const FORMAT: SampleFormat = SampleFormat::I8;
    const EQUILIBRIUM: Self = 0;

    fn to_f32(self) -> f32 {
        (self as f64 / SCALE_8) as f32
    }

    fn from_f32(value: f32) -> Self {
        quantize(value, SCALE_8, i8::MIN as f64, i8::MAX as f64) as i8
    }
}

impl Sample for u8 {
    const FORMAT: SampleFormat = SampleFormat::U8;
    const EQUILIBRIUM: Self = 128;

    fn to_f32(self) -> f32 {
        ((self as f64 - SCALE_8) / SCALE_8) as f32
    }

    fn from_f32(value: f32) -> Self {
        (quantize(value, SCALE_8, i8::MIN as f64, i8::MAX as f64) + SCALE_8) as u8
    }
}

impl Sample for i16 {
    const FORMAT: SampleFormat = SampleFormat::I16;
    const EQUILIBRIUM: Self = 0;

    fn to_f32(self) -> f32 {
        (self as f64 / SCALE_16) as f32
    }

    fn from_f32(value: f32) -> Self {
        quantize(value, SCALE_16, i16::MIN as f64, i16::MAX as f64) as i16
    }
}

impl Sample for u16 {
    const FORMAT: SampleFormat = SampleFormat::U16;
    const EQUILIBRIUM: Self = 32_768;

    fn to_f32(self) -> f32 {
        ((self as f64 - SCALE_16) / SCALE_16) as f32
    }

    fn from_f32(value: f32) -> Self {
        (quantize(value, SCALE_16, i16::MIN as f64, i16::MAX as f64) + SCALE_16) as u16
    }
}

impl Sample for I24 {
    const FORMAT: SampleFormat = SampleFormat::I24;
    const EQUILIBRIUM: Self = I24::ZERO;

    fn to_f32(self) -> f32 {
        (self.to_i32() as f64 / SCALE_24) as f32
    }

    fn from_f32(value: f32) -> Self {
        I24::from_i32(quantize(value, SCALE_24, -SCALE_24, SCALE_24 - 1.0) as i32)
    }
}

impl Sample for U24 {
    const FORMAT: SampleFormat = SampleFormat::U24;
    const EQUILIBRIUM: Self = U24::MID;

    fn to_f32(self) -> f32 {
        ((self.to_u32() as f64 - SCALE_24) / SCALE_24) as f32
    }

    fn from_f32(value: f32) -> Self {
        U24::from_u32((quantize(value, SCALE_24, -SCALE_24, SCALE_24 - 1.0) + SCALE_24) as u32)
    }
}

impl Sample for i32 {
    const FORMAT: SampleFormat = SampleFormat::I32;
    const EQUILIBRIUM: Self = 0;

    fn to_f32(self) -> f32 {
        (self as f64 / SCALE_32) as f32
    }

    fn from_f32(value: f32) -> Self {
        quantize(value, SCALE_32, i32::MIN as f64, i32::MAX as f64) as i32
    }
}

impl Sample for u32 {
    const FORMAT: SampleFormat = SampleFormat::U32;
    const EQUILIBRIUM: Self = 1 << 31;

    fn to_f32(self) -> f32 {
        ((self as f64 - SCALE_32) / SCALE_32) as f32
    }

    fn from_f32(value: f32) -> Self {
        (quantize(value, SCALE_32, i32::MIN as f64, i32::MAX as f64) + SCALE_32) as u32
    }
}

impl Sample for i64 {
    const FORMAT: SampleFormat = SampleFormat::I64;
    const EQUILIBRIUM: Self = 0;

    fn to_f32(self) -> f32 {
        (self as f64 / SCALE_64) as f32
    }

    fn from_f32(value: f32) -> Self {
        // 2^63 saturates to i64::MAX in the cast
        quantize(value, SCALE_64, -SCALE_64, SCALE_64) as i64
    }
}

impl Sample for u64 {
    const FORMAT: SampleFormat = SampleFormat::U64;
    const EQUILIBRIUM: Self = MID_64;

    // The midpoint offset is applied in the integer domain: f64 cannot hold
    // 2^63 plus a small code exactly.
    fn to_f32(self) -> f32 {
        ((self ^ MID_64) as i64).to_f32()
    }

    fn from_f32(value: f32) -> Self {
        (i64::from_f32(value) as u64) ^ MID_64
    }
}

impl Sample for f32 {
    const FORMAT: SampleFormat = SampleFormat::F32;
    const EQUILIBRIUM: Self = 0.0;

    fn to_f32(self) -> f32 {
        clamp_unit(self)
    }

    fn from_f32(value: f32) -> Self {
        clamp_unit(value)
    }
}

impl Sample for f64 {
    const FORMAT: SampleFormat = SampleFormat::F64;
    const EQUILIBRIUM: Self = 0.0;

    fn to_f32(self) -> f32 {
        if self.is_nan() { 0.0 } else { self.clamp(-1.0, 1.0) as f32 }
    }

    fn from_f32(value: f32) -> Self {
        f64::from(clamp_unit(value))
    }
}

/// Convert between two sample types element by element
///
/// Converts `min(src.len(), dst.len())` samples and returns that count.
pub fn convert_slice<S: Sample, D: Sample>(src: &[S], dst: &mut [D]) -> usize {
    let n = src.len().min(dst.len());
    for (out, &sample) in dst[..n].iter_mut().zip(&src[..n]) {
        *out = D::from_f32(sample.to_f32());
    }
    n
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_i24_masks_and_sign_extends() {
        let val = I24::from_i32(0x12345678);
        assert_eq!(val.bits(), 0x345678);
        assert_eq!(val.to_i32(), 0x345678);

        let neg = I24::from_i32(0x00FF_FFFF);
        assert_eq!(neg.to_i32(), -1);

        assert_eq!(I24::MIN.to_i32(), -8_388_608);
        assert_eq!(I24::MAX.to_i32(), 8_388_607);
    }

    #[test]
    fn test_u24_never_sign_extends() {
        let val = U24::from_i32(0x12345678);
        assert_eq!(val.to_u32(), 0x345678);

        let high = U24::from_i32(-1);
        assert_eq!(high.to_u32(), 0xFF_FFFF);
    }

    #[test]
    fn test_24bit_packing() {
        let val = I24::from_i32(-2);
        assert_eq!(val.to_le_bytes(), [0xFE, 0xFF, 0xFF]);
        assert_eq!(I24::from_le_bytes([0xFE, 0xFF, 0xFF]), val);

        let u = U24::from_u32(0x0A0B0C);
        assert_eq!(u.to_le_bytes(), [0x0C, 0x0B, 0x0A]);
        assert_eq!(U24::from_le_bytes(u.to_le_bytes()), u);
    }

    #[test]
    fn test_full_scale_mapping() {
        assert_eq!(i16::MIN.to_f32(), -1.0);
        assert_eq!(i16::from_f32(-1.0), i16::MIN);
        assert_eq!(i16::from_f32(1.0), i16::MAX);
        assert_eq!(i8::from_f32(1.0), i8::MAX);
        assert_eq!(i32::from_f32(1.0), i32::MAX);
        assert_eq!(i32::from_f32(-1.0), i32::MIN);
        assert_eq!(I24::from_f32(1.0), I24::MAX);
        assert_eq!(I24::from_f32(-1.0), I24::MIN);
    }

    #[test]
    fn test_out_of_range_input_is_clamped() {
        assert_eq!(i16::from_f32(4.0), i16::MAX);
        assert_eq!(i16::from_f32(-4.0), i16::MIN);
        assert_eq!(u8::from_f32(2.0), u8::MAX);
        assert_eq!(u8::from_f32(-2.0), 0);
        assert_eq!(f32::from_f32(1.5), 1.0);
        assert_eq!(i16::from_f32(f32::NAN), 0);
    }

    #[test]
    fn test_round_half_to_even() {
        // 0.5 and 1.5 steps below the i8 grid
        assert_eq!(i8::from_f32(0.5 / 128.0), 0);
        assert_eq!(i8::from_f32(1.5 / 128.0), 2);
        assert_eq!(i8::from_f32(-0.5 / 128.0), 0);
        assert_eq!(i8::from_f32(-2.5 / 128.0), -2);
    }

    #[test]
    fn test_unsigned_equilibrium_is_silence() {
        assert_eq!(u8::EQUILIBRIUM.to_f32(), 0.0);
        assert_eq!(u16::EQUILIBRIUM.to_f32(), 0.0);
        assert_eq!(U24::EQUILIBRIUM.to_f32(), 0.0);
        assert_eq!(u16::from_f32(0.0), u16::EQUILIBRIUM);
        assert_eq!(U24::from_f32(0.0), U24::MID);
    }

    #[test]
    fn test_convert_slice() {
        let src = [0.0f32, 0.5, -0.5, 1.0];
        let mut dst = [0i16; 3];
        assert_eq!(convert_slice(&src, &mut dst), 3);
        assert_eq!(dst, [0, 16384, -16384]);
    }

    #[test]
    fn test_format_metadata() {
        assert_eq!(SampleFormat::I24.packed_size(), 3);
        assert_eq!(SampleFormat::F32.packed_size(), 4);
        assert!(!SampleFormat::U24.is_signed());
        assert!(SampleFormat::F32.is_float());
        assert_eq!(SampleFormat::I16.step(), 1.0 / 32768.0);
        assert_eq!(SampleFormat::U24.to_string(), "u24");
        assert_eq!(SampleFormat::F64.packed_size(), 8);
        assert!(!SampleFormat::U64.is_signed());
        assert!(SampleFormat::F64.is_float());
    }

    #[test]
    fn test_wide_formats() {
        assert_eq!(u32::EQUILIBRIUM.to_f32(), 0.0);
        assert_eq!(u32::from_f32(-1.0), 0);
        assert_eq!(u32::from_f32(1.0), u32::MAX);

        assert_eq!(i64::from_f32(1.0), i64::MAX);
        assert_eq!(i64::from_f32(-1.0), i64::MIN);
        assert_eq!(i64::MIN.to_f32(), -1.0);
        assert_eq!(i64::from_f32(0.5), 1 << 62);

        assert_eq!(u64::from_f32(0.0), u64::EQUILIBRIUM);
        assert_eq!(u64::from_f32(-1.0), 0);
        assert_eq!(u64::from_f32(1.0), u64::MAX);
        // One code above the midpoint survives
        let above = u64::EQUILIBRIUM + 1;
        assert_eq!(u64::from_f32(above.to_f32()), above);
        assert_eq!((u64::EQUILIBRIUM + (1 << 40)).to_f32(), 2f32.powi(-23));

        assert_eq!(f64::from_f32(0.25), 0.25);
        assert_eq!(2.0f64.to_f32(), 1.0);
        assert_eq!(f64::NAN.to_f32(), 0.0);
    }
}
