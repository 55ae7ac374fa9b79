//! Linear mapping between bounded floating coordinates and fixed-width
//! integers.
//!
//! A coordinate `value` inside `[min, max]` maps to
//! `floor((value - min) / (max - min) * (2^bits - 1))`. Decoding applies the
//! inverse map, so a round trip loses at most one unit of integer resolution,
//! `(max - min) / 2^bits`.

use crate::errors::{IndexError, IndexResult};
use crate::key::CoordInt;

/// Per-axis `(min, max)` extents of the event space.
///
/// Every extent is widened outward by one representable `f32` step when the
/// bounds are created, so a coordinate sitting exactly on the original
/// extreme still encodes inside the integer range.
///
/// # Examples
///
/// ```rust
/// use mdevent_index::SpaceBounds;
///
/// let bounds = SpaceBounds::new([(-10.0, 10.0), (0.0, 5.0)]).unwrap();
/// assert!(bounds.contains(&[10.0, 0.0]));
/// assert!(bounds.extent(0).0 < -10.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SpaceBounds<const ND: usize> {
    extents: [(f32, f32); ND],
}

impl<const ND: usize> SpaceBounds<ND> {
    /// Creates bounds from `(min, max)` pairs, widening each by one ulp.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if any extent is non-finite, has
    /// `min >= max`, or touches `f32::MAX` so that widening overflows.
    pub fn new(extents: [(f32, f32); ND]) -> IndexResult<Self> {
        let mut widened = extents;
        for (axis, (min, max)) in extents.iter().copied().enumerate() {
            if !min.is_finite() || !max.is_finite() {
                return Err(IndexError::precondition(format!(
                    "axis {} has non-finite bounds [{}, {}]",
                    axis, min, max
                )));
            }
            if min >= max {
                return Err(IndexError::precondition(format!(
                    "axis {} has inverted or degenerate bounds [{}, {}]",
                    axis, min, max
                )));
            }
            let (low, high) = (min.next_down(), max.next_up());
            let width = high as f64 - low as f64;
            if !low.is_finite() || !high.is_finite() || !(width.is_finite() && width > 0.0) {
                return Err(IndexError::precondition(format!(
                    "axis {} bounds [{}, {}] overflow f32 once widened",
                    axis, min, max
                )));
            }
            widened[axis] = (low, high);
        }
        Ok(SpaceBounds { extents: widened })
    }

    /// Returns the widened extents.
    pub fn extents(&self) -> &[(f32, f32); ND] {
        &self.extents
    }

    /// Returns the widened `(min, max)` of one axis.
    pub fn extent(&self, axis: usize) -> (f32, f32) {
        self.extents[axis]
    }

    pub fn width(&self, axis: usize) -> f32 {
        let (min, max) = self.extents[axis];
        max - min
    }

    pub fn num_dims(&self) -> usize {
        ND
    }

    /// Checks if every coordinate lies within its axis extent.
    pub fn contains(&self, coords: &[f32; ND]) -> bool {
        coords
            .iter()
            .zip(self.extents.iter())
            .all(|(&v, &(min, max))| v >= min && v <= max)
    }
}

/// Largest code representable in `bits` bits.
#[inline]
pub(crate) fn max_code(bits: u32) -> u64 {
    if bits >= 64 {
        u64::MAX
    } else {
        (1u64 << bits) - 1
    }
}

/// Encodes one coordinate into a `bits`-wide integer.
///
/// # Errors
///
/// Returns a precondition violation if `value` is NaN or outside `[min, max]`.
pub fn encode_value<I: CoordInt>(value: f32, (min, max): (f32, f32), bits: u32) -> IndexResult<I> {
    if !(value >= min && value <= max) {
        return Err(IndexError::precondition(format!(
            "coordinate {} is outside [{}, {}]",
            value, min, max
        )));
    }
    let scale = max_code(bits);
    let fraction = (value as f64 - min as f64) / (max as f64 - min as f64);
    // float-to-int casts saturate, so fraction == 1.0 lands on scale
    let code = ((fraction * scale as f64) as u64).min(scale);
    Ok(I::from_u64_truncating(code))
}

/// Decodes a `bits`-wide integer back into a coordinate.
pub fn decode_value<I: CoordInt>(code: I, (min, max): (f32, f32), bits: u32) -> f32 {
    let scale = max_code(bits) as f64;
    let fraction = code.to_u64() as f64 / scale;
    (min as f64 + fraction * (max as f64 - min as f64)) as f32
}

fn check_limit(axis: usize, value: f32) -> IndexResult<()> {
    if value.is_nan() {
        return Err(IndexError::precondition(format!(
            "limit on axis {} is NaN",
            axis
        )));
    }
    Ok(())
}

/// Encodes whole coordinate vectors against a fixed set of bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateCodec<const ND: usize, I: CoordInt> {
    bounds: SpaceBounds<ND>,
    bits: u32,
    _marker: std::marker::PhantomData<I>,
}

impl<const ND: usize, I: CoordInt> CoordinateCodec<ND, I> {
    /// Creates a codec using the full width of `I`.
    pub fn new(bounds: SpaceBounds<ND>) -> Self {
        CoordinateCodec {
            bounds,
            bits: I::BITS,
            _marker: std::marker::PhantomData,
        }
    }

    /// Creates a codec that only uses the low `bits` bits of `I`.
    ///
    /// # Errors
    ///
    /// Returns an argument error if `bits` is zero or wider than `I`.
    pub fn with_bits(bounds: SpaceBounds<ND>, bits: u32) -> IndexResult<Self> {
        if bits == 0 || bits > I::BITS {
            return Err(IndexError::argument(format!(
                "coordinate width {} is not in 1..={}",
                bits,
                I::BITS
            )));
        }
        Ok(CoordinateCodec {
            bounds,
            bits,
            _marker: std::marker::PhantomData,
        })
    }

    pub fn bounds(&self) -> &SpaceBounds<ND> {
        &self.bounds
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    /// Size of one integer step along `axis`.
    pub fn resolution(&self, axis: usize) -> f64 {
        self.bounds.width(axis) as f64 / max_code(self.bits) as f64
    }

    pub fn encode(&self, axis: usize, value: f32) -> IndexResult<I> {
        encode_value(value, self.bounds.extent(axis), self.bits)
    }

    pub fn decode(&self, axis: usize, code: I) -> f32 {
        decode_value(code, self.bounds.extent(axis), self.bits)
    }

    /// Smallest code along `axis` whose decoded value is at least `value`,
    /// or `None` when every code decodes below it.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if `value` is NaN.
    pub fn ceil_code(&self, axis: usize, value: f32) -> IndexResult<Option<I>> {
        check_limit(axis, value)?;
        let code = self.first_code_where(axis, |decoded| decoded >= value);
        Ok((code <= max_code(self.bits) as u128).then(|| I::from_u64_truncating(code as u64)))
    }

    /// Largest code along `axis` whose decoded value is at most `value`, or
    /// `None` when every code decodes above it.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if `value` is NaN.
    pub fn floor_code(&self, axis: usize, value: f32) -> IndexResult<Option<I>> {
        check_limit(axis, value)?;
        let code = self.first_code_where(axis, |decoded| decoded > value);
        Ok(code
            .checked_sub(1)
            .map(|code| I::from_u64_truncating(code as u64)))
    }

    /// Binary search for the first code whose decoded value satisfies
    /// `pred`; `2^bits` if none does. Decoding never decreases as the code
    /// grows, so `pred` must flip from false to true at most once.
    fn first_code_where(&self, axis: usize, pred: impl Fn(f32) -> bool) -> u128 {
        let (mut lo, mut hi) = (0u128, max_code(self.bits) as u128 + 1);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if pred(self.decode(axis, I::from_u64_truncating(mid as u64))) {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        lo
    }

    /// Encodes every axis of a coordinate vector.
    pub fn encode_point(&self, coords: &[f32; ND]) -> IndexResult<[I; ND]> {
        let mut codes = [I::default(); ND];
        for (axis, (code, &value)) in codes.iter_mut().zip(coords.iter()).enumerate() {
            *code = self.encode(axis, value)?;
        }
        Ok(codes)
    }

    pub fn decode_point(&self, codes: &[I; ND]) -> [f32; ND] {
        std::array::from_fn(|axis| self.decode(axis, codes[axis]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds_are_widened() {
        let bounds = SpaceBounds::new([(-10.0, 10.0)]).unwrap();
        let (min, max) = bounds.extent(0);
        assert!(min < -10.0);
        assert!(max > 10.0);
        assert_eq!(min, (-10.0f32).next_down());
        assert_eq!(max, 10.0f32.next_up());
        assert!(bounds.contains(&[-10.0]));
        assert!(bounds.contains(&[10.0]));
        assert!(!bounds.contains(&[10.01]));
    }

    #[test]
    fn test_bounds_reject_inverted_and_degenerate() {
        let inverted = SpaceBounds::new([(0.0, 1.0), (5.0, -5.0)]);
        assert!(inverted.unwrap_err().is_precondition_violation());

        let degenerate = SpaceBounds::new([(2.0, 2.0)]);
        assert!(degenerate.unwrap_err().is_precondition_violation());

        let infinite = SpaceBounds::new([(0.0, f32::INFINITY)]);
        assert!(infinite.is_err());

        let nan = SpaceBounds::new([(f32::NAN, 1.0)]);
        assert!(nan.is_err());
    }

    #[test]
    fn test_bounds_reject_overflow_when_widened() {
        let upper = SpaceBounds::new([(0.0, f32::MAX)]);
        assert!(upper.unwrap_err().is_precondition_violation());

        let lower = SpaceBounds::new([(-1.0, 1.0), (-f32::MAX, 0.0)]);
        assert!(lower.unwrap_err().is_precondition_violation());

        let bounds = SpaceBounds::new([(-1e38, 1e38)]).unwrap();
        let codec: CoordinateCodec<1, u16> = CoordinateCodec::new(bounds);
        let low = codec.encode(0, -5e37).unwrap();
        let high = codec.encode(0, 5e37).unwrap();
        assert!(low < high);
        assert!(codec.decode(0, high).is_finite());
    }

    #[test]
    fn test_round_trip_middle_axis_32_bit() {
        let bounds = SpaceBounds::new([(-10.0, 10.0); 3]).unwrap();
        let codec: CoordinateCodec<3, u32> = CoordinateCodec::new(bounds);

        let code = codec.encode(1, 3.3345).unwrap();
        let back = codec.decode(1, code);
        assert!((back - 3.3345).abs() < 1e-4, "decoded {}", back);
    }

    #[test]
    fn test_round_trip_within_resolution() {
        let bounds = SpaceBounds::new([(0.0, 100.0), (-1.0, 1.0)]).unwrap();
        for bits in [4u32, 8, 12, 16] {
            let codec: CoordinateCodec<2, u16> = CoordinateCodec::with_bits(bounds, bits).unwrap();
            for i in 0..=50 {
                let point = [i as f32 * 2.0, -1.0 + i as f32 * 0.04];
                let codes = codec.encode_point(&point).unwrap();
                let back = codec.decode_point(&codes);
                for axis in 0..2 {
                    let err = (back[axis] as f64 - point[axis] as f64).abs();
                    // one resolution unit plus f32 rounding slack
                    let tolerance = codec.resolution(axis) * 1.0001 + 1e-5;
                    assert!(
                        err <= tolerance,
                        "bits {} axis {}: {} vs {} (err {})",
                        bits,
                        axis,
                        back[axis],
                        point[axis],
                        err
                    );
                }
            }
        }
    }

    #[test]
    fn test_encode_extremes() {
        let bounds = SpaceBounds::new([(0.0, 1.0)]).unwrap();
        let codec: CoordinateCodec<1, u8> = CoordinateCodec::new(bounds);
        let (min, max) = bounds.extent(0);
        assert_eq!(codec.encode(0, min).unwrap(), 0);
        assert_eq!(codec.encode(0, max).unwrap(), u8::MAX);
        assert_eq!(codec.encode(0, 0.0).unwrap(), 0);
        assert!(codec.encode(0, 1.0).unwrap() >= 254);
    }

    #[test]
    fn test_encode_is_monotonic() {
        let bounds = SpaceBounds::new([(-5.0, 5.0)]).unwrap();
        let codec: CoordinateCodec<1, u16> = CoordinateCodec::new(bounds);
        let mut last = 0u16;
        for i in 0..1000 {
            let value = -5.0 + i as f32 * 0.01;
            let code = codec.encode(0, value).unwrap();
            assert!(code >= last);
            last = code;
        }
    }

    #[test]
    fn test_encode_out_of_bounds_fails() {
        let bounds = SpaceBounds::new([(0.0, 1.0)]).unwrap();
        let codec: CoordinateCodec<1, u32> = CoordinateCodec::new(bounds);
        assert!(codec.encode(0, 1.5).unwrap_err().is_precondition_violation());
        assert!(codec.encode(0, -0.5).is_err());
        assert!(codec.encode(0, f32::NAN).is_err());
    }

    #[test]
    fn test_ceil_and_floor_codes_follow_decoded_values() {
        let bounds = SpaceBounds::new([(0.0, 16.0)]).unwrap();
        let codec: CoordinateCodec<1, u8> = CoordinateCodec::with_bits(bounds, 4).unwrap();

        // 2.2 truncates to code 2, which decodes below 2.2
        let truncated = codec.encode(0, 2.2).unwrap();
        assert!(codec.decode(0, truncated) < 2.2);
        let ceil = codec.ceil_code(0, 2.2).unwrap().unwrap();
        assert_eq!(ceil, truncated + 1);
        assert!(codec.decode(0, ceil) >= 2.2);
        assert!(codec.decode(0, ceil - 1) < 2.2);

        let floor = codec.floor_code(0, 2.2).unwrap().unwrap();
        assert_eq!(floor, truncated);

        for i in 0..=160 {
            let value = i as f32 * 0.1;
            let ceil = codec.ceil_code(0, value).unwrap().unwrap();
            assert!(codec.decode(0, ceil) >= value);
            assert!(ceil == 0 || codec.decode(0, ceil - 1) < value);
            let floor = codec.floor_code(0, value).unwrap().unwrap();
            assert!(codec.decode(0, floor) <= value);
            assert!(floor == 15 || codec.decode(0, floor + 1) > value);
        }
    }

    #[test]
    fn test_ceil_and_floor_codes_outside_bounds() {
        let bounds = SpaceBounds::new([(0.0, 1.0)]).unwrap();
        let codec: CoordinateCodec<1, u64> = CoordinateCodec::new(bounds);
        assert_eq!(codec.ceil_code(0, -3.0).unwrap(), Some(0));
        assert_eq!(codec.ceil_code(0, 2.0).unwrap(), None);
        assert_eq!(codec.floor_code(0, 2.0).unwrap(), Some(u64::MAX));
        assert_eq!(codec.floor_code(0, -3.0).unwrap(), None);
        assert!(codec.ceil_code(0, f32::NAN).unwrap_err().is_precondition_violation());

        let half = codec.ceil_code(0, 0.5).unwrap().unwrap();
        assert!(codec.decode(0, half) >= 0.5);
        assert!(codec.decode(0, half - 1) < 0.5);
    }

    #[test]
    fn test_with_bits_validation() {
        let bounds = SpaceBounds::new([(0.0, 1.0)]).unwrap();
        assert!(CoordinateCodec::<1, u8>::with_bits(bounds, 9).unwrap_err().is_argument());
        assert!(CoordinateCodec::<1, u8>::with_bits(bounds, 0).is_err());
        assert_eq!(CoordinateCodec::<1, u8>::with_bits(bounds, 3).unwrap().bits(), 3);
    }

    #[test]
    fn test_full_width_64_bit() {
        let bounds = SpaceBounds::new([(0.0, 1.0)]).unwrap();
        let codec: CoordinateCodec<1, u64> = CoordinateCodec::new(bounds);
        let code = codec.encode(0, 0.5).unwrap();
        assert!(code > u64::MAX / 2 - (1 << 44) && code < u64::MAX / 2 + (1 << 44));
        assert!((codec.decode(0, code) - 0.5).abs() < 1e-6);
    }
}
