//! Bit interleaving for Morton (Z-order) keys.
//!
//! A Morton key is built by spreading the bits of every coordinate so that
//! `ND - 1` zero bits follow each original bit (`pad`), then OR-ing the
//! spread coordinates together with axis `i` shifted left by `i`. Bit `b` of
//! axis `i` therefore lands at key bit `b * ND + i`.
//!
//! ## Spreading
//! The shift/mask sequence for a `(ND, width)` pair is generated once and
//! stored in a [`MortonLayout`]. For block sizes `s = 2^k` down to 1 the
//! value is updated as `x = (x | x << s·(ND-1)) & M_s`, where `M_s` has runs
//! of `s` ones repeating every `s·ND` bits. Compacting runs the same masks in
//! reverse with right shifts.

use crate::errors::{IndexError, IndexResult};
use crate::key::{CoordInt, MortonKey};

/// Largest dimension count a layout accepts. Boxes fan out into `2^ND`
/// children, so this also bounds the per-box child vector.
pub const MAX_DIMS: usize = 16;

/// Precomputed shift/mask tables for one `(ND, width)` combination.
///
/// # Examples
///
/// ```rust
/// use mdevent_index::MortonLayout;
///
/// let layout: MortonLayout<u8> = MortonLayout::new(2, 4).unwrap();
/// let key = layout.interleave(&[0b1010u8, 0b0101]).unwrap();
/// assert_eq!(key, 0b0110_0110);
/// assert_eq!(layout.deinterleave::<u8, 2>(key).unwrap(), [0b1010, 0b0101]);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct MortonLayout<K: MortonKey> {
    num_dims: usize,
    coord_bits: u32,
    pad_steps: Vec<(u32, K)>,
    compact_steps: Vec<(u32, K)>,
    spread_mask: K,
    coord_mask: K,
    axis_masks: Vec<K>,
    max_key: K,
}

impl<K: MortonKey> MortonLayout<K> {
    /// Generates the tables for `num_dims` axes of `coord_bits` bits each.
    ///
    /// # Errors
    ///
    /// Returns an argument error when the combination cannot be represented:
    /// no axes, more than [`MAX_DIMS`] axes, a width of zero or above 64, or
    /// `num_dims * coord_bits` wider than the key type.
    pub fn new(num_dims: usize, coord_bits: u32) -> IndexResult<Self> {
        if num_dims == 0 || num_dims > MAX_DIMS {
            return Err(IndexError::argument(format!(
                "dimension count {} is not in 1..={}",
                num_dims, MAX_DIMS
            )));
        }
        if coord_bits == 0 || coord_bits > 64 {
            return Err(IndexError::argument(format!(
                "coordinate width {} is not in 1..=64",
                coord_bits
            )));
        }
        let key_bits = num_dims as u32 * coord_bits;
        if key_bits > K::BITS {
            return Err(IndexError::argument(format!(
                "{} axes of {} bits need a {}-bit key, key type has {} bits",
                num_dims,
                coord_bits,
                key_bits,
                K::BITS
            )));
        }

        let stride = num_dims as u32;
        let gap = stride - 1;

        let mut pad_steps = Vec::new();
        let mut compact_steps = Vec::new();
        if gap > 0 && coord_bits > 1 {
            // largest power of two strictly below coord_bits
            let mut block = 1u32 << (31 - (coord_bits - 1).leading_zeros());
            while block >= 1 {
                pad_steps.push((block * gap, periodic_mask::<K>(block, block * stride)));
                block /= 2;
            }
            let mut block = 1u32;
            while block < coord_bits {
                compact_steps.push((
                    block * gap,
                    periodic_mask::<K>(2 * block, 2 * block * stride),
                ));
                block *= 2;
            }
        }

        let max_key = K::low_mask(key_bits);
        let spread_mask = periodic_mask::<K>(1, stride) & max_key;
        let axis_masks = (0..num_dims as u32)
            .map(|axis| spread_mask.shl_bits(axis))
            .collect();

        Ok(MortonLayout {
            num_dims,
            coord_bits,
            pad_steps,
            compact_steps,
            spread_mask,
            coord_mask: K::low_mask(coord_bits),
            axis_masks,
            max_key,
        })
    }

    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    pub fn coord_bits(&self) -> u32 {
        self.coord_bits
    }

    /// Number of key bits actually used, `num_dims * coord_bits`.
    pub fn key_bits(&self) -> u32 {
        self.num_dims as u32 * self.coord_bits
    }

    /// Largest key the layout can produce; the key space is `[0, max_key]`.
    pub fn max_key(&self) -> K {
        self.max_key
    }

    /// Bits of the key that belong to `axis`.
    pub fn axis_mask(&self, axis: usize) -> K {
        self.axis_masks[axis]
    }

    /// Bits of the key that belong to every axis except `axis`.
    pub fn other_axes_mask(&self, axis: usize) -> K {
        !self.axis_masks[axis] & self.max_key
    }

    pub fn axis_masks(&self) -> &[K] {
        &self.axis_masks
    }

    /// Inserts `num_dims - 1` zero bits after every bit of `x`.
    #[inline]
    pub fn pad(&self, x: u64) -> K {
        let mut z = K::from_u64(x) & self.coord_mask;
        for &(shift, mask) in &self.pad_steps {
            z = (z | z.shl_bits(shift)) & mask;
        }
        z
    }

    /// Inverse of [`pad`](Self::pad); ignores bits that do not sit on the
    /// stride.
    #[inline]
    pub fn compact(&self, z: K) -> u64 {
        let mut x = z & self.spread_mask;
        for &(shift, mask) in &self.compact_steps {
            x = (x | x.shr_bits(shift)) & mask;
        }
        (x & self.coord_mask).low_u64()
    }

    /// Combines one integer per axis into a Morton key.
    ///
    /// # Errors
    ///
    /// Returns an argument error unless there is exactly one coordinate per
    /// axis of the layout.
    pub fn interleave<I: CoordInt>(&self, coords: &[I]) -> IndexResult<K> {
        self.check_dims(coords.len())?;
        Ok(self.combine(coords))
    }

    /// Splits a Morton key back into one integer per axis.
    ///
    /// # Errors
    ///
    /// Returns an argument error if `ND` differs from the layout's number of
    /// axes.
    pub fn deinterleave<I: CoordInt, const ND: usize>(&self, z: K) -> IndexResult<[I; ND]> {
        self.check_dims(ND)?;
        Ok(self.split(z))
    }

    /// [`interleave`](Self::interleave) for callers whose layout was built
    /// with `ND` axes.
    #[inline]
    pub(crate) fn interleave_point<I: CoordInt, const ND: usize>(&self, coords: &[I; ND]) -> K {
        debug_assert_eq!(ND, self.num_dims);
        self.combine(coords)
    }

    /// [`deinterleave`](Self::deinterleave) for callers whose layout was
    /// built with `ND` axes.
    #[inline]
    pub(crate) fn deinterleave_point<I: CoordInt, const ND: usize>(&self, z: K) -> [I; ND] {
        debug_assert_eq!(ND, self.num_dims);
        self.split(z)
    }

    #[inline]
    fn combine<I: CoordInt>(&self, coords: &[I]) -> K {
        coords
            .iter()
            .enumerate()
            .fold(K::ZERO, |key, (axis, c)| {
                key | self.pad(c.to_u64()).shl_bits(axis as u32)
            })
    }

    #[inline]
    fn split<I: CoordInt, const ND: usize>(&self, z: K) -> [I; ND] {
        std::array::from_fn(|axis| {
            I::from_u64_truncating(self.compact(z.shr_bits(axis as u32)))
        })
    }

    fn check_dims(&self, count: usize) -> IndexResult<()> {
        if count != self.num_dims {
            return Err(IndexError::argument(format!(
                "expected {} coordinates, got {}",
                self.num_dims, count
            )));
        }
        Ok(())
    }

    /// Returns the bits of `axis` in `z`, still in their interleaved
    /// positions.
    ///
    /// Comparing two keys after masking orders them exactly by that axis'
    /// coordinate; bits of the other axes are forced to zero so they can no
    /// longer influence the comparison.
    #[inline]
    pub fn masked(&self, z: K, axis: usize) -> K {
        z & self.axis_masks[axis]
    }

    /// Smallest aligned Z-order cell containing `[lo, hi]`.
    pub fn enclosing_cell(&self, lo: K, hi: K) -> (K, K) {
        enclosing_cell(lo, hi, self.num_dims)
    }
}

/// Smallest aligned Z-order cell containing the key range `[lo, hi]`.
///
/// A cell at level `L` covers every key sharing the bits above `L · ND`; its
/// corners deinterleave to the per-axis minimum and maximum of every key
/// inside it. Boxes produced by splitting the full key space are exactly such
/// cells, so their corner test is exact.
pub fn enclosing_cell<K: MortonKey>(lo: K, hi: K, num_dims: usize) -> (K, K) {
    let diff = lo ^ hi;
    if diff.is_zero() {
        return (lo, hi);
    }
    let highest = K::BITS - 1 - diff.leading_zeros();
    let nd = num_dims as u32;
    let level_bits = (highest / nd + 1) * nd;
    let low = K::low_mask(level_bits);
    let base = lo & !low;
    (base, base | low)
}

/// Runs of `group` ones repeating every `period` bits, starting at bit 0.
fn periodic_mask<K: MortonKey>(group: u32, period: u32) -> K {
    let run = K::low_mask(group);
    let mut mask = K::ZERO;
    let mut start = 0;
    while start < K::BITS {
        mask = mask | run.shl_bits(start);
        start += period;
    }
    mask
}

/// Interleaves a coordinate vector using the full width of `I`.
///
/// Builds a [`MortonLayout`] on every call; keep a layout around when keys
/// are produced in bulk.
pub fn interleave<I: CoordInt, K: MortonKey, const ND: usize>(coords: &[I; ND]) -> IndexResult<K> {
    let layout = MortonLayout::<K>::new(ND, I::BITS)?;
    Ok(layout.interleave_point(coords))
}

/// Inverse of [`interleave`].
pub fn deinterleave<I: CoordInt, K: MortonKey, const ND: usize>(z: K) -> IndexResult<[I; ND]> {
    let layout = MortonLayout::<K>::new(ND, I::BITS)?;
    Ok(layout.deinterleave_point(z))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::U256;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn test_interleave_regression_vector() {
        let layout: MortonLayout<u8> = MortonLayout::new(2, 4).unwrap();
        assert_eq!(layout.interleave(&[0b1010u8, 0b0101]).unwrap(), 0b0110_0110);
    }

    #[test]
    fn test_wrong_coordinate_count_is_rejected() {
        let layout: MortonLayout<u32> = MortonLayout::new(3, 10).unwrap();
        assert!(layout.interleave(&[1u16, 2]).unwrap_err().is_argument());
        assert!(layout.interleave(&[1u16, 2, 3, 4]).unwrap_err().is_argument());
        assert!(layout.deinterleave::<u16, 2>(7).unwrap_err().is_argument());

        let key = layout.interleave(&[1u16, 2, 3]).unwrap();
        assert_eq!(layout.deinterleave::<u16, 3>(key).unwrap(), [1, 2, 3]);
    }

    #[test]
    fn test_pad_2d_matches_classic_magic_bits() {
        let layout: MortonLayout<u64> = MortonLayout::new(2, 32).unwrap();
        assert_eq!(layout.pad(0xFFFF_FFFF), 0x5555_5555_5555_5555);
        assert_eq!(layout.pad(0b1011), 0b100_0101);
        assert_eq!(layout.compact(0x5555_5555_5555_5555), 0xFFFF_FFFF);
    }

    #[test]
    fn test_pad_3d_matches_classic_magic_bits() {
        let layout: MortonLayout<u64> = MortonLayout::new(3, 21).unwrap();
        assert_eq!(layout.pad(0x1F_FFFF), 0x1249_2492_4924_9249);
        assert_eq!(layout.interleave(&[1u32, 0, 0]).unwrap(), 1);
        assert_eq!(layout.interleave(&[0u32, 1, 0]).unwrap(), 2);
        assert_eq!(layout.interleave(&[0u32, 0, 1]).unwrap(), 4);
        assert_eq!(layout.interleave(&[1u32, 1, 1]).unwrap(), 7);
    }

    #[test]
    fn test_one_dimension_is_identity() {
        let layout: MortonLayout<u32> = MortonLayout::new(1, 32).unwrap();
        assert_eq!(layout.pad(0xDEAD_BEEF), 0xDEAD_BEEF);
        assert_eq!(layout.compact(0xDEAD_BEEF), 0xDEAD_BEEF);
        assert_eq!(layout.interleave(&[7u32]).unwrap(), 7);
    }

    #[test]
    fn test_bit_positions() {
        let layout: MortonLayout<u128> = MortonLayout::new(4, 16).unwrap();
        for axis in 0..4 {
            for bit in 0..16 {
                let mut coords = [0u16; 4];
                coords[axis] = 1 << bit;
                let key = layout.interleave(&coords).unwrap();
                assert_eq!(key, 1u128 << (bit * 4 + axis as u32));
            }
        }
    }

    fn check_round_trip<I, K, const ND: usize>(samples: usize)
    where
        I: CoordInt,
        K: MortonKey,
    {
        let layout = MortonLayout::<K>::new(ND, I::BITS).unwrap();
        let mut rng = StdRng::seed_from_u64(0x5EED + ND as u64 * 131 + I::BITS as u64);
        let max = I::MAX.to_u64();
        for _ in 0..samples {
            let coords: [I; ND] =
                std::array::from_fn(|_| I::from_u64_truncating(rng.gen_range(0..=max)));
            let key = layout.interleave(&coords).unwrap();
            assert!(key <= layout.max_key());
            assert_eq!(layout.deinterleave::<I, ND>(key).unwrap(), coords);
        }
        let extremes: [I; ND] = [I::MAX; ND];
        assert_eq!(layout.interleave(&extremes).unwrap(), layout.max_key());
        assert_eq!(layout.deinterleave::<I, ND>(layout.max_key()).unwrap(), extremes);
    }

    #[test]
    fn test_round_trip_supported_combinations() {
        check_round_trip::<u8, u8, 1>(200);
        check_round_trip::<u8, u16, 2>(200);
        check_round_trip::<u8, u32, 3>(200);
        check_round_trip::<u8, u32, 4>(200);
        check_round_trip::<u16, u32, 2>(200);
        check_round_trip::<u16, u64, 3>(200);
        check_round_trip::<u16, u64, 4>(200);
        check_round_trip::<u32, u64, 2>(200);
        check_round_trip::<u32, u128, 3>(200);
        check_round_trip::<u32, u128, 4>(200);
        check_round_trip::<u64, u128, 2>(200);
        check_round_trip::<u64, U256, 3>(200);
        check_round_trip::<u64, U256, 4>(200);
    }

    #[test]
    fn test_round_trip_narrow_widths() {
        let layout: MortonLayout<u32> = MortonLayout::new(3, 5).unwrap();
        for x in 0..32u8 {
            for y in [0u8, 7, 31] {
                for z in [0u8, 16, 30] {
                    let key = layout.interleave(&[x, y, z]).unwrap();
                    assert_eq!(layout.deinterleave::<u8, 3>(key).unwrap(), [x, y, z]);
                }
            }
        }
        assert_eq!(layout.max_key(), (1u32 << 15) - 1);
    }

    #[test]
    fn test_unsupported_combinations() {
        assert!(MortonLayout::<u8>::new(0, 4).unwrap_err().is_argument());
        assert!(MortonLayout::<u8>::new(3, 4).unwrap_err().is_argument());
        assert!(MortonLayout::<u64>::new(2, 0).is_err());
        assert!(MortonLayout::<U256>::new(2, 65).is_err());
        assert!(MortonLayout::<U256>::new(MAX_DIMS + 1, 1).is_err());
        assert!(MortonLayout::<U256>::new(4, 64).is_ok());
        assert!(interleave::<u64, u64, 2>(&[1, 2]).is_err());
    }

    #[test]
    fn test_free_functions() {
        let key: u16 = interleave(&[0b1010u8, 0b0101]).unwrap();
        assert_eq!(key, 0b0110_0110);
        let coords: [u8; 2] = deinterleave(key).unwrap();
        assert_eq!(coords, [0b1010, 0b0101]);
    }

    #[test]
    fn test_axis_masks_partition_key() {
        let layout: MortonLayout<u32> = MortonLayout::new(3, 10).unwrap();
        let mut union = 0u32;
        for axis in 0..3 {
            let mask = layout.axis_mask(axis);
            assert_eq!(mask & union, 0);
            assert_eq!(mask | layout.other_axes_mask(axis), layout.max_key());
            union |= mask;
        }
        assert_eq!(union, layout.max_key());
    }

    #[test]
    fn test_masked_compare_orders_by_axis() {
        let layout: MortonLayout<u32> = MortonLayout::new(2, 8).unwrap();
        let a = layout.interleave(&[10u8, 200]).unwrap();
        let b = layout.interleave(&[20u8, 5]).unwrap();
        // raw keys disagree with axis 0 ordering
        assert!(a > b);
        assert!(layout.masked(a, 0) < layout.masked(b, 0));
        assert!(layout.masked(a, 1) > layout.masked(b, 1));
    }

    #[test]
    fn test_enclosing_cell() {
        assert_eq!(enclosing_cell(5u8, 5u8, 2), (5, 5));
        // quadrant [4, 7] is already a cell
        assert_eq!(enclosing_cell(4u8, 7u8, 2), (4, 7));
        // [3, 4] straddles quadrants, so the whole 4x4 cell is needed
        assert_eq!(enclosing_cell(3u8, 4u8, 2), (0, 15));
        assert_eq!(enclosing_cell(0u8, 1u8, 3), (0, 7));
        assert_eq!(enclosing_cell(16u16, 31u16, 2), (16, 31));
        let cell = enclosing_cell(U256::from_words(0, 1), U256::from_words(1, 0), 4);
        assert_eq!(cell.0, U256::ZERO);
        assert_eq!(cell.1, U256::low_mask(132));
    }
}
