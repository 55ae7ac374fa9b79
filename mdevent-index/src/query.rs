//! Axis-aligned box queries expressed as a pair of Morton keys.
//!
//! A query is given by the keys of its lowest and highest corner. A raw
//! integer compare between interleaved keys does not bound each axis (the
//! low bits of one axis sit between the high bits of another), so every test
//! here compares `key & axis_mask(i)` against the same projection of the two
//! corners. With the bits of all other axes forced to zero the projected
//! keys order exactly like axis `i`'s coordinate.

use crate::errors::{IndexError, IndexResult};
use crate::indexer::EventIndexer;
use crate::interleave::MortonLayout;
use crate::key::{CoordInt, MortonKey};

/// How a key cell relates to a query box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coverage {
    /// No key of the cell can match.
    Disjoint,
    /// Some keys may match; the caller must look closer.
    Partial,
    /// Every key of the cell matches.
    Full,
}

/// Per-axis masked bounds of a box query, prepared once and reused for every
/// box and event visited.
#[derive(Debug, Clone, PartialEq)]
pub struct MortonQuery<K: MortonKey> {
    lower: K,
    upper: K,
    num_dims: usize,
    masks: Vec<K>,
    lower_bounds: Vec<K>,
    upper_bounds: Vec<K>,
}

impl<K: MortonKey> MortonQuery<K> {
    /// Creates a query from the keys of the lowest and highest corner.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if `lower` is above `upper` along any
    /// axis, or if either key lies outside the layout's key space.
    pub fn new(layout: &MortonLayout<K>, lower: K, upper: K) -> IndexResult<Self> {
        if lower > layout.max_key() || upper > layout.max_key() {
            return Err(IndexError::precondition(format!(
                "query corners {:?}..{:?} exceed the key space",
                lower, upper
            )));
        }
        let masks = layout.axis_masks().to_vec();
        let lower_bounds: Vec<K> = masks.iter().map(|&m| lower & m).collect();
        let upper_bounds: Vec<K> = masks.iter().map(|&m| upper & m).collect();
        if let Some(axis) = (0..masks.len()).find(|&i| lower_bounds[i] > upper_bounds[i]) {
            return Err(IndexError::precondition(format!(
                "query lower corner is above the upper corner on axis {}",
                axis
            )));
        }
        Ok(MortonQuery {
            lower,
            upper,
            num_dims: layout.num_dims(),
            masks,
            lower_bounds,
            upper_bounds,
        })
    }

    /// A query covering the whole key space.
    pub fn everything(layout: &MortonLayout<K>) -> Self {
        let masks = layout.axis_masks().to_vec();
        MortonQuery {
            lower: K::ZERO,
            upper: layout.max_key(),
            num_dims: layout.num_dims(),
            lower_bounds: vec![K::ZERO; masks.len()],
            upper_bounds: masks.clone(),
            masks,
        }
    }

    /// Builds a query from a floating-point region.
    ///
    /// The query matches exactly the keys whose decoded coordinates lie
    /// inside `[lo, hi]` on every axis: the lower corner takes the smallest
    /// code decoding to at least `lo`, the upper corner the largest code
    /// decoding to at most `hi`. Returns `Ok(None)` when no code fits on some
    /// axis, in which case no event can match.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if any axis has `lo > hi` or a NaN
    /// limit.
    pub fn from_region<I: CoordInt, const ND: usize>(
        indexer: &EventIndexer<ND, I, K>,
        region: &[(f32, f32); ND],
    ) -> IndexResult<Option<Self>> {
        let codec = indexer.codec();
        let mut low_codes = [I::default(); ND];
        let mut high_codes = [I::default(); ND];
        for (axis, &(lo, hi)) in region.iter().enumerate() {
            if !(lo <= hi) {
                return Err(IndexError::precondition(format!(
                    "region axis {} has invalid limits [{}, {}]",
                    axis, lo, hi
                )));
            }
            match (codec.ceil_code(axis, lo)?, codec.floor_code(axis, hi)?) {
                (Some(low), Some(high)) if low <= high => {
                    low_codes[axis] = low;
                    high_codes[axis] = high;
                }
                _ => return Ok(None),
            }
        }
        let lower = indexer.key_for_codes(&low_codes);
        let upper = indexer.key_for_codes(&high_codes);
        MortonQuery::new(indexer.layout(), lower, upper).map(Some)
    }

    pub fn lower(&self) -> K {
        self.lower
    }

    pub fn upper(&self) -> K {
        self.upper
    }

    pub fn num_dims(&self) -> usize {
        self.num_dims
    }

    /// Masked `(lower, upper)` bounds of one axis.
    pub fn axis_bounds(&self, axis: usize) -> (K, K) {
        (self.lower_bounds[axis], self.upper_bounds[axis])
    }

    /// Exact per-event test.
    #[inline]
    pub fn contains_key(&self, key: K) -> bool {
        self.masks.iter().enumerate().all(|(i, &m)| {
            let v = key & m;
            v >= self.lower_bounds[i] && v <= self.upper_bounds[i]
        })
    }

    /// Checks if every key of the aligned cell `[lo, hi]` matches.
    ///
    /// `lo` and `hi` must be the corners of an aligned Z-order cell (see
    /// [`enclosing_cell`](crate::interleave::enclosing_cell)), whose masked
    /// corners are the per-axis extremes of the cell.
    #[inline]
    pub fn contains_cell(&self, lo: K, hi: K) -> bool {
        self.masks.iter().enumerate().all(|(i, &m)| {
            (lo & m) >= self.lower_bounds[i] && (hi & m) <= self.upper_bounds[i]
        })
    }

    /// Checks if at least one key of the aligned cell `[lo, hi]` matches.
    #[inline]
    pub fn overlaps_cell(&self, lo: K, hi: K) -> bool {
        self.masks.iter().enumerate().all(|(i, &m)| {
            (lo & m) <= self.upper_bounds[i] && (hi & m) >= self.lower_bounds[i]
        })
    }

    /// Classifies an aligned cell against the query.
    #[inline]
    pub fn coverage(&self, lo: K, hi: K) -> Coverage {
        if self.contains_cell(lo, hi) {
            Coverage::Full
        } else if self.overlaps_cell(lo, hi) {
            Coverage::Partial
        } else {
            Coverage::Disjoint
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::SpaceBounds;

    fn layout_2d() -> MortonLayout<u8> {
        MortonLayout::new(2, 4).unwrap()
    }

    #[test]
    fn test_contains_key_matches_coordinates() {
        let layout = layout_2d();
        let query = MortonQuery::new(
            &layout,
            layout.interleave(&[2u8, 5]).unwrap(),
            layout.interleave(&[9u8, 11]).unwrap(),
        )
        .unwrap();
        for x in 0..16u8 {
            for y in 0..16u8 {
                let key = layout.interleave(&[x, y]).unwrap();
                let expected = (2..=9).contains(&x) && (5..=11).contains(&y);
                assert_eq!(query.contains_key(key), expected, "({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_raw_compare_would_be_wrong() {
        let layout = layout_2d();
        let lower = layout.interleave(&[0u8, 0]).unwrap();
        let upper = layout.interleave(&[1u8, 15]).unwrap();
        let query = MortonQuery::new(&layout, lower, upper).unwrap();
        // (2, 0) sits numerically between the corners but is outside on x
        let key = layout.interleave(&[2u8, 0]).unwrap();
        assert!(key > lower && key < upper);
        assert!(!query.contains_key(key));
    }

    #[test]
    fn test_inverted_axis_rejected() {
        let layout = layout_2d();
        let err = MortonQuery::new(
            &layout,
            layout.interleave(&[5u8, 1]).unwrap(),
            layout.interleave(&[4u8, 9]).unwrap(),
        )
        .unwrap_err();
        assert!(err.is_precondition_violation());
    }

    #[test]
    fn test_key_outside_space_rejected() {
        let layout: MortonLayout<u16> = MortonLayout::new(2, 4).unwrap();
        assert!(MortonQuery::new(&layout, 0, 256).is_err());
    }

    #[test]
    fn test_cell_coverage() {
        let layout = layout_2d();
        let query = MortonQuery::new(
            &layout,
            layout.interleave(&[4u8, 0]).unwrap(),
            layout.interleave(&[7u8, 7]).unwrap(),
        )
        .unwrap();
        // quadrant cell x in 4..8, y in 0..4
        let lo = layout.interleave(&[4u8, 0]).unwrap();
        let hi = layout.interleave(&[7u8, 3]).unwrap();
        assert_eq!(query.coverage(lo, hi), Coverage::Full);
        // x in 0..8, y in 0..8
        let lo = layout.interleave(&[0u8, 0]).unwrap();
        let hi = layout.interleave(&[7u8, 7]).unwrap();
        assert_eq!(query.coverage(lo, hi), Coverage::Partial);
        // x in 8..16, y in 8..16
        let lo = layout.interleave(&[8u8, 8]).unwrap();
        let hi = layout.interleave(&[15u8, 15]).unwrap();
        assert_eq!(query.coverage(lo, hi), Coverage::Disjoint);
    }

    #[test]
    fn test_everything_contains_all() {
        let layout = layout_2d();
        let query = MortonQuery::everything(&layout);
        assert_eq!(query.coverage(0, u8::MAX), Coverage::Full);
        assert!(query.contains_key(0));
        assert!(query.contains_key(0xFF));
    }

    #[test]
    fn test_from_region() {
        let bounds = SpaceBounds::new([(0.0, 16.0), (0.0, 16.0)]).unwrap();
        let indexer: EventIndexer<2, u8, u16> = EventIndexer::new(bounds, 4).unwrap();

        let query = MortonQuery::from_region(&indexer, &[(4.5, 8.5), (-3.0, 2.0)])
            .unwrap()
            .unwrap();
        let inside = indexer.key_for(&[6.0, 1.0]).unwrap();
        let outside = indexer.key_for(&[12.0, 1.0]).unwrap();
        assert!(query.contains_key(inside));
        assert!(!query.contains_key(outside));

        let disjoint = MortonQuery::from_region(&indexer, &[(20.0, 30.0), (0.0, 1.0)]).unwrap();
        assert!(disjoint.is_none());

        let inverted = MortonQuery::from_region(&indexer, &[(3.0, 1.0), (0.0, 1.0)]);
        assert!(inverted.unwrap_err().is_precondition_violation());
    }

    #[test]
    fn test_from_region_matches_decoded_coordinates() {
        let bounds = SpaceBounds::new([(0.0, 16.0), (0.0, 16.0)]).unwrap();
        let indexer: EventIndexer<2, u8, u16> = EventIndexer::new(bounds, 4).unwrap();

        // 2.2 lands in the same integer cell as 2.5 but decodes below it
        let below = indexer.key_for(&[2.2, 7.5]).unwrap();
        assert!(indexer.point_for(below)[0] < 2.5);
        let query = MortonQuery::from_region(&indexer, &[(2.5, 5.0), (0.0, 16.0)])
            .unwrap()
            .unwrap();
        assert!(!query.contains_key(below));

        let regions = [
            [(2.5, 5.0), (0.0, 16.0)],
            [(0.1, 0.2), (3.3, 9.9)],
            [(-4.0, 1.0), (15.5, 20.0)],
            [(3.2, 3.2), (0.0, 16.0)],
        ];
        for region in regions {
            let query = MortonQuery::from_region(&indexer, &region).unwrap();
            for x in 0..16u8 {
                for y in 0..16u8 {
                    let key = indexer.key_for_codes(&[x, y]);
                    let point = indexer.point_for(key);
                    let expected = (0..2)
                        .all(|axis| point[axis] >= region[axis].0 && point[axis] <= region[axis].1);
                    let found = query.as_ref().is_some_and(|q| q.contains_key(key));
                    assert_eq!(found, expected, "region {:?} point {:?}", region, point);
                }
            }
        }

        // no code decodes inside (2.2, 2.5)
        let between = MortonQuery::from_region(&indexer, &[(2.2, 2.5), (0.0, 16.0)]).unwrap();
        assert!(between.is_none());
    }
}
