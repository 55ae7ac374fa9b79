//! Conversion of events between coordinates and Morton keys.
//!
//! The `EventIndexer` bundles everything needed to turn a coordinate vector
//! into a key and back: the space bounds, the per-axis codec and the bit
//! interleaving layout. It is the only place that can switch events into
//! the key state (see [`IndexBuildToken`]).
//!
//! ## Bulk Conversion
//!
//! `index_events` and `restore_coordinates` convert whole slices and run on
//! the rayon pool when the indexer is parallel. A failed bulk conversion can
//! leave the slice with a mix of both states; callers discard it.

use rayon::prelude::*;

use crate::codec::{CoordinateCodec, SpaceBounds};
use crate::errors::{IndexError, IndexResult};
use crate::event::{EventTotals, IndexBuildToken, MdEvent};
use crate::interleave::MortonLayout;
use crate::key::{CoordInt, MortonKey};

/// Maps coordinate vectors to Morton keys for one set of bounds.
///
/// `ND` is the number of axes, `I` the per-axis integer type and `K` the
/// key type. `ND * coord_bits` must fit in `K`.
///
/// # Examples
///
/// ```rust
/// use mdevent_index::{EventIndexer, SpaceBounds};
///
/// let bounds = SpaceBounds::new([(0.0, 1.0), (0.0, 1.0)]).unwrap();
/// let indexer: EventIndexer<2, u32, u64> = EventIndexer::new(bounds, 0).unwrap();
/// let key = indexer.key_for(&[0.25, 0.75]).unwrap();
/// let point = indexer.point_for(key);
/// assert!((point[0] - 0.25).abs() < 1e-6);
/// ```
#[derive(Debug)]
pub struct EventIndexer<const ND: usize, I: CoordInt, K: MortonKey> {
    codec: CoordinateCodec<ND, I>,
    layout: MortonLayout<K>,
    parallel: bool,
    token: IndexBuildToken,
}

impl<const ND: usize, I: CoordInt, K: MortonKey> EventIndexer<ND, I, K> {
    /// Creates an indexer encoding `coord_bits` bits per axis; zero selects
    /// the full width of `I`.
    ///
    /// # Errors
    ///
    /// Returns an argument error if `coord_bits` is wider than `I` or the
    /// `(ND, coord_bits)` combination does not fit in `K`.
    pub fn new(bounds: SpaceBounds<ND>, coord_bits: u32) -> IndexResult<Self> {
        let bits = if coord_bits == 0 { I::BITS } else { coord_bits };
        let codec = CoordinateCodec::with_bits(bounds, bits)?;
        let layout = MortonLayout::new(ND, bits)?;
        Ok(EventIndexer {
            codec,
            layout,
            parallel: true,
            token: IndexBuildToken::new(),
        })
    }

    /// Enables or disables parallel bulk conversion.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn bounds(&self) -> &SpaceBounds<ND> {
        self.codec.bounds()
    }

    pub fn codec(&self) -> &CoordinateCodec<ND, I> {
        &self.codec
    }

    pub fn layout(&self) -> &MortonLayout<K> {
        &self.layout
    }

    pub fn coord_bits(&self) -> u32 {
        self.codec.bits()
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Morton key of a coordinate vector.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if a coordinate is outside the
    /// bounds.
    #[inline]
    pub fn key_for(&self, coords: &[f32; ND]) -> IndexResult<K> {
        let codes = self.codec.encode_point(coords)?;
        Ok(self.key_for_codes(&codes))
    }

    /// Morton key of one integer code per axis.
    #[inline]
    pub fn key_for_codes(&self, codes: &[I; ND]) -> K {
        self.layout.interleave_point(codes)
    }

    /// Per-axis integer codes stored in a key.
    #[inline]
    pub fn codes_for(&self, key: K) -> [I; ND] {
        self.layout.deinterleave_point(key)
    }

    /// Decoded coordinates of a key.
    #[inline]
    pub fn point_for(&self, key: K) -> [f32; ND] {
        self.codec.decode_point(&self.codes_for(key))
    }

    /// Switches every event to the key state.
    ///
    /// Returns the summed signal and squared error of the events.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if an event already holds a key or
    /// lies outside the bounds.
    pub fn index_events(&self, events: &mut [MdEvent<ND, K>]) -> IndexResult<EventTotals> {
        if self.parallel {
            events
                .par_iter_mut()
                .try_for_each(|event| event.to_index(self, &self.token))?;
        } else {
            for event in events.iter_mut() {
                event.to_index(self, &self.token)?;
            }
        }
        let totals = EventTotals::of(events);
        log::debug!(
            "Indexed {} events, total signal {}",
            events.len(),
            totals.signal
        );
        Ok(totals)
    }

    /// Switches every event back to the coordinate state.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if an event already holds
    /// coordinates.
    pub fn restore_coordinates(&self, events: &mut [MdEvent<ND, K>]) -> IndexResult<()> {
        if self.parallel {
            events
                .par_iter_mut()
                .try_for_each(|event| event.to_coordinates(self))
        } else {
            events
                .iter_mut()
                .try_for_each(|event| event.to_coordinates(self))
        }
    }

    /// Sorts indexed events ascending by key. Equal keys keep their order.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if any event still holds
    /// coordinates.
    pub fn sort_events(&self, events: &mut [MdEvent<ND, K>]) -> IndexResult<()> {
        if let Some(position) = events.iter().position(|event| !event.is_indexed()) {
            return Err(IndexError::precondition(format!(
                "event {} has not been indexed and cannot be sorted",
                position
            )));
        }
        if self.parallel {
            events.par_sort_by_key(|event| event.index_key());
        } else {
            events.sort_by_key(|event| event.index_key());
        }
        Ok(())
    }
}
