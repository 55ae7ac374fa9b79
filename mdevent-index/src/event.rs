//! Weighted point events and their two storage states.
//!
//! An event starts out holding its floating coordinates. While an index is
//! built over it, the coordinates are replaced by the event's Morton key; the
//! coordinates can be restored later from the key and the same bounds. Only
//! one of the two is stored at any time.

use crate::errors::{IndexError, IndexResult};
use crate::indexer::EventIndexer;
use crate::key::{CoordInt, MortonKey};
use serde::{Deserialize, Serialize};

/// Location of an event, either as coordinates or as its Morton key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventPoint<const ND: usize, K: MortonKey> {
    Coordinates([f32; ND]),
    Index(K),
}

/// Proof that the caller is the index-building subsystem.
///
/// Only [`EventIndexer`] creates these, so events can only be switched to
/// the key representation through it.
#[derive(Debug)]
pub struct IndexBuildToken {
    _private: (),
}

impl IndexBuildToken {
    pub(crate) fn new() -> Self {
        IndexBuildToken { _private: () }
    }
}

/// Summed signal and squared error of a set of events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTotals {
    pub signal: f64,
    pub error_squared: f64,
}

impl EventTotals {
    pub(crate) fn add_event<const ND: usize, K: MortonKey>(&mut self, event: &MdEvent<ND, K>) {
        self.signal += event.signal as f64;
        self.error_squared += event.error_squared as f64;
    }

    pub(crate) fn merge(self, other: EventTotals) -> EventTotals {
        EventTotals {
            signal: self.signal + other.signal,
            error_squared: self.error_squared + other.error_squared,
        }
    }

    /// Totals of a slice of events.
    pub fn of<const ND: usize, K: MortonKey>(events: &[MdEvent<ND, K>]) -> EventTotals {
        let mut totals = EventTotals::default();
        for event in events {
            totals.add_event(event);
        }
        totals
    }
}

/// An N-dimensional point event carrying a signal and its squared error.
///
/// # Examples
///
/// ```rust
/// use mdevent_index::MdEvent;
///
/// let event: MdEvent<3, u64> = MdEvent::new([1.0, 2.0, 3.0], 4.5, 0.25);
/// assert_eq!(event.coordinates(), Some(&[1.0, 2.0, 3.0]));
/// assert_eq!(event.index_key(), None);
/// assert_eq!(event.error(), 0.5);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MdEvent<const ND: usize, K: MortonKey> {
    point: EventPoint<ND, K>,
    signal: f32,
    error_squared: f32,
}

impl<const ND: usize, K: MortonKey> MdEvent<ND, K> {
    pub fn new(coordinates: [f32; ND], signal: f32, error_squared: f32) -> Self {
        MdEvent {
            point: EventPoint::Coordinates(coordinates),
            signal,
            error_squared,
        }
    }

    #[cfg(test)]
    pub(crate) fn from_key(key: K, signal: f32, error_squared: f32) -> Self {
        MdEvent {
            point: EventPoint::Index(key),
            signal,
            error_squared,
        }
    }

    pub fn point(&self) -> &EventPoint<ND, K> {
        &self.point
    }

    /// Coordinates, or `None` while the event holds its key.
    pub fn coordinates(&self) -> Option<&[f32; ND]> {
        match &self.point {
            EventPoint::Coordinates(coords) => Some(coords),
            EventPoint::Index(_) => None,
        }
    }

    /// Morton key, or `None` while the event holds its coordinates.
    #[inline]
    pub fn index_key(&self) -> Option<K> {
        match self.point {
            EventPoint::Index(key) => Some(key),
            EventPoint::Coordinates(_) => None,
        }
    }

    pub fn is_indexed(&self) -> bool {
        matches!(self.point, EventPoint::Index(_))
    }

    pub fn signal(&self) -> f32 {
        self.signal
    }

    pub fn error_squared(&self) -> f32 {
        self.error_squared
    }

    pub fn error(&self) -> f32 {
        self.error_squared.sqrt()
    }

    pub fn num_dims(&self) -> usize {
        ND
    }

    /// Replaces the coordinates with their Morton key.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if the event already holds a key or
    /// a coordinate lies outside the indexer's bounds. The event is left
    /// unchanged on error.
    pub fn to_index<I: CoordInt>(
        &mut self,
        indexer: &EventIndexer<ND, I, K>,
        _token: &IndexBuildToken,
    ) -> IndexResult<()> {
        match self.point {
            EventPoint::Coordinates(coords) => {
                self.point = EventPoint::Index(indexer.key_for(&coords)?);
                Ok(())
            }
            EventPoint::Index(_) => Err(IndexError::precondition(
                "event already holds its Morton key",
            )),
        }
    }

    /// Restores the coordinates from the Morton key.
    ///
    /// The restored values differ from the originals by at most one integer
    /// step of the codec.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if the event holds coordinates.
    pub fn to_coordinates<I: CoordInt>(
        &mut self,
        indexer: &EventIndexer<ND, I, K>,
    ) -> IndexResult<()> {
        match self.point {
            EventPoint::Index(key) => {
                self.point = EventPoint::Coordinates(indexer.point_for(key));
                Ok(())
            }
            EventPoint::Coordinates(_) => Err(IndexError::precondition(
                "event already holds coordinates",
            )),
        }
    }
}

/// Number of `f32` values one event occupies in a flat buffer.
pub const fn event_stride(num_dims: usize) -> usize {
    num_dims + 2
}

/// Flattens events into `[signal, error_squared, c_0, .., c_{ND-1}]` records.
///
/// Returns the buffer together with the summed signal and squared error.
///
/// # Errors
///
/// Returns a precondition violation if any event holds its key instead of
/// coordinates.
pub fn events_to_data<const ND: usize, K: MortonKey>(
    events: &[MdEvent<ND, K>],
) -> IndexResult<(Vec<f32>, EventTotals)> {
    let mut data = Vec::with_capacity(events.len() * event_stride(ND));
    let mut totals = EventTotals::default();
    for (position, event) in events.iter().enumerate() {
        let coords = event.coordinates().ok_or_else(|| {
            IndexError::precondition(format!(
                "event {} holds a Morton key and cannot be exported",
                position
            ))
        })?;
        data.push(event.signal);
        data.push(event.error_squared);
        data.extend_from_slice(coords);
        totals.add_event(event);
    }
    Ok((data, totals))
}

/// Rebuilds events from a buffer produced by [`events_to_data`].
///
/// # Errors
///
/// Returns an argument error if the buffer length is not a multiple of
/// `ND + 2`.
pub fn data_to_events<const ND: usize, K: MortonKey>(
    data: &[f32],
) -> IndexResult<Vec<MdEvent<ND, K>>> {
    let stride = event_stride(ND);
    if data.len() % stride != 0 {
        return Err(IndexError::argument(format!(
            "buffer length {} is not a multiple of {}",
            data.len(),
            stride
        )));
    }
    Ok(data
        .chunks_exact(stride)
        .map(|record| {
            let coords = std::array::from_fn(|axis| record[2 + axis]);
            MdEvent::new(coords, record[0], record[1])
        })
        .collect())
}
