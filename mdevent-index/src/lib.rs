//! # mdevent-index - Morton-ordered index for N-dimensional events
//!
//! This crate indexes large collections of weighted point events (a signal,
//! its squared error and ND floating coordinates) for fast axis-aligned
//! range queries. Coordinates are quantized per axis, bit-interleaved into a
//! single Morton (Z-order) key, and the key-sorted event array is partitioned
//! by a bulk-loaded 2^ND-ary box tree.
//!
//! ## Features
//!
//! - **Wide Keys**: native keys up to `u128` plus a two-word [`U256`]
//! - **Generated Layouts**: pad/compact shift-mask tables for any
//!   `(ND, width)` pair that fits the key
//! - **Parallel Build**: sibling subtrees built as rayon fork-join tasks
//! - **Exact Queries**: per-axis masked key comparison, results returned as
//!   position ranges into the sorted array, never copies
//! - **Build-Then-Publish**: [`MortonEventIndex`] swaps in rebuilt trees
//!   without disturbing concurrent readers
//!
//! ## Quick Start
//!
//! ```rust
//! use mdevent_index::{IndexConfig, MdEvent, MortonEventIndex, SpaceBounds};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bounds = SpaceBounds::new([(-10.0, 10.0), (-10.0, 10.0), (-10.0, 10.0)])?;
//! let events: Vec<MdEvent<3, u64>> = (0..1000)
//!     .map(|i| {
//!         let t = i as f32 / 100.0 - 5.0;
//!         MdEvent::new([t, -t, t * 0.5], 1.0, 1.0)
//!     })
//!     .collect();
//!
//! let index: MortonEventIndex<3, u16, u64> =
//!     MortonEventIndex::build(events, bounds, IndexConfig::default())?;
//!
//! let totals = index.integrate_region(&[(0.0, 10.0), (-10.0, 10.0), (-10.0, 10.0)])?;
//! assert!(totals.signal > 0.0);
//! # Ok(())
//! # }
//! ```
//!
//! ## Box Tree API
//!
//! ```rust
//! use mdevent_index::{MortonBox, MortonLayout, MortonQuery};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let layout: MortonLayout<u16> = MortonLayout::new(2, 8)?;
//! let lower = layout.interleave(&[10u8, 10])?;
//! let upper = layout.interleave(&[20u8, 30])?;
//! let query = MortonQuery::new(&layout, lower, upper)?;
//!
//! let root = MortonBox::<2, u16>::new(0..0, 0, layout.max_key())?;
//! assert!(root.events_in_bounding_box(&[], &query).is_empty());
//! # Ok(())
//! # }
//! ```

// Bit-level building blocks
pub mod codec;
pub mod interleave;
pub mod key;

// Events and the tree over them
pub mod event;
pub mod indexer;
pub mod morton_box;
pub mod query;

pub mod config;
pub mod errors;
pub mod index;

pub use codec::{decode_value, encode_value, CoordinateCodec, SpaceBounds};
pub use interleave::{deinterleave, enclosing_cell, interleave, MortonLayout, MAX_DIMS};
pub use key::{CoordInt, MortonKey, U256};

pub use event::{
    data_to_events, event_stride, events_to_data, EventPoint, EventTotals, IndexBuildToken,
    MdEvent,
};
pub use indexer::EventIndexer;
pub use morton_box::{MortonBox, TreeStats};
pub use query::{Coverage, MortonQuery};

pub use config::{IndexConfig, IndexConfigBuilder, DEFAULT_MAX_DEPTH, DEFAULT_SPLIT_THRESHOLD};
pub use errors::{IndexError, IndexResult};
pub use index::MortonEventIndex;
