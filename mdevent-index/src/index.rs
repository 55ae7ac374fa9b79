use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;

use crate::codec::SpaceBounds;
use crate::config::IndexConfig;
use crate::errors::IndexResult;
use crate::event::{EventTotals, MdEvent};
use crate::indexer::EventIndexer;
use crate::key::{CoordInt, MortonKey};
use crate::morton_box::{MortonBox, TreeStats};
use crate::query::MortonQuery;

/// An event array together with the box tree built over it.
///
/// The events are indexed and sorted once, in [`build`](Self::build), and
/// never move afterwards. The tree is published behind an `Arc`; a
/// [`rebuild`](Self::rebuild) builds a complete replacement and swaps it in,
/// so concurrent readers keep the tree they started with and never observe a
/// partially built one.
///
/// # Examples
///
/// ```rust
/// use mdevent_index::{IndexConfig, MdEvent, MortonEventIndex, SpaceBounds};
///
/// let bounds = SpaceBounds::new([(0.0, 10.0), (0.0, 10.0)]).unwrap();
/// let events: Vec<MdEvent<2, u64>> = (0..100)
///     .map(|i| MdEvent::new([(i % 10) as f32, (i / 10) as f32], 1.0, 1.0))
///     .collect();
///
/// let config = IndexConfig::builder().split_threshold(8).build();
/// let index: MortonEventIndex<2, u32, u64> =
///     MortonEventIndex::build(events, bounds, config).unwrap();
///
/// let ranges = index.events_in_region(&[(2.0, 4.0), (-1.0, 9.0)]).unwrap();
/// let found: usize = ranges.iter().map(|r| r.len()).sum();
/// assert_eq!(found, 30);
/// ```
#[derive(Debug)]
pub struct MortonEventIndex<const ND: usize, I: CoordInt, K: MortonKey> {
    indexer: EventIndexer<ND, I, K>,
    events: Vec<MdEvent<ND, K>>,
    totals: EventTotals,
    published: RwLock<Published<ND, K>>,
}

/// The tree served to readers, the config it was built with and the worker
/// pool kept for the next rebuild. Swapped as one unit.
#[derive(Debug)]
struct Published<const ND: usize, K: MortonKey> {
    tree: Arc<MortonBox<ND, K>>,
    config: IndexConfig,
    pool: Option<Arc<rayon::ThreadPool>>,
}

impl<const ND: usize, I: CoordInt, K: MortonKey> MortonEventIndex<ND, I, K> {
    /// Indexes, sorts and distributes `events`.
    ///
    /// # Errors
    ///
    /// Returns an argument error for an invalid config or an unsupported
    /// `(ND, coord_bits, K)` combination, and a precondition violation if an
    /// event lies outside `bounds` or is already indexed.
    pub fn build(
        mut events: Vec<MdEvent<ND, K>>,
        bounds: SpaceBounds<ND>,
        config: IndexConfig,
    ) -> IndexResult<Self> {
        config.validate()?;
        let started = Instant::now();
        log::info!("Building Morton index over {} events", events.len());

        let indexer = EventIndexer::new(bounds, config.coord_bits())?.with_parallel(config.parallel());
        let totals = indexer.index_events(&mut events)?;
        indexer.sort_events(&mut events)?;
        log::debug!(
            "Indexed and sorted {} events in {:?}",
            events.len(),
            started.elapsed()
        );

        let pool = reuse_pool(&config, None)?;
        let tree = build_tree(&indexer, &events, &config, pool.as_deref())?;
        log::info!(
            "Built Morton index over {} events in {:?}",
            events.len(),
            started.elapsed()
        );

        Ok(MortonEventIndex {
            indexer,
            events,
            totals,
            published: RwLock::new(Published {
                tree: Arc::new(tree),
                config,
                pool,
            }),
        })
    }

    /// Builds a new tree with `config` and publishes it.
    ///
    /// Readers holding the previous tree keep using it until they drop it.
    /// The tree and `config` become visible together. Only the tree shape
    /// settings are applied; `coord_bits` is fixed by the keys computed at
    /// build time. A dedicated worker pool of the same size is reused.
    ///
    /// # Errors
    ///
    /// Returns an argument error for an invalid config.
    pub fn rebuild(&self, config: IndexConfig) -> IndexResult<()> {
        config.validate()?;
        let started = Instant::now();
        let pool = reuse_pool(&config, self.published.read().pool.as_ref())?;
        let tree = build_tree(&self.indexer, &self.events, &config, pool.as_deref())?;
        *self.published.write() = Published {
            tree: Arc::new(tree),
            config,
            pool,
        };
        log::info!(
            "Published rebuilt Morton tree over {} events in {:?}",
            self.events.len(),
            started.elapsed()
        );
        Ok(())
    }

    /// The currently published tree.
    pub fn tree(&self) -> Arc<MortonBox<ND, K>> {
        self.published.read().tree.clone()
    }

    /// The published tree together with the config it was built with.
    pub fn tree_and_config(&self) -> (Arc<MortonBox<ND, K>>, IndexConfig) {
        let published = self.published.read();
        (published.tree.clone(), published.config.clone())
    }

    /// Events sorted by Morton key; returned ranges index into this slice.
    pub fn events(&self) -> &[MdEvent<ND, K>] {
        &self.events
    }

    pub fn indexer(&self) -> &EventIndexer<ND, I, K> {
        &self.indexer
    }

    /// The config of the published tree.
    pub fn config(&self) -> IndexConfig {
        self.published.read().config.clone()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn total_signal(&self) -> f64 {
        self.totals.signal
    }

    pub fn total_error_squared(&self) -> f64 {
        self.totals.error_squared
    }

    pub fn stats(&self) -> TreeStats {
        self.tree().stats()
    }

    /// Runs a prepared query against the published tree.
    pub fn query(&self, query: &MortonQuery<K>) -> Vec<Range<usize>> {
        self.tree().events_in_bounding_box(&self.events, query)
    }

    /// Ranges of events whose keys lie inside the box spanned by the keys
    /// `lower` and `upper`.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if `lower` is above `upper` on any
    /// axis.
    pub fn events_in_bounding_box(&self, lower: K, upper: K) -> IndexResult<Vec<Range<usize>>> {
        let query = MortonQuery::new(self.indexer.layout(), lower, upper)?;
        Ok(self.query(&query))
    }

    /// Ranges of events inside a floating-point region, one `(lo, hi)` pair
    /// per axis.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if any axis has `lo > hi`.
    pub fn events_in_region(&self, region: &[(f32, f32); ND]) -> IndexResult<Vec<Range<usize>>> {
        match MortonQuery::from_region(&self.indexer, region)? {
            Some(query) => Ok(self.query(&query)),
            None => Ok(Vec::new()),
        }
    }

    /// Summed signal and squared error of the events in `ranges`.
    pub fn totals_in(&self, ranges: &[Range<usize>]) -> EventTotals {
        ranges
            .iter()
            .filter_map(|range| self.events.get(range.clone()))
            .fold(EventTotals::default(), |acc, slice| {
                acc.merge(EventTotals::of(slice))
            })
    }

    /// Summed signal and squared error of the events inside a region.
    ///
    /// # Errors
    ///
    /// Same as [`events_in_region`](Self::events_in_region).
    pub fn integrate_region(&self, region: &[(f32, f32); ND]) -> IndexResult<EventTotals> {
        let ranges = self.events_in_region(region)?;
        Ok(self.totals_in(&ranges))
    }

    /// Consumes the index and returns the events with their coordinates
    /// restored, in key order.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if an event is not in the key state.
    pub fn into_events(self) -> IndexResult<Vec<MdEvent<ND, K>>> {
        let MortonEventIndex {
            indexer,
            mut events,
            ..
        } = self;
        indexer.restore_coordinates(&mut events)?;
        Ok(events)
    }
}

fn build_tree<const ND: usize, I: CoordInt, K: MortonKey>(
    indexer: &EventIndexer<ND, I, K>,
    events: &[MdEvent<ND, K>],
    config: &IndexConfig,
    pool: Option<&rayon::ThreadPool>,
) -> IndexResult<MortonBox<ND, K>> {
    let mut root = MortonBox::new(0..events.len(), K::ZERO, indexer.layout().max_key())?;
    root.distribute_events_in_pool(events, config, pool)?;
    Ok(root)
}

/// Keeps `current` when it already has the size `config` asks for, otherwise
/// builds the pool the config describes.
fn reuse_pool(
    config: &IndexConfig,
    current: Option<&Arc<rayon::ThreadPool>>,
) -> IndexResult<Option<Arc<rayon::ThreadPool>>> {
    match current {
        Some(pool) if config.parallel() && pool.current_num_threads() == config.num_threads() => {
            Ok(Some(Arc::clone(pool)))
        }
        _ => Ok(config.thread_pool()?.map(Arc::new)),
    }
}
