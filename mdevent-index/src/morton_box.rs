//! Bulk-loaded 2^ND-ary box tree over a Morton-sorted event array.
//!
//! ## Structure
//!
//! Every box covers a closed key range `[morton_min, morton_max]` and the
//! half-open run of positions `[begin, end)` of the events whose keys fall in
//! that range. Because the array is sorted by key, each box's events are
//! contiguous, and a split only has to find `2^ND - 1` cut points with a
//! single forward scan.
//!
//! Boxes never own or copy events; every operation takes the event slice the
//! tree was built over.
//!
//! ## Splitting
//!
//! A box with `n` keys in its range is cut into `2^ND` children of
//! `width + 1` keys each, where `width = (morton_max - morton_min) >> ND`.
//! The last child absorbs the remainder when the range is not a multiple of
//! `2^ND`. Starting from the full key space this reproduces the aligned
//! Z-order cells: every child is one orthant of its parent.
//!
//! ## Queries
//!
//! A query walks the tree and classifies each box by the smallest aligned
//! Z-order cell enclosing its key range. Fully covered boxes contribute their
//! whole event range without descending. Leaves that are only partially
//! covered are scanned event by event.

use std::ops::Range;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::IndexConfig;
use crate::errors::{IndexError, IndexResult};
use crate::event::{EventTotals, MdEvent};
use crate::interleave::{enclosing_cell, MAX_DIMS};
use crate::key::MortonKey;
use crate::query::{Coverage, MortonQuery};

/// Shape statistics of a box tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub box_count: usize,
    pub leaf_count: usize,
    pub depth: usize,
    pub event_count: usize,
    pub largest_leaf: usize,
}

/// One node of the box tree.
#[derive(Debug, Clone, PartialEq)]
pub struct MortonBox<const ND: usize, K: MortonKey> {
    begin: usize,
    end: usize,
    morton_min: K,
    morton_max: K,
    depth: usize,
    totals: EventTotals,
    children: Vec<MortonBox<ND, K>>,
}

impl<const ND: usize, K: MortonKey> MortonBox<ND, K> {
    /// Creates a leaf over event positions `range` and keys
    /// `[morton_min, morton_max]`.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation if the position range or the key
    /// range is inverted.
    pub fn new(range: Range<usize>, morton_min: K, morton_max: K) -> IndexResult<Self> {
        if range.start > range.end {
            return Err(IndexError::precondition(format!(
                "event range {}..{} is inverted",
                range.start, range.end
            )));
        }
        if morton_min > morton_max {
            return Err(IndexError::precondition(format!(
                "key range {:?}..={:?} is inverted",
                morton_min, morton_max
            )));
        }
        Ok(MortonBox {
            begin: range.start,
            end: range.end,
            morton_min,
            morton_max,
            depth: 1,
            totals: EventTotals::default(),
            children: Vec::new(),
        })
    }

    pub fn event_range(&self) -> Range<usize> {
        self.begin..self.end
    }

    pub fn key_range(&self) -> (K, K) {
        (self.morton_min, self.morton_max)
    }

    pub fn num_events(&self) -> usize {
        self.end - self.begin
    }

    pub fn children(&self) -> &[MortonBox<ND, K>] {
        &self.children
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Depth of this box, the root being 1.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Summed signal of the box's events, filled in by distribution.
    pub fn signal(&self) -> f64 {
        self.totals.signal
    }

    /// Summed squared error of the box's events, filled in by distribution.
    pub fn error_squared(&self) -> f64 {
        self.totals.error_squared
    }

    pub fn totals(&self) -> EventTotals {
        self.totals
    }

    /// Splits the box recursively with the default parallel settings.
    ///
    /// See [`distribute_events_with_config`](Self::distribute_events_with_config).
    pub fn distribute_events(
        &mut self,
        events: &[MdEvent<ND, K>],
        split_threshold: usize,
        max_depth: usize,
    ) -> IndexResult<()> {
        let config = IndexConfig::builder()
            .split_threshold(split_threshold)
            .max_depth(max_depth)
            .build();
        self.distribute_events_with_config(events, &config)
    }

    /// Builds the subtree under this box, replacing any previous one.
    ///
    /// A box stays a leaf when it holds fewer than `split_threshold` events,
    /// when it sits at `max_depth`, or when its key range has fewer than
    /// `2^ND` keys. Sibling subtrees are built as rayon tasks when the config
    /// is parallel.
    ///
    /// A config with `num_threads > 0` gets a worker pool built for this call
    /// only; use [`distribute_events_in_pool`](Self::distribute_events_in_pool)
    /// to reuse one across builds.
    ///
    /// # Errors
    ///
    /// Returns a precondition violation unless the box's events exist, all
    /// hold their keys, are sorted ascending and lie inside the box's key
    /// range. Returns an argument error for an invalid config.
    pub fn distribute_events_with_config(
        &mut self,
        events: &[MdEvent<ND, K>],
        config: &IndexConfig,
    ) -> IndexResult<()> {
        config.validate()?;
        let pool = config.thread_pool()?;
        self.distribute_events_in_pool(events, config, pool.as_ref())
    }

    /// Same as [`distribute_events_with_config`](Self::distribute_events_with_config),
    /// but runs a parallel build inside `pool` instead of building one from
    /// the config. `None` uses the global rayon pool.
    ///
    /// # Errors
    ///
    /// Same as [`distribute_events_with_config`](Self::distribute_events_with_config).
    pub fn distribute_events_in_pool(
        &mut self,
        events: &[MdEvent<ND, K>],
        config: &IndexConfig,
        pool: Option<&rayon::ThreadPool>,
    ) -> IndexResult<()> {
        config.validate()?;
        self.check_events(events)?;

        let split_threshold = config.split_threshold().max(1);
        let max_depth = config.max_depth();
        let parallel = config.parallel();
        self.children.clear();

        match pool.filter(|_| parallel) {
            Some(pool) => pool.install(|| self.split(events, split_threshold, max_depth, parallel)),
            None => self.split(events, split_threshold, max_depth, parallel),
        }

        if log::log_enabled!(log::Level::Debug) {
            let stats = self.stats();
            log::debug!(
                "Distributed {} events into {} boxes ({} leaves, depth {}, largest leaf {})",
                stats.event_count,
                stats.box_count,
                stats.leaf_count,
                stats.depth,
                stats.largest_leaf
            );
        }
        Ok(())
    }

    fn check_events(&self, events: &[MdEvent<ND, K>]) -> IndexResult<()> {
        let slice = events.get(self.begin..self.end).ok_or_else(|| {
            IndexError::precondition(format!(
                "event range {}..{} exceeds the {} available events",
                self.begin,
                self.end,
                events.len()
            ))
        })?;
        let mut previous = self.morton_min;
        for (offset, event) in slice.iter().enumerate() {
            let position = self.begin + offset;
            let key = event.index_key().ok_or_else(|| {
                IndexError::precondition(format!("event {} has not been indexed", position))
            })?;
            if key < previous {
                return Err(IndexError::precondition(if offset == 0 {
                    format!("event {} is below the box key range", position)
                } else {
                    format!("event {} is out of key order", position)
                }));
            }
            previous = key;
        }
        if previous > self.morton_max {
            return Err(IndexError::precondition(
                "last event is above the box key range",
            ));
        }
        Ok(())
    }

    fn split(
        &mut self,
        events: &[MdEvent<ND, K>],
        split_threshold: usize,
        max_depth: usize,
        parallel: bool,
    ) {
        if self.depth >= max_depth || self.num_events() < split_threshold {
            self.totals = EventTotals::of(&events[self.begin..self.end]);
            return;
        }
        let Some(ranges) = self.child_key_ranges() else {
            self.totals = EventTotals::of(&events[self.begin..self.end]);
            return;
        };

        let mut children = Vec::with_capacity(ranges.len());
        let mut cursor = self.begin;
        for (lower, upper) in ranges {
            let start = cursor;
            while cursor < self.end && events[cursor].index_key().is_some_and(|k| k <= upper) {
                cursor += 1;
            }
            children.push(MortonBox {
                begin: start,
                end: cursor,
                morton_min: lower,
                morton_max: upper,
                depth: self.depth + 1,
                totals: EventTotals::default(),
                children: Vec::new(),
            });
        }
        debug_assert_eq!(cursor, self.end, "events beyond the last child");

        if parallel {
            children
                .par_iter_mut()
                .for_each(|child| child.split(events, split_threshold, max_depth, parallel));
        } else {
            for child in children.iter_mut() {
                child.split(events, split_threshold, max_depth, parallel);
            }
        }

        self.totals = children
            .iter()
            .fold(EventTotals::default(), |acc, child| acc.merge(child.totals));
        self.children = children;
    }

    /// Key ranges of the `2^ND` children, or `None` when the range is too
    /// narrow to give every child at least one key.
    fn child_key_ranges(&self) -> Option<Vec<(K, K)>> {
        if ND == 0 || ND > MAX_DIMS {
            return None;
        }
        let count = 1usize << ND;
        let width = self
            .morton_max
            .wrapping_sub(self.morton_min)
            .shr_bits(ND as u32);
        let step = width.wrapping_add(K::ONE);

        let mut ranges = Vec::with_capacity(count);
        let mut lower = self.morton_min;
        for i in 0..count {
            if i + 1 == count {
                ranges.push((lower, self.morton_max));
                break;
            }
            ranges.push((lower, lower.wrapping_add(width)));
            if self.morton_max.wrapping_sub(lower) < step {
                return None;
            }
            lower = lower.wrapping_add(step);
        }
        Some(ranges)
    }

    /// Position ranges of the events matching `query`.
    ///
    /// The ranges are ascending and disjoint, and adjacent ranges are merged.
    /// Their union is exactly the set of events whose keys satisfy
    /// [`MortonQuery::contains_key`].
    pub fn events_in_bounding_box(
        &self,
        events: &[MdEvent<ND, K>],
        query: &MortonQuery<K>,
    ) -> Vec<Range<usize>> {
        debug_assert_eq!(query.num_dims(), ND, "query built for another layout");
        let mut ranges = Vec::new();
        self.collect_ranges(events, query, &mut ranges);
        ranges
    }

    fn collect_ranges(
        &self,
        events: &[MdEvent<ND, K>],
        query: &MortonQuery<K>,
        out: &mut Vec<Range<usize>>,
    ) {
        if self.begin == self.end {
            return;
        }
        let (cell_min, cell_max) = enclosing_cell(self.morton_min, self.morton_max, ND);
        match query.coverage(cell_min, cell_max) {
            Coverage::Disjoint => {}
            Coverage::Full => push_range(out, self.begin..self.end),
            Coverage::Partial if !self.children.is_empty() => {
                for child in &self.children {
                    child.collect_ranges(events, query, out);
                }
            }
            Coverage::Partial => {
                let Some(slice) = events.get(self.begin..self.end) else {
                    return;
                };
                let mut run_start = None;
                for (offset, event) in slice.iter().enumerate() {
                    let hit = event.index_key().is_some_and(|k| query.contains_key(k));
                    match (hit, run_start) {
                        (true, None) => run_start = Some(self.begin + offset),
                        (false, Some(start)) => {
                            push_range(out, start..self.begin + offset);
                            run_start = None;
                        }
                        _ => {}
                    }
                }
                if let Some(start) = run_start {
                    push_range(out, start..self.end);
                }
            }
        }
    }

    /// Shape statistics of the subtree rooted here.
    pub fn stats(&self) -> TreeStats {
        let mut stats = TreeStats::default();
        self.accumulate_stats(&mut stats);
        stats
    }

    fn accumulate_stats(&self, stats: &mut TreeStats) {
        stats.box_count += 1;
        stats.depth = stats.depth.max(self.depth);
        if self.children.is_empty() {
            stats.leaf_count += 1;
            stats.event_count += self.num_events();
            stats.largest_leaf = stats.largest_leaf.max(self.num_events());
        } else {
            for child in &self.children {
                child.accumulate_stats(stats);
            }
        }
    }

    /// Leaves of the subtree in key order.
    pub fn leaves(&self) -> Vec<&MortonBox<ND, K>> {
        let mut leaves = Vec::new();
        self.collect_leaves(&mut leaves);
        leaves
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<&'a MortonBox<ND, K>>) {
        if self.children.is_empty() {
            out.push(self);
        } else {
            for child in &self.children {
                child.collect_leaves(out);
            }
        }
    }
}

fn push_range(out: &mut Vec<Range<usize>>, range: Range<usize>) {
    if range.is_empty() {
        return;
    }
    match out.last_mut() {
        Some(last) if last.end == range.start => last.end = range.end,
        _ => out.push(range),
    }
}
