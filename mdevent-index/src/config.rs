use serde::{Deserialize, Serialize};

use crate::errors::{IndexError, IndexResult};

/// Default number of events below which a box is not split.
pub const DEFAULT_SPLIT_THRESHOLD: usize = 1000;

/// Default maximum tree depth, counting the root as depth 1.
pub const DEFAULT_MAX_DEPTH: usize = 20;

/// Tuning parameters for building a Morton box tree.
///
/// Create via `IndexConfig::builder()` or `IndexConfig::default()`:
///
/// - `split_threshold`: boxes holding fewer events stay leaves (1000)
/// - `max_depth`: depth limit including the root (20)
/// - `parallel`: fork-join tree construction on rayon (true)
/// - `num_threads`: size of a dedicated pool; 0 uses the global pool (0)
/// - `coord_bits`: bits per axis; 0 uses the full coordinate type (0)
///
/// # Examples
///
/// ```rust
/// use mdevent_index::IndexConfig;
///
/// let config = IndexConfig::builder()
///     .split_threshold(64)
///     .max_depth(8)
///     .parallel(false)
///     .build();
/// assert_eq!(config.split_threshold(), 64);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    split_threshold: usize,
    max_depth: usize,
    parallel: bool,
    num_threads: usize,
    coord_bits: u32,
}

impl Default for IndexConfig {
    fn default() -> Self {
        IndexConfig {
            split_threshold: DEFAULT_SPLIT_THRESHOLD,
            max_depth: DEFAULT_MAX_DEPTH,
            parallel: true,
            num_threads: 0,
            coord_bits: 0,
        }
    }
}

impl IndexConfig {
    /// Creates a new builder starting from the default configuration.
    pub fn builder() -> IndexConfigBuilder {
        IndexConfigBuilder::new()
    }

    #[inline]
    pub fn split_threshold(&self) -> usize {
        self.split_threshold
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[inline]
    pub fn parallel(&self) -> bool {
        self.parallel
    }

    #[inline]
    pub fn num_threads(&self) -> usize {
        self.num_threads
    }

    #[inline]
    pub fn coord_bits(&self) -> u32 {
        self.coord_bits
    }

    /// Checks the settings that are invalid regardless of the event type.
    ///
    /// # Errors
    ///
    /// Returns an argument error if `max_depth` is zero or `coord_bits` is
    /// above 64.
    pub fn validate(&self) -> IndexResult<()> {
        if self.max_depth == 0 {
            return Err(IndexError::argument(
                "max_depth must be at least 1 (the root box)",
            ));
        }
        if self.coord_bits > 64 {
            return Err(IndexError::argument(format!(
                "coord_bits {} is above 64",
                self.coord_bits
            )));
        }
        Ok(())
    }

    /// Builds the dedicated worker pool, if one is configured.
    pub(crate) fn thread_pool(&self) -> IndexResult<Option<rayon::ThreadPool>> {
        if !self.parallel || self.num_threads == 0 {
            return Ok(None);
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads)
            .thread_name(|i| format!("mdevent-index-{}", i))
            .build()?;
        Ok(Some(pool))
    }
}

/// Fluent builder for [`IndexConfig`].
#[derive(Debug, Clone, Default)]
pub struct IndexConfigBuilder {
    config: IndexConfig,
}

impl IndexConfigBuilder {
    #[inline]
    pub fn new() -> IndexConfigBuilder {
        IndexConfigBuilder {
            config: IndexConfig::default(),
        }
    }

    /// Settings for small event sets and debugging: sequential build on a
    /// shallow tree with small leaves.
    #[inline]
    pub fn small_preset(self) -> Self {
        self.split_threshold(16).max_depth(8).parallel(false)
    }

    #[inline]
    pub fn split_threshold(mut self, split_threshold: usize) -> Self {
        self.config.split_threshold = split_threshold;
        self
    }

    #[inline]
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.config.max_depth = max_depth;
        self
    }

    #[inline]
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.config.parallel = parallel;
        self
    }

    #[inline]
    pub fn num_threads(mut self, num_threads: usize) -> Self {
        self.config.num_threads = num_threads;
        self
    }

    #[inline]
    pub fn coord_bits(mut self, coord_bits: u32) -> Self {
        self.config.coord_bits = coord_bits;
        self
    }

    pub fn build(self) -> IndexConfig {
        self.config
    }
}
