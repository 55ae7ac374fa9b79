use mdevent_index::{
    CoordInt, IndexConfig, IndexResult, MdEvent, MortonEventIndex, MortonKey, SpaceBounds,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::BTreeSet;
use std::ops::Range;
use std::sync::{Arc, Once};
use std::time::Instant;

static LOGGER: Once = Once::new();

/// Installs a test logger once per process. `RUST_LOG` controls the level.
pub fn init_logger() {
    LOGGER.call_once(|| {
        let _ = colog::default_builder().is_test(true).try_init();
    });
}

/// Runs a test against a freshly built context and reports the failure with
/// its timing.
pub fn run_test<C, B, T>(before: B, test: T)
where
    B: FnOnce() -> IndexResult<C>,
    T: FnOnce(C) -> IndexResult<()>,
{
    init_logger();
    let start_time = Instant::now();
    let result = before().and_then(test);
    let elapsed = start_time.elapsed();
    if let Err(e) = result {
        panic!("Test failed after {:?}: {}", elapsed, e);
    }
    log::debug!("Test passed in {:?}", elapsed);
}

pub type TestIndex = MortonEventIndex<3, u16, u64>;

/// A built index plus the coordinates it was built from.
#[derive(Clone)]
pub struct TestContext {
    index: Arc<TestIndex>,
    source: Arc<Vec<MdEvent<3, u64>>>,
}

impl TestContext {
    pub fn new(index: TestIndex, source: Vec<MdEvent<3, u64>>) -> Self {
        TestContext {
            index: Arc::new(index),
            source: Arc::new(source),
        }
    }

    pub fn index(&self) -> Arc<TestIndex> {
        self.index.clone()
    }

    /// Events as they were before indexing, in their original order.
    pub fn source(&self) -> &[MdEvent<3, u64>] {
        &self.source
    }
}

pub fn test_bounds() -> SpaceBounds<3> {
    SpaceBounds::new([(-50.0, 50.0), (-20.0, 20.0), (0.0, 100.0)]).expect("valid bounds")
}

pub fn create_test_context() -> IndexResult<TestContext> {
    create_test_context_with(IndexConfig::builder().split_threshold(64).build())
}

pub fn create_test_context_with(config: IndexConfig) -> IndexResult<TestContext> {
    let bounds = test_bounds();
    let source = random_events(&bounds, 20_000, 17);
    let index = MortonEventIndex::build(source.clone(), bounds, config)?;
    Ok(TestContext::new(index, source))
}

/// Uniformly distributed events inside `bounds`, with a cluster around the
/// center so the tree gets uneven depth.
pub fn random_events<const ND: usize, K: MortonKey>(
    bounds: &SpaceBounds<ND>,
    count: usize,
    seed: u64,
) -> Vec<MdEvent<ND, K>> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|i| {
            let coords = std::array::from_fn(|axis| {
                let (min, max) = bounds.extent(axis);
                let (min, max) = (min.next_up(), max.next_down());
                if i % 4 == 0 {
                    let mid = (min + max) / 2.0;
                    let spread = (max - min) / 20.0;
                    rng.gen_range(mid - spread..mid + spread)
                } else {
                    rng.gen_range(min..=max)
                }
            });
            MdEvent::new(coords, rng.gen_range(0.0..5.0), rng.gen_range(0.0..1.0))
        })
        .collect()
}

/// A random sub-region of `bounds`, sometimes reaching past its edges.
pub fn random_region<const ND: usize>(rng: &mut StdRng, bounds: &SpaceBounds<ND>) -> [(f32, f32); ND] {
    std::array::from_fn(|axis| {
        let (min, max) = bounds.extent(axis);
        let width = max - min;
        let a = rng.gen_range(min - width * 0.1..max + width * 0.1);
        let b = rng.gen_range(min - width * 0.1..max + width * 0.1);
        (a.min(b), a.max(b))
    })
}

/// Expands ranges into the positions they cover.
pub fn positions(ranges: &[Range<usize>]) -> BTreeSet<usize> {
    ranges.iter().flat_map(|r| r.clone()).collect()
}

/// Positions of the indexed events whose decoded coordinates lie inside
/// `region`, found by scanning every event.
pub fn brute_force_region<const ND: usize, I: CoordInt, K: MortonKey>(
    index: &MortonEventIndex<ND, I, K>,
    region: &[(f32, f32); ND],
) -> BTreeSet<usize> {
    let indexer = index.indexer();
    index
        .events()
        .iter()
        .enumerate()
        .filter(|(_, event)| {
            let point = indexer.point_for(event.index_key().expect("indexed"));
            point
                .iter()
                .zip(region.iter())
                .all(|(&v, &(lo, hi))| v >= lo && v <= hi)
        })
        .map(|(position, _)| position)
        .collect()
}

/// Checks that ranges are ascending, non-empty and never touch each other.
pub fn is_coalesced(ranges: &[Range<usize>]) -> bool {
    ranges.iter().all(|r| !r.is_empty()) && ranges.windows(2).all(|w| w[0].end < w[1].start)
}
