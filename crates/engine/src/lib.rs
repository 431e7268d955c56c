//! # Engine - SiltKV Storage Engine
//!
//! The central orchestrator that ties together the [`memtable`], [`segment`],
//! and [`bloom`] crates into a complete LSM-style key-value store.
//!
//! ## Architecture
//!
//! ```text
//! Client
//!   |
//!   v
//! ┌───────────────────────────────────────────────┐
//! │                   ENGINE                      │
//! │                                               │
//! │ write.rs → Memtable insert → Bloom add        │
//! │              |                                │
//! │              |  (capacity reached?)           │
//! │              |            yes                 │
//! │              v                                │
//! │           flush() → new segment               │
//! │              |                                │
//! │              |  (segments >= threshold?)      │
//! │              |            yes                 │
//! │              v                                │
//! │           merge() → k-way merged segments     │
//! │                     + sparse index rebuild    │
//! │                                               │
//! │ read.rs → Bloom → Memtable → sparse index     │
//! │           → full scan (newest segment first)  │
//! └───────────────────────────────────────────────┘
//! ```
//!
//! ## Module Responsibilities
//!
//! | Module         | Purpose                                              |
//! |----------------|------------------------------------------------------|
//! | `lib.rs`       | `Engine` struct, config, accessors, `Debug`, `Drop`  |
//! | [`recovery`]   | segment loading, index/bloom rebuild, tmp cleanup    |
//! | [`write`]      | `insert()`, `delete()`, `flush()`, internal flush    |
//! | [`read`]       | `get()` and the staged read path                     |
//! | [`compaction`] | `compact()`: streaming k-way merge + install         |
//! | [`sparse`]     | sampled key → {segment, offset} locator index        |
//! | [`cancel`]     | cooperative cancellation token                       |
//!
//! ## Durability
//!
//! A write is durable once the memtable holding it has been flushed: the
//! segment file is fsynced and atomically renamed into place before it joins
//! the live set. Writes still in the memtable are lost on a crash — `close()`
//! flushes, and `Drop` does so best-effort. There is no write-ahead log.
//!
//! ## Concurrency
//!
//! All mutations serialize on the write half of one `RwLock`; readers share
//! the read half and see a consistent snapshot of {memtable, segment set,
//! sparse index, bloom filter}. Segment file handles are scoped to the
//! operation that opened them.

mod cancel;
mod compaction;
mod error;
mod read;
mod recovery;
mod sparse;
mod write;

pub use cancel::CancelToken;
pub use error::Error;
pub use memtable::TOMBSTONE;

use bloom::BloomFilter;
use memtable::Memtable;
use segment::{Segment, SegmentStamp};
use sparse::SparseIndex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

/// Name of the persisted bloom filter file inside the data directory.
pub const BLOOM_FILE_NAME: &str = "bloom.filter";

/// Engine configuration.
///
/// Validated by [`Engine::open`]; the defaults mirror a small write-heavy
/// deployment and are deliberately low so the hierarchy is exercised early.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Memtable entry cap; reaching it triggers a flush on the next insert.
    pub max_in_memory_size: usize,
    /// Sparse index sampling stride: every Nth entry gets a locator.
    pub sparse_offset: usize,
    /// Maximum entries per merge output segment.
    pub segment_size: usize,
    /// Segment count that triggers a merge after a flush. Must be >= 2.
    pub merge_threshold: usize,
    /// When `false`, segment files are deleted again on `close()`.
    pub persist_segments: bool,
    /// Data directory; created if absent.
    pub base_path: PathBuf,
    /// Bloom filter sizing: expected number of distinct keys.
    pub bloom_expected_items: usize,
    /// Bloom filter sizing: target false positive rate, in (0, 1).
    pub bloom_false_positive_rate: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_in_memory_size: 1000,
            sparse_offset: 300,
            segment_size: 50,
            merge_threshold: 3,
            persist_segments: true,
            base_path: PathBuf::from("sst_data"),
            bloom_expected_items: 10_000,
            bloom_false_positive_rate: 0.01,
        }
    }
}

impl EngineConfig {
    fn validate(&self) -> Result<(), Error> {
        if self.max_in_memory_size == 0 {
            return Err(Error::Validation("max_in_memory_size must be > 0".into()));
        }
        if self.sparse_offset == 0 {
            return Err(Error::Validation("sparse_offset must be > 0".into()));
        }
        if self.segment_size == 0 {
            return Err(Error::Validation("segment_size must be > 0".into()));
        }
        if self.merge_threshold < 2 {
            return Err(Error::Validation("merge_threshold must be >= 2".into()));
        }
        if self.bloom_expected_items == 0 {
            return Err(Error::Validation("bloom_expected_items must be > 0".into()));
        }
        if !(self.bloom_false_positive_rate > 0.0 && self.bloom_false_positive_rate < 1.0) {
            return Err(Error::Validation(
                "bloom_false_positive_rate must be in (0, 1)".into(),
            ));
        }
        Ok(())
    }
}

/// Everything the read path snapshots together. Guarded by the engine's
/// `RwLock`: mutators hold the write half, readers the read half.
pub(crate) struct EngineState {
    pub(crate) mem: Memtable,
    /// Live segments in filename order (ascending stamp for engine-written
    /// files). Sparse-index locators refer to positions in this vec.
    pub(crate) segments: Vec<Arc<Segment>>,
    pub(crate) sparse: SparseIndex,
    pub(crate) bloom: BloomFilter,
}

/// The storage engine: a persistent, string-keyed, string-valued map.
///
/// # Write Path
///
/// 1. Validate the key (non-empty, not whitespace-only).
/// 2. If the memtable is at capacity, flush it to a new segment; if the
///    segment count then reaches `merge_threshold`, merge all segments.
/// 3. Insert into the memtable and add the key to the bloom filter.
///
/// # Read Path
///
/// 1. Bloom filter — a negative answer ends the lookup with "absent".
/// 2. Memtable — freshest data, tombstones included.
/// 3. Sparse index — seek to the nearest sampled key at or below the target
///    and scan forward inside each candidate segment.
/// 4. Full scan of every segment, newest first.
///
/// The deletion sentinel [`TOMBSTONE`] is reported as "absent" wherever it
/// is found.
pub struct Engine {
    config: EngineConfig,
    state: RwLock<EngineState>,
    stamps: Mutex<StampGen>,
    /// Segment scans performed by the read path; lets tests observe that a
    /// bloom-filter negative produced no segment I/O.
    segment_reads: AtomicU64,
}

impl Engine {
    /// Opens (or creates) an engine over `config.base_path`.
    ///
    /// Existing segment files are loaded in filename order, the sparse index
    /// is rebuilt, and every key is replayed into the bloom filter (warm
    /// started from [`BLOOM_FILE_NAME`] when that file is present and
    /// readable). Leftover `.tmp` files from interrupted writes are removed.
    ///
    /// The data directory must be owned by a single engine instance at a
    /// time; two engines over one directory is undefined behavior.
    pub fn open(config: EngineConfig) -> Result<Self, Error> {
        config.validate()?;
        recovery::bootstrap(config)
    }

    /// The configuration this engine was opened with.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The data directory.
    #[must_use]
    pub fn base_path(&self) -> &Path {
        &self.config.base_path
    }

    /// Number of live segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.read_state().map(|s| s.segments.len()).unwrap_or(0)
    }

    /// Number of entries currently in the memtable.
    #[must_use]
    pub fn memtable_len(&self) -> usize {
        self.read_state().map(|s| s.mem.len()).unwrap_or(0)
    }

    /// Total segment scans performed by the read path so far.
    #[must_use]
    pub fn segment_reads(&self) -> u64 {
        self.segment_reads.load(Ordering::Relaxed)
    }

    /// Returns `true` if the bloom filter admits `key` to the slow path.
    #[must_use]
    pub fn might_contain(&self, key: &str) -> bool {
        self.read_state()
            .map(|s| s.bloom.might_contain(key))
            .unwrap_or(false)
    }

    pub(crate) fn read_state(&self) -> Result<std::sync::RwLockReadGuard<'_, EngineState>, Error> {
        self.state.read().map_err(|_| Error::lock_poisoned())
    }

    pub(crate) fn write_state(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, EngineState>, Error> {
        self.state.write().map_err(|_| Error::lock_poisoned())
    }

    /// Next segment stamp, monotonically increasing across flushes and
    /// merges within this process.
    pub(crate) fn next_stamp(&self) -> SegmentStamp {
        match self.stamps.lock() {
            Ok(mut stamps) => stamps.next(),
            Err(poisoned) => poisoned.into_inner().next(),
        }
    }

    pub(crate) fn new_from_parts(
        config: EngineConfig,
        state: EngineState,
        stamps: StampGen,
    ) -> Self {
        Self {
            config,
            state: RwLock::new(state),
            stamps: Mutex::new(stamps),
            segment_reads: AtomicU64::new(0),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut dbg = f.debug_struct("Engine");
        dbg.field("base_path", &self.config.base_path)
            .field("max_in_memory_size", &self.config.max_in_memory_size)
            .field("sparse_offset", &self.config.sparse_offset)
            .field("segment_size", &self.config.segment_size)
            .field("merge_threshold", &self.config.merge_threshold);
        if let Ok(state) = self.read_state() {
            dbg.field("memtable_entries", &state.mem.len())
                .field("segment_count", &state.segments.len())
                .field("sparse_keys", &state.sparse.len());
        }
        dbg.finish()
    }
}

/// Best-effort flush on drop.
///
/// Errors are ignored because `Drop` cannot propagate them; callers that
/// need the result should invoke [`Engine::close`] explicitly.
impl Drop for Engine {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

/// Generates segment stamps: wall-clock seconds plus a fixed-width
/// fractional counter that increments whenever the clock has not advanced,
/// keeping stamps strictly increasing within one process.
pub(crate) struct StampGen {
    last_secs: u64,
    counter: u32,
}

impl StampGen {
    /// Seeds the generator so the next stamp sorts after every stamp in
    /// `existing` (important when reopening a directory written moments ago).
    pub(crate) fn seeded(existing: &[Arc<Segment>]) -> Self {
        let mut seeded = Self {
            last_secs: 0,
            counter: 0,
        };
        if let Some(max) = existing.iter().map(|s| s.stamp()).max() {
            seeded.last_secs = max.secs;
            seeded.counter = max.frac.parse().unwrap_or(999_999);
        }
        seeded
    }

    fn next(&mut self) -> SegmentStamp {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        if now > self.last_secs {
            self.last_secs = now;
            self.counter = 0;
        } else {
            self.counter += 1;
            if self.counter > 999_999 {
                self.last_secs += 1;
                self.counter = 0;
            }
        }
        SegmentStamp::new(self.last_secs, format!("{:06}", self.counter))
    }
}

#[cfg(test)]
mod tests;
