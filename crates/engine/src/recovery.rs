//! Cold-start path: loading segments, rebuilding the sparse index, and
//! replaying keys into the bloom filter.
//!
//! The directory listing is the sole authority on the live segment set —
//! every file matching the `<seconds>.<fraction>.txt` pattern is loaded, in
//! filename order. Leftover `.tmp` files from interrupted flushes or merges
//! are removed first; they were never part of the live set.
//!
//! The bloom filter is warm-started from its persisted file when one is
//! present and readable, then every segment key is replayed into it during
//! the same pass that rebuilds the sparse index. Replaying keeps the filter
//! sound (no false negatives) even when the persisted file is stale, e.g.
//! after a crash between a flush and a clean close.

use crate::sparse::SparseIndex;
use crate::{Engine, EngineConfig, EngineState, Error, StampGen, BLOOM_FILE_NAME};
use bloom::BloomFilter;
use memtable::Memtable;
use segment::{format, Segment};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub(crate) fn bootstrap(config: EngineConfig) -> Result<Engine, Error> {
    std::fs::create_dir_all(&config.base_path)?;
    cleanup_tmp_files(&config.base_path);

    let segments = load_segments(&config.base_path)?;
    let mut bloom = load_or_new_bloom(&config);

    let mut sparse = SparseIndex::new(config.sparse_offset);
    sparse.rebuild(&segments, |key| bloom.add(key))?;

    info!(
        base_path = %config.base_path.display(),
        segments = segments.len(),
        sampled_keys = sparse.len(),
        "engine opened"
    );

    let stamps = StampGen::seeded(&segments);
    let state = EngineState {
        mem: Memtable::new(config.max_in_memory_size),
        segments,
        sparse,
        bloom,
    };
    Ok(Engine::new_from_parts(config, state, stamps))
}

/// Loads every file matching the segment-name pattern, sorted by filename.
fn load_segments(base_path: &Path) -> Result<Vec<Arc<Segment>>, Error> {
    let mut names: Vec<String> = Vec::new();
    for dir_entry in std::fs::read_dir(base_path)? {
        let dir_entry = dir_entry?;
        if let Some(name) = dir_entry.file_name().to_str() {
            if format::is_segment_file_name(name) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let mut segments = Vec::with_capacity(names.len());
    for name in &names {
        let path = base_path.join(name);
        let segment = Segment::open(&path).map_err(|e| Error::from_segment(e, &path))?;
        segments.push(Arc::new(segment));
    }
    Ok(segments)
}

/// Loads the persisted bloom filter, falling back to a fresh one sized from
/// the config. Never fails the open: a missing file is the normal first-run
/// case and a corrupt one is only worth a warning.
fn load_or_new_bloom(config: &EngineConfig) -> BloomFilter {
    let path = config.base_path.join(BLOOM_FILE_NAME);
    match BloomFilter::load_from_path(&path) {
        Ok(filter) => {
            debug!(path = %path.display(), "loaded persisted bloom filter");
            filter
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            BloomFilter::new(config.bloom_expected_items, config.bloom_false_positive_rate)
        }
        Err(e) => {
            warn!(path = %path.display(), %e, "unreadable bloom filter file, rebuilding from segments");
            BloomFilter::new(config.bloom_expected_items, config.bloom_false_positive_rate)
        }
    }
}

/// Removes leftover `.tmp` files from interrupted flushes and merges.
fn cleanup_tmp_files(base_path: &Path) {
    if let Ok(dir_entries) = std::fs::read_dir(base_path) {
        for dir_entry in dir_entries.flatten() {
            let path = dir_entry.path();
            if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
                if name.ends_with(".tmp") {
                    let _ = std::fs::remove_file(&path);
                }
            }
        }
    }
}
