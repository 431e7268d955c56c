//! Sparse index: sampled keys mapped to {segment, byte offset} locators.
//!
//! The index is an in-memory `BTreeMap` from every Nth key (a global
//! counter across the whole segment set, not per segment) to the locations
//! where that key was observed. A point read finds the greatest sampled key
//! at or below its target, seeks each locator, and scans forward — entries
//! within a segment are sorted, so the expected scan is bounded by the
//! sampling stride.
//!
//! Rebuilds are always full: after a merge the segment set changed shape and
//! locator segment ids would be stale. A flush, by contrast, only appends a
//! segment, so its locators (sampled with the same cadence while the segment
//! was written) are appended with the running counter intact.

use crate::Error;
use segment::{Segment, SegmentError};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::warn;

/// Location of one sampled entry: which live segment, and the byte offset
/// of the entry's line within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Locator {
    /// Index into the engine's live segment vec.
    pub segment: usize,
    /// Byte offset of the entry within that segment.
    pub offset: u64,
}

/// Counts entries against the sampling stride without touching the index,
/// so a failed flush leaves no trace. On success the flush installs the
/// collected samples together with the advanced counter.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Sampler {
    stride: usize,
    counter: usize,
}

impl Sampler {
    /// Counts one entry; returns `true` when it falls on the stride.
    pub fn observe(&mut self) -> bool {
        self.counter += 1;
        self.counter % self.stride == 0
    }
}

#[derive(Debug)]
pub(crate) struct SparseIndex {
    map: BTreeMap<String, Vec<Locator>>,
    stride: usize,
    /// Global entries-seen counter, continued across flushes.
    counter: usize,
}

impl SparseIndex {
    pub fn new(stride: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            stride,
            counter: 0,
        }
    }

    /// A detached sampler continuing this index's global counter.
    pub fn sampler(&self) -> Sampler {
        Sampler {
            stride: self.stride,
            counter: self.counter,
        }
    }

    /// Installs locators collected by a successful flush and advances the
    /// global counter to the sampler's position.
    pub fn install(&mut self, sampler: Sampler, segment: usize, samples: Vec<(String, u64)>) {
        self.counter = sampler.counter;
        for (key, offset) in samples {
            self.record(key, segment, offset);
        }
    }

    /// Rebuilds the index from scratch over `segments` (in their vec order,
    /// which is filename order), invoking `on_entry` for every decoded key —
    /// the engine uses that hook to replay keys into the bloom filter.
    ///
    /// Corrupt lines are skipped with a warning; completeness is not
    /// critical here because the index is only an accelerator and the read
    /// path falls back to full scans.
    pub fn rebuild(
        &mut self,
        segments: &[Arc<Segment>],
        mut on_entry: impl FnMut(&str),
    ) -> Result<(), Error> {
        let mut map: BTreeMap<String, Vec<Locator>> = BTreeMap::new();
        let mut counter = 0usize;

        for (id, seg) in segments.iter().enumerate() {
            let mut cursor = seg
                .cursor()
                .map_err(|e| Error::from_segment(e, seg.path()))?;
            loop {
                let offset = cursor.position();
                match cursor.read_entry() {
                    Ok(Some(entry)) => {
                        on_entry(&entry.key);
                        counter += 1;
                        if counter % self.stride == 0 {
                            let locators = map.entry(entry.key).or_default();
                            locators.push(Locator {
                                segment: id,
                                offset,
                            });
                            locators.sort_by(|a, b| b.offset.cmp(&a.offset));
                        }
                    }
                    Ok(None) => break,
                    Err(SegmentError::Corrupt { detail }) => {
                        warn!(path = %seg.path().display(), %detail, "skipping corrupt line during index rebuild");
                    }
                    Err(e) => return Err(Error::from_segment(e, seg.path())),
                }
            }
        }

        self.map = map;
        self.counter = counter;
        Ok(())
    }

    /// The greatest sampled key at or below `key`, with its locators in
    /// descending offset order (newest physical write first). `None` when
    /// no sampled key precedes the target.
    pub fn candidates(&self, key: &str) -> Option<(&str, &[Locator])> {
        self.map
            .range::<str, _>((std::ops::Bound::Unbounded, std::ops::Bound::Included(key)))
            .next_back()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    /// Number of sampled keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Drops all locators and resets the counter (used when the segment set
    /// is discarded on close).
    pub fn clear(&mut self) {
        self.map.clear();
        self.counter = 0;
    }

    fn record(&mut self, key: String, segment: usize, offset: u64) {
        let locators = self.map.entry(key).or_default();
        locators.push(Locator { segment, offset });
        locators.sort_by(|a, b| b.offset.cmp(&a.offset));
    }
}
