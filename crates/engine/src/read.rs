//! Read path: staged point lookup.
//!
//! 1. Bloom filter — a negative answer is authoritative and costs no I/O.
//! 2. Memtable — freshest data; a tombstone here hides everything older.
//! 3. Sparse index — seek to the greatest sampled key at or below the
//!    target and scan forward within each candidate segment. Entries are
//!    sorted, so the scan stops at the first key greater than the target.
//! 4. Full scan of every segment from offset 0, newest stamp first.
//!
//! A candidate that does not produce the key never ends the lookup early:
//! the path continues through the remaining locators and then the full
//! scan before concluding "absent".

use crate::{CancelToken, Engine, Error};
use memtable::TOMBSTONE;
use segment::Segment;
use std::sync::atomic::Ordering;

/// What scanning a single segment for a key concluded.
enum ScanOutcome {
    /// The key was found with this stored value (possibly the tombstone).
    Found(String),
    /// The key is not in this segment (or not after the given offset).
    NotHere,
}

impl Engine {
    /// Looks up `key`, returning `None` when it is absent or deleted.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for an empty key; I/O or corruption errors
    /// from segment scans.
    pub fn get(&self, key: &str) -> Result<Option<String>, Error> {
        self.get_with(key, &CancelToken::new())
    }

    /// [`get`](Engine::get) with a cancellation token polled between
    /// segment reads.
    pub fn get_with(&self, key: &str, token: &CancelToken) -> Result<Option<String>, Error> {
        if key.is_empty() {
            return Err(Error::Validation("key must not be empty".into()));
        }

        let state = self.read_state()?;

        // 1. Bloom: a miss is authoritative.
        if !state.bloom.might_contain(key) {
            return Ok(None);
        }

        // 2. Memtable, tombstones included.
        if let Some(value) = state.mem.get(key) {
            return Ok(live(value));
        }

        // 3. Sparse index candidates, descending offset order.
        if let Some((_, locators)) = state.sparse.candidates(key) {
            for locator in locators {
                if token.is_cancelled() {
                    return Err(Error::Cancelled);
                }
                let segment = &state.segments[locator.segment];
                if let ScanOutcome::Found(value) =
                    self.scan_segment(segment, locator.offset, key, token)?
                {
                    return Ok(live(&value));
                }
            }
        }

        // 4. Full scan, newest segment first.
        let mut by_recency: Vec<&std::sync::Arc<Segment>> = state.segments.iter().collect();
        by_recency.sort_by(|a, b| b.stamp().cmp(a.stamp()));

        for segment in by_recency {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            if let ScanOutcome::Found(value) = self.scan_segment(segment, 0, key, token)? {
                return Ok(live(&value));
            }
        }

        Ok(None)
    }

    /// Scans `segment` forward from `offset` until `key`, a greater key, or
    /// EOF. Uses a scoped cursor so the file handle is released when the
    /// scan ends, and counts one segment read for test observability.
    fn scan_segment(
        &self,
        segment: &Segment,
        offset: u64,
        key: &str,
        token: &CancelToken,
    ) -> Result<ScanOutcome, Error> {
        self.segment_reads.fetch_add(1, Ordering::Relaxed);

        let mut cursor = segment
            .cursor()
            .map_err(|e| Error::from_segment(e, segment.path()))?;
        if offset > 0 {
            cursor
                .seek(offset)
                .map_err(|e| Error::from_segment(e, segment.path()))?;
        }

        loop {
            if token.is_cancelled() {
                return Err(Error::Cancelled);
            }
            match cursor.read_entry() {
                Ok(Some(entry)) => {
                    if entry.key == key {
                        return Ok(ScanOutcome::Found(entry.value));
                    }
                    if entry.key.as_str() > key {
                        return Ok(ScanOutcome::NotHere);
                    }
                }
                Ok(None) => return Ok(ScanOutcome::NotHere),
                // A corrupt line aborts the read: the point lookup cannot
                // prove absence without the full line stream.
                Err(e) => return Err(Error::from_segment(e, segment.path())),
            }
        }
    }
}

/// Maps the stored value to the observable one: the tombstone reads as
/// "absent".
fn live(value: &str) -> Option<String> {
    if value == TOMBSTONE {
        None
    } else {
        Some(value.to_string())
    }
}
