//! K-way merge over segment files.
//!
//! Produces entries in ascending key order. When the same key appears in
//! multiple segments, only the entry from the segment with the **largest
//! timestamp** is emitted — most recent wins, matching overwrite semantics.
//! Tombstone entries flow through like any other value; the read path is
//! responsible for treating them as "absent".
//!
//! This is the core primitive for compaction: walk N input segments in
//! sorted order, deduplicate by recency, and stream the result into new
//! segment files.

use crate::format::{Entry, SegmentStamp};
use crate::reader::{Segment, SegmentCursor};
use crate::SegmentError;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

/// A pending entry from one input segment, ordered for the merge heap.
struct HeapEntry {
    entry: Entry,
    stamp: SegmentStamp,
    /// Index into the `sources` array.
    source: usize,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // BinaryHeap is a max-heap; reverse the key comparison so the
        // smallest key pops first. For equal keys the larger stamp pops
        // first, which makes the first occurrence of a key the most recent
        // one. Source index breaks exact ties deterministically.
        other
            .entry
            .key
            .cmp(&self.entry.key)
            .then_with(|| self.stamp.cmp(&other.stamp))
            .then_with(|| other.source.cmp(&self.source))
    }
}

/// One input segment: its open cursor and its timestamp.
struct MergeSource {
    cursor: SegmentCursor,
    stamp: SegmentStamp,
}

/// Merges N segments into a single sorted, deduplicated entry stream.
///
/// Cursors are opened eagerly and owned by the iterator, so every input
/// handle stays live until the merge is complete. The stream is lazy: one
/// entry per input is buffered in the heap at any time.
pub struct MergeIterator {
    sources: Vec<MergeSource>,
    heap: BinaryHeap<HeapEntry>,
    last_key: Option<String>,
}

impl MergeIterator {
    /// Opens a cursor on each input segment and primes the heap with the
    /// first entry of each.
    ///
    /// A corrupt first entry aborts construction — merge correctness
    /// depends on seeing every input entry.
    pub fn new(segments: &[Arc<Segment>]) -> Result<Self, SegmentError> {
        let mut sources = Vec::with_capacity(segments.len());
        let mut heap = BinaryHeap::with_capacity(segments.len());

        for (i, segment) in segments.iter().enumerate() {
            let mut cursor = segment.cursor()?;
            let stamp = segment.stamp().clone();
            if let Some(entry) = cursor.read_entry()? {
                heap.push(HeapEntry {
                    entry,
                    stamp: stamp.clone(),
                    source: i,
                });
            }
            sources.push(MergeSource { cursor, stamp });
        }

        Ok(Self {
            sources,
            heap,
            last_key: None,
        })
    }

    /// Returns the next merged entry in ascending key order, or `None` when
    /// all inputs are exhausted.
    ///
    /// Older duplicates of an already-emitted key are discarded. Any
    /// corrupt line aborts the merge with an error.
    pub fn next_entry(&mut self) -> Result<Option<Entry>, SegmentError> {
        loop {
            let top = match self.heap.pop() {
                Some(e) => e,
                None => return Ok(None),
            };

            // Refill the heap from the source the popped entry came from.
            let source = &mut self.sources[top.source];
            if let Some(next) = source.cursor.read_entry()? {
                self.heap.push(HeapEntry {
                    entry: next,
                    stamp: source.stamp.clone(),
                    source: top.source,
                });
            }

            // Equal keys pop most-recent-first, so any repeat of the last
            // emitted key is an older duplicate.
            if self.last_key.as_deref() == Some(top.entry.key.as_str()) {
                continue;
            }

            self.last_key = Some(top.entry.key.clone());
            return Ok(Some(top.entry));
        }
    }

    /// Collects all remaining entries into a `Vec`. Test convenience.
    pub fn collect_all(&mut self) -> Result<Vec<Entry>, SegmentError> {
        let mut result = Vec::new();
        while let Some(entry) = self.next_entry()? {
            result.push(entry);
        }
        Ok(result)
    }
}
