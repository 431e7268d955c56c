//! # Segment — immutable, key-sorted on-disk runs
//!
//! When the in-memory [`memtable`] fills up the engine flushes it to disk as
//! a segment. Segments are *write-once, read-many* — once created they are
//! never modified, only superseded by a merge.
//!
//! ## File layout
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ 1700000000.000000.txt                                   │
//! │                                                         │
//! │ {"apple":"red"}\n                                       │
//! │ {"banana":"yellow"}\n                                   │
//! │ {"cherry":"b4c63beb-5632-4b4b-94a4-7f0a4a36e4b1"}\n     │
//! │ ...                                                     │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! One entry per line: a single-entry JSON object, UTF-8, terminated by
//! `\n`, in ascending byte-wise key order. JSON escaping lets arbitrary
//! key/value content (embedded quotes, non-ASCII) round-trip; the only
//! restriction is that values must not contain a line terminator. The third
//! line above stores a tombstone — the engine's deletion sentinel is an
//! ordinary value at this layer.
//!
//! The filename is the segment's creation timestamp, `<seconds>.<fraction>`,
//! which orders segments on disk and breaks ties during a merge (later
//! timestamp wins). See [`SegmentStamp`].
//!
//! | Module      | Purpose                                              |
//! |-------------|------------------------------------------------------|
//! | [`format`]  | entry line codec, filename/timestamp parsing          |
//! | `writer`    | append-only, sort-checked segment creation            |
//! | `reader`    | immutable segment handle + scoped read cursors        |
//! | `merge`     | k-way merge with most-recent-wins dedup               |
//!
//! [`memtable`]: ../memtable/index.html

pub mod format;
mod merge;
mod reader;
mod writer;

pub use format::{Entry, SegmentStamp};
pub use merge::MergeIterator;
pub use reader::{Segment, SegmentCursor};
pub use writer::SegmentWriter;

use thiserror::Error;

/// Errors produced by segment I/O and decoding.
#[derive(Debug, Error)]
pub enum SegmentError {
    /// An underlying filesystem error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An append violated the sorted-keys precondition. Fatal for the
    /// segment being written — the writer must be aborted.
    #[error("unsorted entries: {key:?} appended after {previous:?}")]
    UnsortedEntries {
        /// The key most recently appended.
        previous: String,
        /// The out-of-order key that was rejected.
        key: String,
    },

    /// A line failed to parse as a single-entry JSON dictionary.
    #[error("corrupt segment line: {detail}")]
    Corrupt {
        /// What was wrong, including the offending line.
        detail: String,
    },
}

#[cfg(test)]
mod tests;
