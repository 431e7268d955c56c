//! # Memtable — in-memory write buffer
//!
//! Every write lands here first. The buffer keeps entries sorted by key so
//! that a flush can stream them straight into a segment file without an extra
//! sort pass. Deletions are stored as [`TOMBSTONE`] values — they occupy a
//! slot like any other entry and shadow older on-disk values until a merge
//! carries the tombstone forward.
//!
//! Capacity is advisory: [`Memtable::capacity_reached`] reports when the
//! configured entry cap is hit, but it is the engine's job to trigger the
//! flush and clear the buffer.

use std::collections::BTreeMap;

/// Sentinel value marking a deleted key.
///
/// A fixed UUID literal, so that any engine instance opening a data directory
/// written by another process agrees on which value means "deleted". User
/// values equal to the sentinel are rejected at the engine's API boundary,
/// keeping the sentinel outside the user value space.
pub const TOMBSTONE: &str = "b4c63beb-5632-4b4b-94a4-7f0a4a36e4b1";

/// In-memory, key-sorted write buffer with an advisory entry cap.
///
/// Ordering is byte-wise comparison of the UTF-8 keys (`Ord for String`) —
/// the same invariant every segment file on disk obeys. Iteration yields
/// entries in ascending key order, tombstones included.
#[derive(Debug)]
pub struct Memtable {
    map: BTreeMap<String, String>,
    max_entries: usize,
}

impl Memtable {
    /// Creates an empty memtable that reports capacity at `max_entries`.
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            map: BTreeMap::new(),
            max_entries,
        }
    }

    /// Records `key -> value`, overwriting any prior value.
    ///
    /// Accepts [`TOMBSTONE`] as a value; the memtable itself does not treat
    /// it specially.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// Returns the stored value for `key`, which may be [`TOMBSTONE`].
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }

    /// Returns `true` if `key` is present, including when it maps to
    /// [`TOMBSTONE`].
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.map.contains_key(key)
    }

    /// Returns `true` once the entry count has reached the configured cap.
    #[must_use]
    pub fn capacity_reached(&self) -> bool {
        self.map.len() >= self.max_entries
    }

    /// Empties the buffer, keeping the configured cap.
    pub fn clear(&mut self) {
        self.map.clear();
    }

    /// Number of entries currently buffered (tombstones count).
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no entries are buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Ordered iterator over `(key, value)` pairs, ascending by key.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.map.iter()
    }
}
