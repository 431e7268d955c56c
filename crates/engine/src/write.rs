//! Write path: `insert()`, `delete()`, `flush()`, and the internal flush.
//!
//! All mutations take the write half of the engine lock, so they are
//! totally ordered. An insert that finds the memtable at capacity first
//! flushes it to a new segment, then merges if the segment count has
//! reached the threshold, and only then applies the new write — the
//! memtable is never over capacity by more than the entry being applied.

use crate::{CancelToken, Engine, EngineState, Error};
use memtable::TOMBSTONE;
use segment::{Entry, Segment, SegmentWriter};
use std::sync::Arc;
use tracing::{debug, info};

impl Engine {
    /// Inserts or overwrites `key -> value`.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] if the key is empty or whitespace-only, or the
    /// value equals the deletion sentinel; I/O errors if the write triggered
    /// a flush or merge that failed (the memtable keeps its contents, so a
    /// retry is permitted).
    pub fn insert(&self, key: &str, value: &str) -> Result<(), Error> {
        self.insert_with(key, value, &CancelToken::new())
    }

    /// [`insert`](Engine::insert) with a cancellation token polled during
    /// any flush or merge the insert triggers.
    pub fn insert_with(&self, key: &str, value: &str, token: &CancelToken) -> Result<(), Error> {
        validate_key(key)?;
        if value == TOMBSTONE {
            return Err(Error::Validation(
                "value collides with the deletion sentinel".into(),
            ));
        }
        self.apply(key, value, token)
    }

    /// Deletes `key` by recording a tombstone.
    ///
    /// The tombstone shadows any older value in the segment hierarchy and
    /// survives merges, so the key stays observably absent.
    pub fn delete(&self, key: &str) -> Result<(), Error> {
        self.delete_with(key, &CancelToken::new())
    }

    /// [`delete`](Engine::delete) with a cancellation token.
    pub fn delete_with(&self, key: &str, token: &CancelToken) -> Result<(), Error> {
        validate_key(key)?;
        self.apply(key, TOMBSTONE, token)
    }

    /// Forces a flush of the current memtable to a new segment.
    ///
    /// A no-op when the memtable is empty. Does not trigger a merge.
    pub fn flush(&self) -> Result<(), Error> {
        self.flush_with(&CancelToken::new())
    }

    /// [`flush`](Engine::flush) with a cancellation token. A cancelled
    /// flush deletes its partial output and leaves the memtable populated.
    pub fn flush_with(&self, token: &CancelToken) -> Result<(), Error> {
        let mut state = self.write_state()?;
        self.flush_state(&mut state, token)
    }

    fn apply(&self, key: &str, value: &str, token: &CancelToken) -> Result<(), Error> {
        let mut state = self.write_state()?;

        if state.mem.capacity_reached() {
            self.flush_state(&mut state, token)?;
            if state.segments.len() >= self.config.merge_threshold {
                self.merge_state(&mut state, token)?;
            }
        }

        state.mem.insert(key.to_string(), value.to_string());
        state.bloom.add(key);
        Ok(())
    }

    /// Streams the memtable into a freshly stamped segment file, sampling
    /// sparse-index locators with the running global cadence as it goes.
    ///
    /// On success the memtable is cleared and the segment joins the live
    /// set. On any error (or cancellation) the partial file is deleted and
    /// neither the memtable, the sparse index, nor the segment list change.
    pub(crate) fn flush_state(
        &self,
        state: &mut EngineState,
        token: &CancelToken,
    ) -> Result<(), Error> {
        if state.mem.is_empty() {
            return Ok(());
        }

        let stamp = self.next_stamp();
        let path = self.config.base_path.join(stamp.file_name());
        let mut writer =
            SegmentWriter::create(&path).map_err(|e| Error::from_segment(e, &path))?;

        let mut sampler = state.sparse.sampler();
        let mut samples: Vec<(String, u64)> = Vec::new();

        for (key, value) in state.mem.iter() {
            if token.is_cancelled() {
                writer.abort();
                return Err(Error::Cancelled);
            }
            let offset = writer
                .add(&Entry::new(key.clone(), value.clone()))
                .map_err(|e| Error::from_segment(e, &path))?;
            if sampler.observe() {
                samples.push((key.clone(), offset));
            }
        }

        let entries = writer.entry_count();
        writer.finish().map_err(|e| Error::from_segment(e, &path))?;

        let segment = Arc::new(Segment::open(&path).map_err(|e| Error::from_segment(e, &path))?);
        let segment_id = state.segments.len();
        state.segments.push(segment);
        state.sparse.install(sampler, segment_id, samples);
        state.mem.clear();

        info!(
            path = %path.display(),
            entries,
            segment_count = state.segments.len(),
            "flushed memtable to segment"
        );
        Ok(())
    }

    /// Flushes the memtable, persists the bloom filter, and releases the
    /// segment set. With `persist_segments = false` the segment files are
    /// deleted instead of kept.
    ///
    /// Safe to call more than once; [`Drop`] calls it best-effort.
    pub fn close(&self) -> Result<(), Error> {
        self.close_with(&CancelToken::new())
    }

    /// [`close`](Engine::close) with a cancellation token applied to the
    /// final flush.
    pub fn close_with(&self, token: &CancelToken) -> Result<(), Error> {
        let mut state = self.write_state()?;
        self.flush_state(&mut state, token)?;

        let bloom_path = self.config.base_path.join(crate::BLOOM_FILE_NAME);
        if self.config.persist_segments {
            // Advisory only: a failed bloom write just means a rebuild on
            // the next open.
            if let Err(e) = state.bloom.write_to_path(&bloom_path) {
                debug!(%e, "failed to persist bloom filter on close");
            }
        } else {
            for seg in &state.segments {
                let _ = std::fs::remove_file(seg.path());
            }
            let _ = std::fs::remove_file(&bloom_path);
            state.segments.clear();
            state.sparse.clear();
        }
        Ok(())
    }
}

fn validate_key(key: &str) -> Result<(), Error> {
    if key.trim().is_empty() {
        return Err(Error::Validation(
            "key must not be empty or whitespace-only".into(),
        ));
    }
    Ok(())
}
