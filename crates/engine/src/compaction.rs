//! Compaction: k-way merge of the whole segment set.
//!
//! Uses [`MergeIterator`] for sorted, most-recent-wins streaming from all
//! live segments. Output is size-bounded: after `segment_size` entries the
//! current output is finished and a new one opens under a fresh stamp, so
//! the result may be several files. Tombstones are carried through
//! unchanged; the merge performs no garbage collection.
//!
//! Failure discipline: any error or cancellation deletes every output file
//! written so far and leaves the inputs, the sparse index, and the bloom
//! filter untouched. Only after all outputs are durable are the input files
//! deleted, the live set swapped, and the sparse index rebuilt.

use crate::{CancelToken, Engine, EngineState, Error};
use segment::{MergeIterator, Segment, SegmentWriter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

impl Engine {
    /// Merges all live segments into a bounded set of fresh ones.
    ///
    /// A no-op when fewer than two segments exist. Runs automatically when
    /// a flush pushes the segment count to `merge_threshold`; callable
    /// manually at any time.
    pub fn compact(&self) -> Result<(), Error> {
        self.compact_with(&CancelToken::new())
    }

    /// [`compact`](Engine::compact) with a cancellation token polled per
    /// merged entry.
    pub fn compact_with(&self, token: &CancelToken) -> Result<(), Error> {
        let mut state = self.write_state()?;
        self.merge_state(&mut state, token)
    }

    pub(crate) fn merge_state(
        &self,
        state: &mut EngineState,
        token: &CancelToken,
    ) -> Result<(), Error> {
        if state.segments.len() <= 1 {
            return Ok(());
        }

        let inputs = state.segments.clone();
        let mut output_paths: Vec<PathBuf> = Vec::new();

        if let Err(e) = self.run_merge(&inputs, &mut output_paths, token) {
            for path in &output_paths {
                let _ = std::fs::remove_file(path);
            }
            return Err(e);
        }

        // Outputs are durable; open them before touching the old set so an
        // open failure leaves the engine on the inputs.
        let mut merged: Vec<Arc<Segment>> = Vec::with_capacity(output_paths.len());
        for path in &output_paths {
            match Segment::open(path) {
                Ok(seg) => merged.push(Arc::new(seg)),
                Err(e) => {
                    for path in &output_paths {
                        let _ = std::fs::remove_file(path);
                    }
                    return Err(Error::from_segment(e, path));
                }
            }
        }

        for input in &inputs {
            let _ = std::fs::remove_file(input.path());
        }

        let input_count = inputs.len();
        state.segments = merged;
        state.sparse.rebuild(&state.segments, |_| {})?;

        info!(
            inputs = input_count,
            outputs = state.segments.len(),
            "merged segment set"
        );
        Ok(())
    }

    /// Streams the merge into size-bounded output segments, recording each
    /// output path as soon as its writer is created so the caller can clean
    /// up on failure. An in-progress writer cleans its own temp file when
    /// dropped or aborted.
    fn run_merge(
        &self,
        inputs: &[Arc<Segment>],
        output_paths: &mut Vec<PathBuf>,
        token: &CancelToken,
    ) -> Result<(), Error> {
        let mut merge = MergeIterator::new(inputs)?;
        let mut writer: Option<SegmentWriter> = None;

        loop {
            let entry = match merge.next_entry() {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                // Merge correctness depends on completeness: abort.
                Err(e) => {
                    if let Some(w) = writer.take() {
                        w.abort();
                    }
                    return Err(e.into());
                }
            };

            if token.is_cancelled() {
                if let Some(w) = writer.take() {
                    w.abort();
                }
                return Err(Error::Cancelled);
            }

            let start_new = match &writer {
                None => true,
                Some(w) => w.entry_count() >= self.config.segment_size,
            };
            if start_new {
                if let Some(w) = writer.take() {
                    w.finish().map_err(Error::from)?;
                }
                let path = self
                    .config
                    .base_path
                    .join(self.next_stamp().file_name());
                output_paths.push(path.clone());
                writer =
                    Some(SegmentWriter::create(&path).map_err(|e| Error::from_segment(e, &path))?);
            }

            if let Some(w) = writer.as_mut() {
                w.add(&entry)?;
            }
        }

        if let Some(w) = writer.take() {
            w.finish()?;
        }
        Ok(())
    }
}
