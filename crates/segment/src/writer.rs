use crate::format::{encode_entry, Entry};
use crate::SegmentError;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Append-only segment writer.
///
/// Entries are written to a temp file next to the target and atomically
/// renamed into place by [`finish`](SegmentWriter::finish), so readers never
/// observe a half-written segment and an interrupted write leaves only a
/// `.tmp` file behind. Dropping an unfinished writer deletes the temp file.
///
/// Appends are checked against the sorted-keys invariant: a key smaller than
/// the previously appended key is an [`SegmentError::UnsortedEntries`] fault
/// and the segment must be aborted.
pub struct SegmentWriter {
    path: PathBuf,
    tmp_path: PathBuf,
    file: BufWriter<File>,
    position: u64,
    last_key: Option<String>,
    entries: usize,
    finished: bool,
}

impl SegmentWriter {
    /// Starts a new segment at `path` (the temp file is `<path>.tmp`).
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = tmp_path_for(&path);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            path,
            tmp_path,
            file: BufWriter::new(file),
            position: 0,
            last_key: None,
            entries: 0,
            finished: false,
        })
    }

    /// Appends one entry, returning the byte offset it was written at.
    ///
    /// The offset is relative to the start of the file and remains valid
    /// after the rename in [`finish`](SegmentWriter::finish) — callers use
    /// it to record sparse-index locators while flushing.
    pub fn add(&mut self, entry: &Entry) -> Result<u64, SegmentError> {
        if let Some(previous) = &self.last_key {
            if entry.key < *previous {
                return Err(SegmentError::UnsortedEntries {
                    previous: previous.clone(),
                    key: entry.key.clone(),
                });
            }
        }

        let offset = self.position;
        let mut line = encode_entry(entry);
        line.push('\n');
        self.file.write_all(line.as_bytes())?;

        self.position += line.len() as u64;
        self.entries += 1;
        self.last_key = Some(entry.key.clone());
        Ok(offset)
    }

    /// Current write position in bytes.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Number of entries appended so far.
    #[must_use]
    pub fn entry_count(&self) -> usize {
        self.entries
    }

    /// The final path the segment will occupy once finished.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flushes buffered writes, fsyncs, and renames the temp file into
    /// place. After this returns the segment is durable and visible.
    pub fn finish(mut self) -> Result<(), SegmentError> {
        self.file.flush()?;
        self.file.get_ref().sync_all()?;
        std::fs::rename(&self.tmp_path, &self.path)?;
        self.finished = true;
        Ok(())
    }

    /// Discards the segment: closes and deletes the temp file.
    ///
    /// Used on cancellation and on write errors, so no partial output
    /// survives.
    pub fn abort(mut self) {
        self.finished = true;
        let _ = self.file.flush();
        let _ = std::fs::remove_file(&self.tmp_path);
    }
}

impl Drop for SegmentWriter {
    fn drop(&mut self) {
        if !self.finished {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

/// `<name>.txt` -> `<name>.txt.tmp`
fn tmp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}
