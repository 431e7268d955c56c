use crate::format::{decode_entry, Entry, SegmentStamp};
use crate::SegmentError;
use std::fs::File;
use std::io::{BufRead, BufReader, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// An immutable, key-sorted segment file.
///
/// `Segment` itself holds only metadata (path, timestamp, byte length); all
/// reading goes through scoped [`SegmentCursor`]s. Each cursor owns its own
/// file handle, acquired when the operation starts and released when the
/// cursor is dropped — so concurrent readers never contend on a shared
/// handle, and a handle is guaranteed to stay live for the entire iteration
/// that reads from it.
#[derive(Debug)]
pub struct Segment {
    path: PathBuf,
    stamp: SegmentStamp,
    len: u64,
}

impl Segment {
    /// Opens a segment file, extracting the creation timestamp from the
    /// filename. A name without a timestamp suffix yields stamp 0.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SegmentError> {
        let path = path.as_ref().to_path_buf();
        let len = std::fs::metadata(&path)?.len();
        let stamp = SegmentStamp::from_path(&path);
        Ok(Self { path, stamp, len })
    }

    /// Acquires a fresh read cursor positioned at offset 0.
    pub fn cursor(&self) -> Result<SegmentCursor, SegmentError> {
        let file = File::open(&self.path)?;
        Ok(SegmentCursor {
            reader: BufReader::new(file),
            position: 0,
            len: self.len,
            line: String::new(),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The creation timestamp parsed from the filename.
    #[must_use]
    pub fn stamp(&self) -> &SegmentStamp {
        &self.stamp
    }

    /// File length in bytes at open time.
    #[must_use]
    pub fn len_bytes(&self) -> u64 {
        self.len
    }
}

/// A scoped sequential reader over one segment.
///
/// Obtained from [`Segment::cursor`]; supports positional seeks so the
/// sparse index can jump straight to a sampled entry and scan forward.
pub struct SegmentCursor {
    reader: BufReader<File>,
    position: u64,
    len: u64,
    /// Reusable line buffer.
    line: String,
}

impl SegmentCursor {
    /// Reads the next entry, or `None` at end of file.
    ///
    /// Blank lines are skipped; a line that fails to decode surfaces as
    /// [`SegmentError::Corrupt`] with the cursor already advanced past it,
    /// so callers may either skip it (index rebuild) or abort (merge).
    pub fn read_entry(&mut self) -> Result<Option<Entry>, SegmentError> {
        loop {
            if self.eof() {
                return Ok(None);
            }

            self.line.clear();
            let read = self.reader.read_line(&mut self.line)?;
            if read == 0 {
                self.position = self.len;
                return Ok(None);
            }
            self.position += read as u64;

            let line = self.line.trim_end_matches(['\n', '\r']);
            if line.is_empty() {
                continue;
            }
            return decode_entry(line).map(Some);
        }
    }

    /// Repositions the cursor; the next [`read_entry`] resumes there.
    ///
    /// [`read_entry`]: SegmentCursor::read_entry
    pub fn seek(&mut self, offset: u64) -> Result<(), SegmentError> {
        self.reader.seek(SeekFrom::Start(offset))?;
        self.position = offset;
        Ok(())
    }

    /// Current byte offset of the cursor.
    #[must_use]
    pub fn position(&self) -> u64 {
        self.position
    }

    /// `true` once the cursor has no more bytes to read.
    #[must_use]
    pub fn eof(&self) -> bool {
        self.position >= self.len
    }
}
