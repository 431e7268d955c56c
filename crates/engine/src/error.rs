use segment::SegmentError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by engine operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Caller-supplied input was rejected. No side effects occurred.
    #[error("validation error: {0}")]
    Validation(String),

    /// The sorted-keys invariant was violated while writing a segment.
    /// Fatal for that segment; the partial output has been discarded.
    #[error("unsorted entries: {key:?} appended after {previous:?}")]
    UnsortedEntries { previous: String, key: String },

    /// A filesystem failure. Engine state is as of the last completed
    /// operation.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// A segment line failed to parse where completeness matters (merge,
    /// point reads). Index rebuilds skip such lines instead.
    #[error("corrupt segment {path:?}: {detail}")]
    CorruptSegment { path: PathBuf, detail: String },

    /// The operation observed its cancellation token.
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    pub(crate) fn lock_poisoned() -> Self {
        Error::Io(io::Error::new(
            io::ErrorKind::Other,
            "engine lock poisoned by a panicked writer",
        ))
    }

    /// Attaches the segment path to a raw [`SegmentError`].
    pub(crate) fn from_segment(err: SegmentError, path: &std::path::Path) -> Self {
        match err {
            SegmentError::Io(e) => Error::Io(e),
            SegmentError::UnsortedEntries { previous, key } => {
                Error::UnsortedEntries { previous, key }
            }
            SegmentError::Corrupt { detail } => Error::CorruptSegment {
                path: path.to_path_buf(),
                detail,
            },
        }
    }
}

impl From<SegmentError> for Error {
    fn from(err: SegmentError) -> Self {
        match err {
            SegmentError::Io(e) => Error::Io(e),
            SegmentError::UnsortedEntries { previous, key } => {
                Error::UnsortedEntries { previous, key }
            }
            SegmentError::Corrupt { detail } => Error::CorruptSegment {
                path: PathBuf::new(),
                detail,
            },
        }
    }
}
