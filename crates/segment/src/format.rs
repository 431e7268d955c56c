//! Entry line codec and segment filename / timestamp parsing.

use crate::SegmentError;
use std::cmp::Ordering;
use std::path::Path;

/// Filename suffix shared by every segment file.
pub const SEGMENT_SUFFIX: &str = ".txt";

/// A single key-value record.
///
/// Both sides are arbitrary UTF-8 strings; the engine layers key validation
/// and tombstone semantics on top.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub value: String,
}

impl Entry {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Encodes an entry as its on-disk line: a one-entry JSON object, without
/// the trailing newline.
///
/// JSON string escaping guarantees the result is a single line for any key
/// and value that do not themselves contain a raw line terminator.
#[must_use]
pub fn encode_entry(entry: &Entry) -> String {
    let mut map = serde_json::Map::with_capacity(1);
    map.insert(
        entry.key.clone(),
        serde_json::Value::String(entry.value.clone()),
    );
    serde_json::Value::Object(map).to_string()
}

/// Decodes one on-disk line back into an [`Entry`].
///
/// Anything other than a JSON object with exactly one string-valued entry is
/// a [`SegmentError::Corrupt`].
pub fn decode_entry(line: &str) -> Result<Entry, SegmentError> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| {
        SegmentError::Corrupt {
            detail: format!("{} in line {:?}", e, line),
        }
    })?;

    let obj = match value {
        serde_json::Value::Object(obj) => obj,
        _ => {
            return Err(SegmentError::Corrupt {
                detail: format!("not an object: {:?}", line),
            })
        }
    };

    let mut entries = obj.into_iter();
    match (entries.next(), entries.next()) {
        (Some((key, serde_json::Value::String(value))), None) => Ok(Entry { key, value }),
        _ => Err(SegmentError::Corrupt {
            detail: format!("expected exactly one string entry: {:?}", line),
        }),
    }
}

/// A segment's creation timestamp, parsed from its filename.
///
/// The filename pattern is `<seconds>.<fraction>.txt`. The fraction is kept
/// as its original digit string and compared as a decimal fraction, so
/// `5.9` sorts after `5.10` (0.9 > 0.10) and `5.5` equals `5.50`.
/// Engine-generated fractions are fixed-width, which additionally makes
/// plain filename sort agree with timestamp order.
#[derive(Debug, Clone)]
pub struct SegmentStamp {
    pub secs: u64,
    pub frac: String,
}

impl SegmentStamp {
    /// The stamp assigned to files without a parsable timestamp suffix.
    #[must_use]
    pub fn zero() -> Self {
        Self {
            secs: 0,
            frac: String::new(),
        }
    }

    #[must_use]
    pub fn new(secs: u64, frac: impl Into<String>) -> Self {
        Self {
            secs,
            frac: frac.into(),
        }
    }

    /// Parses `<seconds>.<fraction>.txt`; returns `None` when the name does
    /// not match.
    #[must_use]
    pub fn from_file_name(name: &str) -> Option<Self> {
        let stem = name.strip_suffix(SEGMENT_SUFFIX)?;
        let (secs, frac) = stem.split_once('.')?;
        if secs.is_empty() || frac.is_empty() {
            return None;
        }
        if !secs.bytes().all(|b| b.is_ascii_digit()) || !frac.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        // An overlong seconds part disqualifies the name.
        let secs: u64 = secs.parse().ok()?;
        Some(Self {
            secs,
            frac: frac.to_string(),
        })
    }

    /// Extracts the stamp from a path, defaulting to [`SegmentStamp::zero`]
    /// when the filename carries no timestamp suffix.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        path.file_name()
            .and_then(|n| n.to_str())
            .and_then(Self::from_file_name)
            .unwrap_or_else(Self::zero)
    }

    /// The filename this stamp corresponds to.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.{}{}", self.secs, self.frac, SEGMENT_SUFFIX)
    }
}

impl PartialEq for SegmentStamp {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for SegmentStamp {}

impl PartialOrd for SegmentStamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SegmentStamp {
    fn cmp(&self, other: &Self) -> Ordering {
        self.secs
            .cmp(&other.secs)
            .then_with(|| cmp_fraction(&self.frac, &other.frac))
    }
}

/// Compares two digit strings as decimal fractions: right-pad the shorter
/// with zeros, then compare positionally.
fn cmp_fraction(a: &str, b: &str) -> Ordering {
    let len = a.len().max(b.len());
    let digits = |s: &str| {
        s.bytes()
            .chain(std::iter::repeat(b'0'))
            .take(len)
            .collect::<Vec<u8>>()
    };
    digits(a).cmp(&digits(b))
}

/// Returns `true` if `name` matches the segment filename pattern
/// `^\d+\.\d+\.txt$`.
#[must_use]
pub fn is_segment_file_name(name: &str) -> bool {
    SegmentStamp::from_file_name(name).is_some()
}
