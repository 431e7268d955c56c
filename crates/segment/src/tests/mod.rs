
use crate::{Entry, Segment, SegmentWriter};
use std::path::Path;
use std::sync::Arc;

/// Helper: write a sorted segment file and open it.
pub fn write_and_open(
    dir: &Path,
    name: &str,
    entries: &[(&str, &str)],
) -> anyhow::Result<Arc<Segment>> {
    let path = dir.join(name);
    let mut w = SegmentWriter::create(&path)?;
    for &(key, value) in entries {
        w.add(&Entry::new(key, value))?;
    }
    w.finish()?;
    Ok(Arc::new(Segment::open(&path)?))
}
