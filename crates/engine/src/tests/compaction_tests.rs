use super::helpers::{count_segment_files, segment_file_names, small_config};
use crate::{Engine, EngineConfig, TOMBSTONE};
use anyhow::Result;
use std::collections::BTreeMap;
use tempfile::tempdir;

/// Fills the memtable with `count` throwaway keys under `prefix`.
fn fill(engine: &Engine, prefix: &str, count: usize) -> Result<()> {
    for i in 0..count {
        engine.insert(&format!("{}{}", prefix, i), "filler")?;
    }
    Ok(())
}

// --------------------- Merge & recency ---------------------

#[test]
fn merge_keeps_the_most_recent_value() -> Result<()> {
    let dir = tempdir()?;
    let config = EngineConfig {
        max_in_memory_size: 5,
        merge_threshold: 100, // manual compaction only
        base_path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Engine::open(config)?;

    // Three generations of "k" across three flushed segments.
    engine.insert("k", "A")?;
    fill(&engine, "a", 4)?;
    engine.flush()?;
    engine.insert("k", "B")?;
    fill(&engine, "b", 4)?;
    engine.flush()?;
    engine.insert("k", "C")?;
    fill(&engine, "c", 4)?;
    engine.flush()?;

    assert_eq!(engine.segment_count(), 3);
    assert_eq!(engine.get("k")?.as_deref(), Some("C"));

    let before = segment_file_names(dir.path());
    engine.compact()?;

    // One bounded segment replaces the three inputs, none of which survive.
    assert_eq!(engine.segment_count(), 1);
    let after = segment_file_names(dir.path());
    assert_eq!(after.len(), 1);
    assert!(before.iter().all(|old| !after.contains(old)));

    assert_eq!(engine.get("k")?.as_deref(), Some("C"));
    Ok(())
}

#[test]
fn merge_triggers_automatically_at_threshold() -> Result<()> {
    let dir = tempdir()?;
    let config = EngineConfig {
        max_in_memory_size: 2,
        merge_threshold: 3,
        base_path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Engine::open(config)?;

    // Each third insert flushes two entries; the flush that creates the
    // third segment immediately merges the set down to one.
    for i in 0..9 {
        engine.insert(&format!("key{}", i), "v")?;
    }

    assert!(engine.segment_count() < 3);
    for i in 0..7 {
        assert_eq!(engine.get(&format!("key{}", i))?.as_deref(), Some("v"));
    }
    Ok(())
}

#[test]
fn merge_preserves_observable_state() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    for i in 0..20 {
        engine.insert(&format!("key{:02}", i), &format!("v{}", i))?;
    }
    for i in (0..20).step_by(3) {
        engine.delete(&format!("key{:02}", i))?;
    }
    engine.insert("key05", "rewritten")?;
    engine.flush()?;

    let mut before = BTreeMap::new();
    for i in 0..20 {
        let key = format!("key{:02}", i);
        before.insert(key.clone(), engine.get(&key)?);
    }

    engine.compact()?;

    for (key, expected) in &before {
        assert_eq!(&engine.get(key)?, expected, "key {}", key);
    }
    Ok(())
}

// --------------------- Tombstones across merge ---------------------

#[test]
fn delete_stays_observable_across_merge() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.insert("k", "x")?;
    engine.flush()?;
    engine.delete("k")?;
    engine.flush()?;

    assert_eq!(engine.get("k")?, None);

    engine.compact()?;
    assert_eq!(engine.get("k")?, None);
    Ok(())
}

#[test]
fn merge_retains_tombstones_in_the_output() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.insert("dead", "soon")?;
    engine.insert("alive", "yes")?;
    engine.flush()?;
    engine.delete("dead")?;
    engine.flush()?;
    engine.compact()?;

    // Not garbage-collected: the sentinel is still written out.
    let names = segment_file_names(dir.path());
    assert_eq!(names.len(), 1);
    let contents = std::fs::read_to_string(dir.path().join(&names[0]))?;
    assert!(contents.contains(TOMBSTONE));
    assert!(contents.contains("alive"));
    Ok(())
}

// --------------------- Output bounding ---------------------

#[test]
fn merge_output_is_bounded_by_segment_size() -> Result<()> {
    let dir = tempdir()?;
    let config = EngineConfig {
        max_in_memory_size: 5,
        segment_size: 3,
        merge_threshold: 100,
        base_path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Engine::open(config)?;

    // Two segments, ten distinct keys.
    for i in 0..5 {
        engine.insert(&format!("key{:02}", i), "v")?;
    }
    engine.flush()?;
    for i in 5..10 {
        engine.insert(&format!("key{:02}", i), "v")?;
    }
    engine.flush()?;

    engine.compact()?;

    // ceil(10 / 3) = 4 output files, each holding at most 3 entries, and
    // the concatenation in filename order is fully sorted.
    let names = segment_file_names(dir.path());
    assert_eq!(names.len(), 4);

    let mut all_keys = Vec::new();
    for name in &names {
        let contents = std::fs::read_to_string(dir.path().join(name))?;
        let keys: Vec<String> = contents
            .lines()
            .map(|l| segment::format::decode_entry(l).unwrap().key)
            .collect();
        assert!(keys.len() <= 3, "{} holds {} entries", name, keys.len());
        all_keys.extend(keys);
    }
    let mut sorted = all_keys.clone();
    sorted.sort();
    assert_eq!(all_keys, sorted);
    assert_eq!(all_keys.len(), 10);

    for i in 0..10 {
        assert_eq!(engine.get(&format!("key{:02}", i))?.as_deref(), Some("v"));
    }
    Ok(())
}

// --------------------- Degenerate inputs ---------------------

#[test]
fn compact_with_one_segment_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.insert("k", "v")?;
    engine.flush()?;
    let before = segment_file_names(dir.path());

    engine.compact()?;
    assert_eq!(segment_file_names(dir.path()), before);
    Ok(())
}

#[test]
fn compact_of_empty_segments_yields_zero_outputs() -> Result<()> {
    let dir = tempdir()?;
    // Empty segment files are legal; fabricate two on disk.
    std::fs::create_dir_all(dir.path())?;
    std::fs::write(dir.path().join("1.0.txt"), "")?;
    std::fs::write(dir.path().join("2.0.txt"), "")?;

    let engine = Engine::open(small_config(dir.path()))?;
    assert_eq!(engine.segment_count(), 2);

    engine.compact()?;
    assert_eq!(engine.segment_count(), 0);
    assert_eq!(count_segment_files(dir.path()), 0);
    Ok(())
}
