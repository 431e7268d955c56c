use super::helpers::{count_segment_files, segment_file_names, small_config};
use crate::{Engine, EngineConfig, Error, TOMBSTONE};
use anyhow::Result;
use tempfile::tempdir;

// --------------------- Basic put / get / delete ---------------------

#[test]
fn basic_put_get_delete() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.insert("k1", "v1")?;
    engine.insert("k2", "v2")?;
    engine.insert("k3", "v3")?;

    assert_eq!(engine.get("k1")?.as_deref(), Some("v1"));

    engine.delete("k2")?;
    assert_eq!(engine.get("k2")?, None);
    assert_eq!(engine.get("k3")?.as_deref(), Some("v3"));
    Ok(())
}

#[test]
fn overwrite_wins() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.insert("k", "v1")?;
    engine.insert("k", "v2")?;
    assert_eq!(engine.get("k")?.as_deref(), Some("v2"));

    // Overwrite across a flush boundary: the memtable copy is newer.
    engine.flush()?;
    engine.insert("k", "v3")?;
    assert_eq!(engine.get("k")?.as_deref(), Some("v3"));
    Ok(())
}

// --------------------- Validation ---------------------

#[test]
fn empty_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    assert!(matches!(engine.insert("", "v"), Err(Error::Validation(_))));
    assert!(matches!(engine.delete(""), Err(Error::Validation(_))));
    assert!(matches!(engine.get(""), Err(Error::Validation(_))));
    Ok(())
}

#[test]
fn whitespace_only_key_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    assert!(matches!(engine.insert("   ", "v"), Err(Error::Validation(_))));
    assert!(matches!(engine.insert("\t\n", "v"), Err(Error::Validation(_))));
    Ok(())
}

#[test]
fn sentinel_value_is_rejected() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    assert!(matches!(
        engine.insert("k", TOMBSTONE),
        Err(Error::Validation(_))
    ));
    Ok(())
}

#[test]
fn rejected_insert_has_no_side_effects() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    let _ = engine.insert("", "v");
    assert_eq!(engine.memtable_len(), 0);
    assert!(!engine.might_contain(""));
    Ok(())
}

#[test]
fn invalid_config_is_rejected() {
    let dir = tempdir().unwrap();

    let bad = EngineConfig {
        merge_threshold: 1,
        base_path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    assert!(matches!(Engine::open(bad), Err(Error::Validation(_))));

    let bad = EngineConfig {
        bloom_false_positive_rate: 1.5,
        base_path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    assert!(matches!(Engine::open(bad), Err(Error::Validation(_))));
}

// --------------------- Flush at capacity ---------------------

#[test]
fn memtable_flushes_at_capacity() -> Result<()> {
    let dir = tempdir()?;
    let config = EngineConfig {
        max_in_memory_size: 10,
        base_path: dir.path().to_path_buf(),
        ..EngineConfig::default()
    };
    let engine = Engine::open(config)?;

    for i in 1..=20 {
        engine.insert(&format!("key{}", i), &format!("value{}", i))?;
    }

    // The 11th insert flushed the first ten entries and cleared the buffer.
    assert_eq!(engine.segment_count(), 1);
    assert_eq!(engine.memtable_len(), 10);

    // Flushed data stays readable.
    assert_eq!(engine.get("key5")?.as_deref(), Some("value5"));
    assert_eq!(engine.get("key15")?.as_deref(), Some("value15"));
    Ok(())
}

#[test]
fn manual_flush_writes_a_segment_and_clears_the_memtable() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.insert("a", "1")?;
    engine.insert("b", "2")?;
    engine.flush()?;

    assert_eq!(engine.memtable_len(), 0);
    assert_eq!(count_segment_files(dir.path()), 1);
    assert_eq!(engine.get("a")?.as_deref(), Some("1"));
    Ok(())
}

#[test]
fn flushing_an_empty_memtable_is_a_noop() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.flush()?;
    assert_eq!(count_segment_files(dir.path()), 0);
    Ok(())
}

// --------------------- On-disk invariants ---------------------

#[test]
fn segment_files_are_sorted_and_unique() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    // Insert out of order; the flush must emit sorted lines.
    for key in ["mango", "apple", "zebra", "cherry", "banana"] {
        engine.insert(key, "v")?;
    }
    engine.flush()?;

    for name in segment_file_names(dir.path()) {
        let contents = std::fs::read_to_string(dir.path().join(name))?;
        let keys: Vec<String> = contents
            .lines()
            .map(|l| segment::format::decode_entry(l).unwrap().key)
            .collect();
        let mut sorted = keys.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(keys, sorted, "segment entries must be sorted and unique");
    }
    Ok(())
}

#[test]
fn flush_stamps_are_monotonic() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    for round in 0..3 {
        engine.insert(&format!("k{}", round), "v")?;
        engine.flush()?;
    }

    let names = segment_file_names(dir.path());
    assert_eq!(names.len(), 3);
    let stamps: Vec<_> = names
        .iter()
        .map(|n| segment::SegmentStamp::from_file_name(n).unwrap())
        .collect();
    assert!(stamps.windows(2).all(|w| w[0] < w[1]));
    Ok(())
}

// --------------------- Tombstones ---------------------

#[test]
fn delete_of_never_inserted_key_is_recorded() -> Result<()> {
    let dir = tempdir()?;
    let engine = Engine::open(small_config(dir.path()))?;

    engine.delete("ghost")?;
    assert_eq!(engine.get("ghost")?, None);
    assert_eq!(engine.memtable_len(), 1, "tombstone occupies a slot");
    Ok(())
}
