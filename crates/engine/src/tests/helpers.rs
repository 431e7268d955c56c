use crate::EngineConfig;
use std::fs;
use std::path::Path;

/// A config with a tiny memtable so flushes and merges happen early.
pub fn small_config(dir: &Path) -> EngineConfig {
    EngineConfig {
        max_in_memory_size: 5,
        base_path: dir.to_path_buf(),
        bloom_expected_items: 1000,
        ..EngineConfig::default()
    }
}

pub fn count_segment_files(dir: &Path) -> usize {
    segment_file_names(dir).len()
}

pub fn segment_file_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .filter_map(|e| e.file_name().to_str().map(str::to_string))
        .filter(|n| segment::format::is_segment_file_name(n))
        .collect();
    names.sort();
    names
}
