///! # CLI - SiltKV Interactive Shell
///!
///! A REPL-style command-line interface for the SiltKV storage engine.
///! Reads commands from stdin, executes them against the engine, and prints
///! results to stdout. Designed for both interactive use and scripted
///! testing (pipe commands via stdin).
///!
///! ## Commands
///!
///! ```text
///! SET key value      Insert or update a key-value pair
///! GET key            Look up a key (prints value or "(nil)")
///! DEL key            Delete a key (writes a tombstone)
///! FLUSH              Force flush the memtable to a segment
///! COMPACT            Merge all segments (k-way, most recent wins)
///! STATS              Print engine debug info
///! EXIT / QUIT        Shut down gracefully (flushes the memtable)
///! ```
///!
///! ## Configuration
///!
///! All settings are controlled via environment variables:
///!
///! ```text
///! SILT_BASE_PATH        data directory              (default: "sst_data")
///! SILT_MEMTABLE_CAP     memtable entry cap          (default: 1000)
///! SILT_SPARSE_OFFSET    sparse index stride         (default: 300)
///! SILT_SEGMENT_SIZE     merge output entry cap      (default: 50)
///! SILT_MERGE_THRESHOLD  segment count triggering merge (default: 3)
///! SILT_PERSIST          keep segments on close      (default: "true")
///! RUST_LOG              tracing filter, e.g. "engine=debug"
///! ```
///!
///! ## Example
///!
///! ```text
///! $ cargo run -p cli
///! SiltKV started (base_path=sst_data, segments=0, memtable_cap=1000)
///! > SET name Alice
///! OK
///! > GET name
///! Alice
///! > DEL name
///! OK
///! > GET name
///! (nil)
///! > EXIT
///! bye
///! ```

use anyhow::Result;
use engine::{Engine, EngineConfig};
use std::io::{self, BufRead, Write};
use tracing_subscriber::EnvFilter;

/// Reads a configuration value from the environment, falling back to `default`.
fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn config_from_env() -> EngineConfig {
    let defaults = EngineConfig::default();
    EngineConfig {
        max_in_memory_size: env_or("SILT_MEMTABLE_CAP", "1000")
            .parse()
            .unwrap_or(defaults.max_in_memory_size),
        sparse_offset: env_or("SILT_SPARSE_OFFSET", "300")
            .parse()
            .unwrap_or(defaults.sparse_offset),
        segment_size: env_or("SILT_SEGMENT_SIZE", "50")
            .parse()
            .unwrap_or(defaults.segment_size),
        merge_threshold: env_or("SILT_MERGE_THRESHOLD", "3")
            .parse()
            .unwrap_or(defaults.merge_threshold),
        persist_segments: env_or("SILT_PERSIST", "true")
            .parse()
            .unwrap_or(defaults.persist_segments),
        base_path: env_or("SILT_BASE_PATH", "sst_data").into(),
        ..defaults
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = config_from_env();
    let engine = Engine::open(config)?;

    println!(
        "SiltKV started (base_path={}, segments={}, memtable_cap={})",
        engine.base_path().display(),
        engine.segment_count(),
        engine.config().max_in_memory_size,
    );
    println!("Commands: SET key value | GET key | DEL key");
    println!("          FLUSH | COMPACT | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();

    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(k) = parts.next() {
                        let v: String = parts.collect::<Vec<&str>>().join(" ");
                        if v.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match engine.insert(k, &v) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {}", e),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(k) = parts.next() {
                        match engine.get(k) {
                            Ok(Some(v)) => println!("{}", v),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(k) = parts.next() {
                        match engine.delete(k) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {}", e),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "FLUSH" => match engine.flush() {
                    Ok(()) => println!("OK (segments={})", engine.segment_count()),
                    Err(e) => println!("ERR flush failed: {}", e),
                },
                "COMPACT" => match engine.compact() {
                    Ok(()) => println!("OK (segments={})", engine.segment_count()),
                    Err(e) => println!("ERR compact failed: {}", e),
                },
                "STATS" => {
                    println!("{:?}", engine);
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {}", other);
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}
