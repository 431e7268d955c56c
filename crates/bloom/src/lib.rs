//! # Bloom Filter
//!
//! A space-efficient probabilistic set used as the admission filter for the
//! read path: a negative answer is authoritative ("definitely not stored")
//! and short-circuits the lookup before any disk I/O, while a positive
//! answer only means "maybe" and sends the caller down the slow path.
//!
//! The filter is sized from an expected item count and a target false
//! positive rate using the standard formulas `m = ceil(-n ln p / (ln 2)^2)`
//! and `k = ceil(m/n * ln 2)`. Each of the `k` probes hashes the key with
//! MurmurHash3 (32-bit) under a distinct seed.
//!
//! ## Persistence
//!
//! The filter serializes to a small `key = value` text file so the engine
//! can skip rebuilding it from segment data on restart. A missing or
//! malformed file is never fatal — callers fall back to a rebuild.
//!
//! ## Example
//!
//! ```rust
//! use bloom::BloomFilter;
//!
//! let mut bf = BloomFilter::new(1000, 0.01);
//! bf.add("hello");
//! assert!(bf.might_contain("hello"));
//! ```

use std::io::{self, Read, Write};
use std::path::Path;

/// Base for deterministic probe-seed derivation.
const SEED_BASE: u32 = 0x7f4a_7c15;
/// Stride between consecutive probe seeds (32-bit golden ratio).
const SEED_STRIDE: u32 = 0x9e37_79b9;

/// Safety cap on the bit array when deserializing (128 MiB).
const MAX_BIT_BYTES: usize = 128 * 1024 * 1024;

/// A bloom filter backed by a bit vector with `k` seeded hash probes.
///
/// Monotonic: keys are only ever added. False positives are possible,
/// false negatives are not.
pub struct BloomFilter {
    /// The bit vector storing the filter state.
    bits: Vec<u8>,
    /// Number of bits in the filter (m).
    num_bits: u64,
    /// One seed per hash function (k seeds).
    seeds: Vec<u32>,
    /// Sizing inputs, retained for persistence.
    expected_items: usize,
    false_positive_rate: f64,
}

impl BloomFilter {
    /// Creates a filter sized for `expected_items` at the given target
    /// `false_positive_rate`.
    ///
    /// # Panics
    ///
    /// Panics if `expected_items` is 0 or `false_positive_rate` is not in
    /// `(0, 1)`. These are configuration errors, validated again at the
    /// engine's config boundary.
    #[must_use]
    pub fn new(expected_items: usize, false_positive_rate: f64) -> Self {
        assert!(expected_items > 0, "expected_items must be > 0");
        assert!(
            false_positive_rate > 0.0 && false_positive_rate < 1.0,
            "false_positive_rate must be in (0, 1)"
        );

        // m = ceil(-n * ln(p) / (ln 2)^2)
        let n = expected_items as f64;
        let m = (-n * false_positive_rate.ln() / std::f64::consts::LN_2.powi(2)).ceil() as u64;
        let m = m.max(8);

        // k = ceil(m/n * ln 2)
        let k = ((m as f64 / n) * std::f64::consts::LN_2).ceil() as u32;
        let k = k.max(1);

        let byte_len = ((m + 7) / 8) as usize;

        Self {
            bits: vec![0u8; byte_len],
            num_bits: m,
            seeds: derive_seeds(k),
            expected_items,
            false_positive_rate,
        }
    }

    /// Adds a key to the set.
    pub fn add(&mut self, key: &str) {
        let data = key.as_bytes();
        for i in 0..self.seeds.len() {
            let idx = u64::from(murmur3_32(data, self.seeds[i])) % self.num_bits;
            self.set_bit(idx);
        }
    }

    /// Returns `true` if the key **might** be in the set, `false` if it is
    /// **definitely not**.
    #[must_use]
    pub fn might_contain(&self, key: &str) -> bool {
        let data = key.as_bytes();
        for &seed in &self.seeds {
            let idx = u64::from(murmur3_32(data, seed)) % self.num_bits;
            if !self.get_bit(idx) {
                return false;
            }
        }
        true
    }

    /// Number of bits in the filter.
    #[must_use]
    pub fn num_bits(&self) -> u64 {
        self.num_bits
    }

    /// Number of hash functions.
    #[must_use]
    pub fn num_hashes(&self) -> u32 {
        self.seeds.len() as u32
    }

    // ---- Persistence ----

    /// Serializes the filter state as a `key = value` text record.
    ///
    /// ```text
    /// expected_items = 1000
    /// false_positive_rate = 0.01
    /// num_bits = 9586
    /// num_hashes = 7
    /// seeds = 2135587861,4792745726,...
    /// bits = 00a3f0...
    /// ```
    ///
    /// The bit vector is hex-encoded. Lines starting with `#` are comments.
    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        writeln!(w, "# bloom filter state")?;
        writeln!(w, "expected_items = {}", self.expected_items)?;
        writeln!(w, "false_positive_rate = {}", self.false_positive_rate)?;
        writeln!(w, "num_bits = {}", self.num_bits)?;
        writeln!(w, "num_hashes = {}", self.seeds.len())?;
        let seeds: Vec<String> = self.seeds.iter().map(u32::to_string).collect();
        writeln!(w, "seeds = {}", seeds.join(","))?;
        let mut hex = String::with_capacity(self.bits.len() * 2);
        for b in &self.bits {
            hex.push_str(&format!("{:02x}", b));
        }
        writeln!(w, "bits = {}", hex)?;
        Ok(())
    }

    /// Deserializes a filter from the text record written by [`write_to`].
    ///
    /// Rejects records with missing fields, a seed count that does not match
    /// `num_hashes`, or a bit vector whose length is inconsistent with
    /// `num_bits`.
    ///
    /// [`write_to`]: BloomFilter::write_to
    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut text = String::new();
        r.read_to_string(&mut text)?;

        let mut expected_items: Option<usize> = None;
        let mut false_positive_rate: Option<f64> = None;
        let mut num_bits: Option<u64> = None;
        let mut num_hashes: Option<u32> = None;
        let mut seeds: Option<Vec<u32>> = None;
        let mut bits: Option<Vec<u8>> = None;

        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (field, value) = line
                .split_once('=')
                .ok_or_else(|| invalid(format!("malformed line: {}", line)))?;
            let (field, value) = (field.trim(), value.trim());

            match field {
                "expected_items" => {
                    expected_items = Some(parse_field(field, value)?);
                }
                "false_positive_rate" => {
                    false_positive_rate = Some(parse_field(field, value)?);
                }
                "num_bits" => {
                    num_bits = Some(parse_field(field, value)?);
                }
                "num_hashes" => {
                    num_hashes = Some(parse_field(field, value)?);
                }
                "seeds" => {
                    let parsed: Result<Vec<u32>, _> =
                        value.split(',').map(|s| s.trim().parse()).collect();
                    seeds = Some(parsed.map_err(|_| invalid("unparsable seed list"))?);
                }
                "bits" => {
                    bits = Some(decode_hex(value)?);
                }
                other => return Err(invalid(format!("unknown field: {}", other))),
            }
        }

        let expected_items = expected_items.ok_or_else(|| missing("expected_items"))?;
        let false_positive_rate =
            false_positive_rate.ok_or_else(|| missing("false_positive_rate"))?;
        let num_bits = num_bits.ok_or_else(|| missing("num_bits"))?;
        let num_hashes = num_hashes.ok_or_else(|| missing("num_hashes"))?;
        let seeds = seeds.ok_or_else(|| missing("seeds"))?;
        let bits = bits.ok_or_else(|| missing("bits"))?;

        if expected_items == 0 || !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(invalid("sizing parameters out of range"));
        }
        if num_bits == 0 {
            return Err(invalid("num_bits must be > 0"));
        }
        if seeds.len() != num_hashes as usize {
            return Err(invalid(format!(
                "seed count {} does not match num_hashes {}",
                seeds.len(),
                num_hashes
            )));
        }
        let expected_bytes = ((num_bits + 7) / 8) as usize;
        if bits.len() != expected_bytes {
            return Err(invalid(format!(
                "bit vector is {} bytes, num_bits {} requires {}",
                bits.len(),
                num_bits,
                expected_bytes
            )));
        }
        if bits.len() > MAX_BIT_BYTES {
            return Err(invalid("bit vector exceeds safety cap"));
        }

        Ok(Self {
            bits,
            num_bits,
            seeds,
            expected_items,
            false_positive_rate,
        })
    }

    /// Persists the filter to `path` atomically (write temp file, then
    /// rename into place).
    pub fn write_to_path<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let path = path.as_ref();
        let tmp = path.with_extension("tmp");
        {
            let mut f = std::fs::File::create(&tmp)?;
            self.write_to(&mut f)?;
            f.flush()?;
            f.sync_all()?;
        }
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Loads a filter previously written with [`write_to_path`].
    ///
    /// [`write_to_path`]: BloomFilter::write_to_path
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut f = std::fs::File::open(path)?;
        Self::read_from(&mut f)
    }

    // ---- Internal helpers ----

    fn set_bit(&mut self, idx: u64) {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        self.bits[byte_idx] |= 1 << bit_offset;
    }

    fn get_bit(&self, idx: u64) -> bool {
        let byte_idx = (idx / 8) as usize;
        let bit_offset = (idx % 8) as u8;
        (self.bits[byte_idx] >> bit_offset) & 1 == 1
    }
}

impl std::fmt::Debug for BloomFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BloomFilter")
            .field("num_bits", &self.num_bits)
            .field("num_hashes", &self.seeds.len())
            .field("bytes", &self.bits.len())
            .finish()
    }
}

/// Derives `k` probe seeds deterministically so two engine instances agree
/// on the probe positions without exchanging state.
fn derive_seeds(k: u32) -> Vec<u32> {
    (0..k)
        .map(|i| SEED_BASE.wrapping_add(i.wrapping_mul(SEED_STRIDE)))
        .collect()
}

fn parse_field<T: std::str::FromStr>(field: &str, value: &str) -> io::Result<T> {
    value
        .parse()
        .map_err(|_| invalid(format!("unparsable {}: {}", field, value)))
}

fn decode_hex(s: &str) -> io::Result<Vec<u8>> {
    if s.len() % 2 != 0 {
        return Err(invalid("odd-length hex bit vector"));
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16).map_err(|_| invalid("non-hex byte in bit vector"))
        })
        .collect()
}

fn invalid<E: Into<Box<dyn std::error::Error + Send + Sync>>>(msg: E) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}

fn missing(field: &str) -> io::Error {
    invalid(format!("missing field: {}", field))
}

/// MurmurHash3, x86 32-bit variant, over `data` with the given `seed`.
#[must_use]
pub fn murmur3_32(data: &[u8], seed: u32) -> u32 {
    const C1: u32 = 0xcc9e_2d51;
    const C2: u32 = 0x1b87_3593;

    let mut h = seed;
    let mut chunks = data.chunks_exact(4);

    for chunk in chunks.by_ref() {
        let mut k = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
        h = h.rotate_left(13);
        h = h.wrapping_mul(5).wrapping_add(0xe654_6b64);
    }

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut k = 0u32;
        for (i, &b) in tail.iter().enumerate() {
            k ^= u32::from(b) << (8 * i);
        }
        k = k.wrapping_mul(C1);
        k = k.rotate_left(15);
        k = k.wrapping_mul(C2);
        h ^= k;
    }

    // fmix32 finalizer
    h ^= data.len() as u32;
    h ^= h >> 16;
    h = h.wrapping_mul(0x85eb_ca6b);
    h ^= h >> 13;
    h = h.wrapping_mul(0xc2b2_ae35);
    h ^= h >> 16;
    h
}
