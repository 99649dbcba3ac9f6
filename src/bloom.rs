//! C7 — Bloom Builder: a lock-free, concurrently-insertable Bloom filter
//! sized from a target false-positive rate, with an optional cache-coherent
//! (blocked) layout (spec §4.7).

use std::sync::atomic::{AtomicU64, Ordering};

use crate::hashutil::splitmix64;

const WORD_BITS: u64 = 64;
/// One cache line's worth of bits; in cache-coherent mode every probe for a
/// key stays within a single block of this size (spec §4.7 "Cache-coherent
/// layout").
const BLOCK_BITS: u64 = 512;

fn optimal_bits(expected_items: u64, target_fp_rate: f64) -> u64 {
    if expected_items == 0 {
        return WORD_BITS;
    }
    let n = expected_items as f64;
    let p = target_fp_rate.clamp(1e-6, 0.5);
    let bits = -(n * p.ln()) / std::f64::consts::LN_2.powi(2);
    (bits.ceil() as u64).max(WORD_BITS)
}

fn optimal_hash_count(bits_per_key: f64) -> u32 {
    ((bits_per_key * std::f64::consts::LN_2).round() as u32).clamp(1, 16)
}

/// A Bloom filter over 2-bit-packed canonical k-mers, backed by atomics so
/// every worker thread can insert into the same filter without locking
/// (spec §5 "Shared-resource policy" — the Bloom bit array is the one
/// structure every worker writes concurrently).
pub struct BloomFilter {
    words: Vec<AtomicU64>,
    len_bits: u64,
    hashes: u32,
    cache_coherent: bool,
}

impl BloomFilter {
    /// Sizes a plain (non-blocked) filter for `expected_items` insertions at
    /// `target_fp_rate` (spec §4.7 step 1).
    #[must_use]
    pub fn sized_for(expected_items: u64, target_fp_rate: f64) -> Self {
        Self::new(expected_items, target_fp_rate, false)
    }

    /// Sizes a cache-coherent filter: rounds the bit length up to a whole
    /// number of `BLOCK_BITS`-sized blocks so every key's probes land in one
    /// block (spec §4.7 "Cache-coherent layout").
    #[must_use]
    pub fn sized_for_cache_coherent(expected_items: u64, target_fp_rate: f64) -> Self {
        Self::new(expected_items, target_fp_rate, true)
    }

    fn new(expected_items: u64, target_fp_rate: f64, cache_coherent: bool) -> Self {
        let mut len_bits = optimal_bits(expected_items, target_fp_rate);
        if cache_coherent {
            len_bits = len_bits.div_ceil(BLOCK_BITS) * BLOCK_BITS;
        }
        let bits_per_key = if expected_items == 0 {
            len_bits as f64
        } else {
            len_bits as f64 / expected_items as f64
        };
        let hashes = optimal_hash_count(bits_per_key);
        let word_count = len_bits.div_ceil(WORD_BITS) as usize;
        Self {
            words: (0..word_count).map(|_| AtomicU64::new(0)).collect(),
            len_bits,
            hashes,
            cache_coherent,
        }
    }

    #[must_use]
    pub fn len_bits(&self) -> u64 {
        self.len_bits
    }

    #[must_use]
    pub fn hash_count(&self) -> u32 {
        self.hashes
    }

    #[must_use]
    pub fn bits_per_key(&self, expected_items: u64) -> f64 {
        if expected_items == 0 {
            0.0
        } else {
            self.len_bits as f64 / expected_items as f64
        }
    }

    fn key_to_u64(key: u128) -> u64 {
        (key as u64) ^ ((key >> 64) as u64)
    }

    /// The `hashes` bit positions probed for `key`. In cache-coherent mode
    /// all of them fall within the same `BLOCK_BITS`-wide block, chosen by
    /// the first hash.
    fn positions(&self, key: u128) -> impl Iterator<Item = u64> + '_ {
        let folded = Self::key_to_u64(key);
        let block_count = self.len_bits / BLOCK_BITS;
        let block_start = if self.cache_coherent && block_count > 0 {
            (splitmix64(0, folded) % block_count) * BLOCK_BITS
        } else {
            0
        };
        let span = if self.cache_coherent { BLOCK_BITS } else { self.len_bits };
        (0..self.hashes).map(move |i| {
            let h = splitmix64(u64::from(i) + 1, folded);
            block_start + (h % span.max(1))
        })
    }

    pub fn insert(&self, key: u128) {
        for pos in self.positions(key).collect::<Vec<_>>() {
            let word = (pos / WORD_BITS) as usize;
            let bit = 1u64 << (pos % WORD_BITS);
            self.words[word].fetch_or(bit, Ordering::Relaxed);
        }
    }

    #[must_use]
    pub fn contains(&self, key: u128) -> bool {
        self.positions(key).collect::<Vec<_>>().into_iter().all(|pos| {
            let word = (pos / WORD_BITS) as usize;
            let bit = 1u64 << (pos % WORD_BITS);
            self.words[word].load(Ordering::Relaxed) & bit != 0
        })
    }

    /// Serialises as `len_bits(u64 LE) | hashes(u32 LE) | cache_coherent(u8) | words...`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(13 + self.words.len() * 8);
        out.extend_from_slice(&self.len_bits.to_le_bytes());
        out.extend_from_slice(&self.hashes.to_le_bytes());
        out.push(u8::from(self.cache_coherent));
        for word in &self.words {
            out.extend_from_slice(&word.load(Ordering::Relaxed).to_le_bytes());
        }
        out
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 13 {
            return None;
        }
        let len_bits = u64::from_le_bytes(bytes[0..8].try_into().ok()?);
        let hashes = u32::from_le_bytes(bytes[8..12].try_into().ok()?);
        let cache_coherent = bytes[12] != 0;
        let body = &bytes[13..];
        if body.len() % 8 != 0 {
            return None;
        }
        let words = body
            .chunks_exact(8)
            .map(|chunk| AtomicU64::new(u64::from_le_bytes(chunk.try_into().unwrap())))
            .collect();
        Some(Self {
            words,
            len_bits,
            hashes,
            cache_coherent,
        })
    }
}
