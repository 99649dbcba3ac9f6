//! A small family of independent 64-bit mixing hashes, shared by the
//! frequency-ordered minimizer table and the Bloom filter.
//!
//! Hand-rolled rather than pulled from a hashing crate, in keeping with this
//! crate's preference for small bit-level routines over new dependencies
//! (mirrors the CRC32 implementation in `storage.rs`).

/// [SplitMix64](https://prng.di.unimi.it/splitmix64.c) finalizer, used as a
/// cheap, well-distributed, seedable 64-bit mix.
#[inline]
#[must_use]
pub fn splitmix64(seed: u64, x: u64) -> u64 {
    let mut z = x.wrapping_add(seed).wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_input_is_deterministic() {
        assert_eq!(splitmix64(1, 42), splitmix64(1, 42));
    }

    #[test]
    fn different_seeds_diverge() {
        assert_ne!(splitmix64(1, 42), splitmix64(2, 42));
    }
}
