//! Minimizers and the partition-id function `part` (spec §3, §4.2).
//!
//! `part(kmer) = repart[minimizer(canonical(kmer))]`. Because the minimizer
//! is always computed on the canonical form, `part(x) == part(revcomp(x))`
//! holds for every k-mer `x` (spec §4.2 invariant, verified in
//! `tests/invariants.rs`).

use crate::hashutil::splitmix64;
use crate::kmer::Kmer;

/// The `-minimizer-type` choice (spec §6: `0`=lexicographic, `1`=frequency).
/// A caller-facing selector; building the actual [`RepartTable`] from
/// `Frequency` additionally needs a k-mer sample, which is why this is a
/// plain nullary enum rather than carrying the rank table itself — compare
/// [`MinimizerOrder`], which does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MinimizerOrderKind {
    #[default]
    Lexicographic,
    Frequency,
}

/// How candidate minimizer m-mers are ordered when picking the minimum
/// across a k-mer's `k - m + 1` positions.
#[derive(Debug, Clone)]
pub enum MinimizerOrder {
    /// Order by the m-mer's packed integer value; m-mers containing the
    /// two-base pattern `AA` are ranked last (spec §3 "Minimizer").
    Lexicographic,
    /// Order by a precomputed frequency rank: less frequent m-mers sort
    /// first, so that the table assigns common m-mers round-robin across
    /// partitions (spec §4.2).
    Frequency { rank: Vec<u32> },
}

/// `repart`: a lookup table of `4^m` entries mapping every possible m-mer to
/// a partition id in `[0, N)`.
#[derive(Debug, Clone)]
pub struct RepartTable {
    pub minimizer_size: usize,
    pub partition_count: u32,
    pub order: MinimizerOrder,
    repart: Vec<u32>,
}

#[inline]
fn mmer_mask(m: usize) -> u128 {
    (1u128 << (2 * m)) - 1
}

/// True if any two adjacent bases within the m-mer form `AA` (`00 00`).
fn contains_aa(mmer: u128, m: usize) -> bool {
    for i in 0..m.saturating_sub(1) {
        let pair = (mmer >> (2 * i)) & 0b1111;
        if pair == 0b0000 {
            return true;
        }
    }
    false
}

impl RepartTable {
    /// Identity-modulo-N scheme (spec §3, scheme i).
    #[must_use]
    pub fn build_lexicographic(minimizer_size: usize, partition_count: u32) -> Self {
        let table_size = 4usize.pow(minimizer_size as u32);
        let repart = (0..table_size as u32).map(|v| v % partition_count).collect();
        Self {
            minimizer_size,
            partition_count,
            order: MinimizerOrder::Lexicographic,
            repart,
        }
    }

    /// Frequency-derived scheme (spec §3 scheme ii, §4.2): samples up to
    /// `10^6` k-mers, tallies m-mer frequency across all `k - m + 1`
    /// positions of each, and assigns partitions round-robin over the
    /// frequency-sorted m-mer list. Deterministic given the same sample and
    /// seed.
    #[must_use]
    pub fn build_frequency(
        minimizer_size: usize,
        partition_count: u32,
        kmer_size: usize,
        sample: impl Iterator<Item = Kmer>,
        seed: u64,
    ) -> Self {
        let m = minimizer_size;
        let table_size = 4usize.pow(m as u32);
        let mask = mmer_mask(m);
        let mut freq = vec![0u64; table_size];

        for kmer in sample.take(1_000_000) {
            let packed = kmer.packed();
            for pos in 0..=(kmer_size - m) {
                let shift = 2 * (kmer_size - m - pos);
                let mmer = ((packed >> shift) & mask) as usize;
                freq[mmer] += 1;
            }
        }

        let mut order_by_freq: Vec<u32> = (0..table_size as u32).collect();
        order_by_freq.sort_by(|&a, &b| {
            freq[a as usize]
                .cmp(&freq[b as usize])
                .then_with(|| splitmix64(seed, u64::from(a)).cmp(&splitmix64(seed, u64::from(b))))
        });

        let mut repart = vec![0u32; table_size];
        let mut rank = vec![0u32; table_size];
        for (i, &mmer) in order_by_freq.iter().enumerate() {
            repart[mmer as usize] = (i as u32) % partition_count;
            rank[mmer as usize] = i as u32;
        }

        Self {
            minimizer_size,
            partition_count,
            order: MinimizerOrder::Frequency { rank },
            repart,
        }
    }

    fn order_key(&self, mmer: u32) -> u64 {
        match &self.order {
            MinimizerOrder::Lexicographic => {
                if contains_aa(u128::from(mmer), self.minimizer_size) {
                    u64::from(u32::MAX) + 1 + u64::from(mmer)
                } else {
                    u64::from(mmer)
                }
            }
            MinimizerOrder::Frequency { rank } => u64::from(rank[mmer as usize]),
        }
    }

    /// The minimizer m-mer (as a packed value in `[0, 4^m)`) of a canonical
    /// k-mer: the m-mer of minimum order among its `k - m + 1` positions.
    #[must_use]
    pub fn minimizer_of(&self, kmer: &Kmer) -> u32 {
        let m = self.minimizer_size;
        let k = kmer.k();
        let mask = mmer_mask(m);
        let packed = kmer.packed();

        let mut best_mmer = 0u32;
        let mut best_key = u64::MAX;
        for pos in 0..=(k - m) {
            let shift = 2 * (k - m - pos);
            let mmer = ((packed >> shift) & mask) as u32;
            let key = self.order_key(mmer);
            if key < best_key {
                best_key = key;
                best_mmer = mmer;
            }
        }
        best_mmer
    }

    /// `part(kmer) = repart[minimizer(canonical(kmer))]`.
    #[must_use]
    pub fn part(&self, kmer: &Kmer) -> u32 {
        let canonical = kmer.canonical();
        let mmer = self.minimizer_of(&canonical);
        self.repart[mmer as usize]
    }

    #[must_use]
    pub fn table_len(&self) -> usize {
        self.repart.len()
    }

    /// Serialises the table for the `/minimizers/repart` artifact (spec
    /// §6), as raw little-endian `u32`s — no header needed here since the
    /// enclosing storage collection already carries a CRC32 trailer.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.repart.len() * 4);
        for &v in &self.repart {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[must_use]
    pub fn from_bytes_lexicographic(minimizer_size: usize, bytes: &[u8]) -> Self {
        Self::from_bytes(minimizer_size, bytes, MinimizerOrder::Lexicographic)
    }

    /// Reconstructs a table from its persisted `repart` array plus the
    /// minimizer order it was originally built with (spec §6 "Graph
    /// artifact layout" — `order` itself must come from the persisted
    /// `minimizer_type` property and, for `Frequency`, the `/minimizers/rank`
    /// collection, since neither is recoverable from `repart` alone).
    #[must_use]
    pub fn from_bytes(minimizer_size: usize, bytes: &[u8], order: MinimizerOrder) -> Self {
        let repart: Vec<u32> = bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect();
        let partition_count = repart.iter().copied().max().map_or(1, |m| m + 1);
        Self {
            minimizer_size,
            partition_count,
            order,
            repart,
        }
    }

    /// The `/minimizers/rank` artifact: the frequency rank of every m-mer,
    /// needed to reconstruct `order_key` after reload. `None` under
    /// `Lexicographic`, whose order needs no persisted state.
    #[must_use]
    pub fn rank_bytes(&self) -> Option<Vec<u8>> {
        match &self.order {
            MinimizerOrder::Lexicographic => None,
            MinimizerOrder::Frequency { rank } => {
                let mut out = Vec::with_capacity(rank.len() * 4);
                for &v in rank {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                Some(out)
            }
        }
    }

    #[must_use]
    pub fn rank_from_bytes(bytes: &[u8]) -> Vec<u32> {
        bytes
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
            .collect()
    }
}
