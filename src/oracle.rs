//! C9 — Graph Oracle: answers membership and adjacency queries over the
//! implicit De Bruijn graph by combining the Bloom filter with the cFP
//! correction structure (spec §4.9). Never touches the solid set itself —
//! that's only read back for the `dbgh5 histogram`/debugging paths.

use crate::bloom::BloomFilter;
use crate::cfp::{CascadingCfp, SortedCfp};
use crate::kmer::{Kmer, KmerModel};

/// Either representation of the false-positive correction (spec §4.8
/// "Strategy selection"); the oracle only needs to ask "is this candidate a
/// false positive".
pub enum Cfp {
    /// `-debloom none`: no correction layer, every Bloom positive counts.
    None,
    Sorted(SortedCfp),
    Cascading(CascadingCfp),
}

impl Cfp {
    fn is_false_positive(&self, kmer: &Kmer) -> bool {
        match self {
            Self::None => false,
            Self::Sorted(s) => s.contains(kmer),
            Self::Cascading(c) => c.contains(kmer),
        }
    }
}

/// The read-only query surface over a built graph (spec §4.9).
pub struct GraphOracle {
    bloom: BloomFilter,
    cfp: Cfp,
    model: KmerModel,
}

impl GraphOracle {
    #[must_use]
    pub fn new(bloom: BloomFilter, cfp: Cfp, model: KmerModel) -> Self {
        Self { bloom, cfp, model }
    }

    /// `true` iff `kmer` is (as far as the graph knows) solid: present in
    /// the Bloom filter and not flagged as one of its false positives
    /// (spec §4.9 "contains").
    #[must_use]
    pub fn contains(&self, kmer: &Kmer) -> bool {
        let canonical = kmer.canonical();
        self.bloom.contains(canonical.packed()) && !self.cfp.is_false_positive(&canonical)
    }

    /// The (up to 4) De Bruijn successors of `kmer` that are themselves in
    /// the graph (spec §4.9 "neighbours").
    #[must_use]
    pub fn successors(&self, kmer: &Kmer) -> Vec<Kmer> {
        kmer.successors().into_iter().filter(|n| self.contains(n)).collect()
    }

    #[must_use]
    pub fn predecessors(&self, kmer: &Kmer) -> Vec<Kmer> {
        kmer.predecessors().into_iter().filter(|n| self.contains(n)).collect()
    }

    /// `true` if `kmer` has more than one in-graph successor or more than
    /// one in-graph predecessor (spec §4.9 "is_branching").
    #[must_use]
    pub fn is_branching(&self, kmer: &Kmer) -> bool {
        self.successors(kmer).len() > 1 || self.predecessors(kmer).len() > 1
    }

    /// `true` if `kmer` has exactly one in-graph successor and exactly one
    /// in-graph predecessor (a "simple" node on a unitig's interior).
    #[must_use]
    pub fn is_simple(&self, kmer: &Kmer) -> bool {
        self.successors(kmer).len() == 1 && self.predecessors(kmer).len() == 1
    }

    #[must_use]
    pub fn kmer_model(&self) -> &KmerModel {
        &self.model
    }
}
