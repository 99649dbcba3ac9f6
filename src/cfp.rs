//! C8 — cFP Constructor: builds a losslessly-correct membership structure
//! over the main Bloom filter's false positives, so the graph oracle never
//! reports a spurious edge (spec §4.8).

use std::collections::HashSet;

use crate::bloom::BloomFilter;
use crate::kmer::Kmer;
use crate::minimizer::RepartTable;

/// How candidate neighbours of the solid set are generated and scanned
/// before being probed against the main Bloom filter (spec §9 Open Question
/// "candidate-generation strategy" — resolved in DESIGN.md). `Basic` probes
/// every De Bruijn neighbour of every solid k-mer. `Minimizer` additionally
/// discards a candidate whose minimizer partition differs from its
/// originating k-mer's before probing the Bloom filter — an optimisation
/// available once C3's partitioning is already in hand, at the cost of
/// occasionally skipping a real cross-partition edge (acceptable since the
/// oracle only uses this to *correct* Bloom false positives, not to decide
/// true membership).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfpCandidateScan {
    Basic,
    Minimizer,
}

/// Every canonical neighbour of every solid k-mer that the main Bloom filter
/// says is present (spec §4.8 "Candidate generation"). This is the universe
/// the cFP structure must correctly partition into "really solid" and
/// "Bloom false positive". `repart` is required when `scan` is `Minimizer`.
fn bloom_positive_neighbours(
    bloom: &BloomFilter,
    solid_kmers: &[Kmer],
    scan: CfpCandidateScan,
    repart: Option<&RepartTable>,
) -> HashSet<u128> {
    let mut universe = HashSet::new();
    for kmer in solid_kmers {
        let origin_partition = match scan {
            CfpCandidateScan::Minimizer => repart.map(|r| r.part(&kmer.canonical())),
            CfpCandidateScan::Basic => None,
        };
        for neighbour in kmer.successors().into_iter().chain(kmer.predecessors()) {
            let canonical = neighbour.canonical();
            if let (Some(repart), Some(origin)) = (repart, origin_partition) {
                if repart.part(&canonical) != origin {
                    continue;
                }
            }
            if bloom.contains(canonical.packed()) {
                universe.insert(canonical.packed());
            }
        }
    }
    universe
}

/// An exact sorted list of the main Bloom filter's false positives among
/// the candidate universe (spec §4.8 "Sorted-set strategy").
pub struct SortedCfp {
    values: Vec<u128>,
}

impl SortedCfp {
    #[must_use]
    pub fn build(bloom: &BloomFilter, solid_kmers: &[Kmer], scan: CfpCandidateScan, repart: Option<&RepartTable>) -> Self {
        let solid: HashSet<u128> = solid_kmers.iter().map(|k| k.packed()).collect();
        let mut values: Vec<u128> = bloom_positive_neighbours(bloom, solid_kmers, scan, repart)
            .into_iter()
            .filter(|v| !solid.contains(v))
            .collect();
        values.sort_unstable();
        Self { values }
    }

    #[must_use]
    pub fn contains(&self, kmer: &Kmer) -> bool {
        self.values.binary_search(&kmer.canonical().packed()).is_ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(8 + self.values.len() * 16);
        out.extend_from_slice(&(self.values.len() as u64).to_le_bytes());
        for v in &self.values {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out
    }

    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.len() < 8 {
            return None;
        }
        let count = u64::from_le_bytes(bytes[0..8].try_into().ok()?) as usize;
        let body = &bytes[8..];
        if body.len() != count * 16 {
            return None;
        }
        let values = body.chunks_exact(16).map(|c| u128::from_le_bytes(c.try_into().unwrap())).collect();
        Some(Self { values })
    }
}

const MAX_CASCADE_LEVELS: usize = 3;
const CASCADE_FP_RATE: f64 = 0.01;

/// A cascading Bloom filter (spec §4.8 "Cascading strategy"): level `i`
/// represents the false-positive set of level `i - 1`, so a query walks the
/// cascade flipping its provisional answer each time a level says yes, and
/// stops — with a correct answer — the first time a level says no.
/// Never produces a false negative; shrinks memory relative to a flat
/// exact set for skewed false-positive distributions at the cost of the
/// small exact `tail` kept for whatever the cascade couldn't resolve within
/// `MAX_CASCADE_LEVELS` rounds.
pub struct CascadingCfp {
    levels: Vec<BloomFilter>,
    tail: Vec<u128>,
}

impl CascadingCfp {
    #[must_use]
    pub fn build(bloom: &BloomFilter, solid_kmers: &[Kmer], scan: CfpCandidateScan, repart: Option<&RepartTable>) -> Self {
        let solid: HashSet<u128> = solid_kmers.iter().map(|k| k.packed()).collect();
        let universe = bloom_positive_neighbours(bloom, solid_kmers, scan, repart);
        let mut target: Vec<u128> = universe.iter().filter(|v| !solid.contains(v)).copied().collect();
        target.sort_unstable();

        let mut levels = Vec::new();
        for _ in 0..MAX_CASCADE_LEVELS {
            if target.is_empty() {
                break;
            }
            let level = BloomFilter::sized_for(target.len() as u64, CASCADE_FP_RATE);
            for &v in &target {
                level.insert(v);
            }
            let mut next: Vec<u128> = universe
                .iter()
                .filter(|v| target.binary_search(v).is_err() && level.contains(**v))
                .copied()
                .collect();
            next.sort_unstable();
            levels.push(level);
            target = next;
        }

        Self { levels, tail: target }
    }

    #[must_use]
    pub fn contains(&self, kmer: &Kmer) -> bool {
        let value = kmer.canonical().packed();
        let mut believed_member = false;
        for level in &self.levels {
            if level.contains(value) {
                believed_member = !believed_member;
            } else {
                return believed_member;
            }
        }
        self.tail.binary_search(&value).is_ok()
    }

    #[must_use]
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    #[must_use]
    pub fn tail_len(&self) -> usize {
        self.tail.len()
    }
}

/// The choice between the two representations (spec §4.8 "Strategy
/// selection"): sorted-set is simpler and fast for a small false-positive
/// count, cascading trades lookup depth for a smaller footprint when the
/// false-positive set is large.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CfpStrategy {
    SortedSet,
    Cascading,
}

#[must_use]
pub fn choose_strategy(false_positive_count: u64) -> CfpStrategy {
    const SORTED_SET_CEILING: u64 = 1_000_000;
    if false_positive_count <= SORTED_SET_CEILING {
        CfpStrategy::SortedSet
    } else {
        CfpStrategy::Cascading
    }
}

/// The `-debloom` choice (spec §6: `none|original|cascading`, default
/// `cascading`) — unlike [`choose_strategy`]'s automatic heuristic, this is
/// picked by the caller (or `dbgh5`'s CLI default) and pins the pipeline to
/// exactly one representation, including disabling correction entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebloomKind {
    /// No cFP correction: the oracle reports the raw Bloom filter's answer,
    /// false positives and all.
    None,
    /// The exact sorted-set representation (what upstream calls the
    /// "original", pre-cascading debloom).
    Original,
    Cascading,
}

impl Default for DebloomKind {
    fn default() -> Self {
        Self::Cascading
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kmer(bases: &str) -> Kmer {
        Kmer::from_bases(bases.as_bytes(), bases.len()).unwrap()
    }

    /// An undersized Bloom filter so it reliably produces false positives
    /// for this test's small solid set.
    fn lossy_bloom(solid: &[Kmer]) -> BloomFilter {
        let bloom = BloomFilter::sized_for(solid.len() as u64, 0.3);
        for k in solid {
            bloom.insert(k.canonical().packed());
        }
        bloom
    }

    #[test]
    fn sorted_cfp_flags_bloom_positive_non_solid_neighbours() {
        let solid = vec![kmer("ACGT"), kmer("CGTA")];
        let bloom = lossy_bloom(&solid);
        let cfp = SortedCfp::build(&bloom, &solid, CfpCandidateScan::Basic, None);

        // Every flagged value must actually be a Bloom false positive (not solid).
        let solid_set: HashSet<u128> = solid.iter().map(|k| k.canonical().packed()).collect();
        for &v in &cfp.values {
            assert!(!solid_set.contains(&v));
            assert!(bloom.contains(v));
        }
    }

    #[test]
    fn sorted_cfp_never_flags_the_solid_set_itself() {
        let solid = vec![kmer("AAAA"), kmer("CCCC"), kmer("GGGG")];
        let bloom = lossy_bloom(&solid);
        let cfp = SortedCfp::build(&bloom, &solid, CfpCandidateScan::Basic, None);
        for k in &solid {
            assert!(!cfp.contains(k));
        }
    }

    #[test]
    fn sorted_cfp_serialisation_roundtrips() {
        let solid = vec![kmer("ACGT"), kmer("TTTT")];
        let bloom = lossy_bloom(&solid);
        let cfp = SortedCfp::build(&bloom, &solid, CfpCandidateScan::Basic, None);
        let bytes = cfp.to_bytes();
        let restored = SortedCfp::from_bytes(&bytes).unwrap();
        assert_eq!(restored.len(), cfp.len());
    }

    #[test]
    fn cascading_cfp_agrees_with_sorted_cfp_on_every_candidate() {
        let solid: Vec<Kmer> = ["ACGT", "CGTA", "GTAC", "TACG", "AAAA", "TTTT"]
            .iter()
            .map(|s| kmer(s))
            .collect();
        let bloom = lossy_bloom(&solid);
        let sorted = SortedCfp::build(&bloom, &solid, CfpCandidateScan::Basic, None);
        let cascading = CascadingCfp::build(&bloom, &solid, CfpCandidateScan::Basic, None);

        let universe = bloom_positive_neighbours(&bloom, &solid, CfpCandidateScan::Basic, None);
        for &v in &universe {
            let k = Kmer::from_packed(v, solid[0].k());
            assert_eq!(sorted.contains(&k), cascading.contains(&k), "mismatch for {v}");
        }
    }

    #[test]
    fn minimizer_scan_only_admits_same_partition_candidates() {
        let solid = vec![kmer("ACGT"), kmer("CGTA"), kmer("GTAC"), kmer("TACG")];
        let bloom = lossy_bloom(&solid);
        let repart = RepartTable::build_lexicographic(2, 4);

        let universe = bloom_positive_neighbours(&bloom, &solid, CfpCandidateScan::Minimizer, Some(&repart));
        for &v in &universe {
            let k = Kmer::from_packed(v, solid[0].k());
            // Every admitted candidate must share a partition with some solid k-mer.
            assert!(solid.iter().any(|s| repart.part(&s.canonical()) == repart.part(&k)));
        }
    }

    #[test]
    fn choose_strategy_picks_sorted_set_for_small_counts() {
        assert_eq!(choose_strategy(10), CfpStrategy::SortedSet);
        assert_eq!(choose_strategy(10_000_000), CfpStrategy::Cascading);
    }
}
