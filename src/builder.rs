//! Fluent builder for configuring and running a graph build.
//!
//! # Example
//!
//! ```rust,no_run
//! use dbgcore::builder::GraphBuilder;
//! use dbgcore::sequence::{InMemorySequenceSource, SequenceSource};
//! use dbgcore::storage::FileStorage;
//!
//! let source = InMemorySequenceSource::from_sequences(["ACGTACGTACGT"]);
//! let banks: Vec<&dyn SequenceSource> = vec![&source];
//! let storage = FileStorage::open("graph.dbg")?;
//!
//! let artifacts = GraphBuilder::new()
//!     .k(21)?
//!     .min_abundance(2)
//!     .build(&banks, &storage)?;
//!
//! println!("{} distinct solid k-mers", artifacts.histogram.values().sum::<u64>());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::cfp::{CfpCandidateScan, DebloomKind};
use crate::error::GraphError;
use crate::kmer::{K_MAX, K_MIN};
use crate::minimizer::MinimizerOrderKind;
use crate::pipeline::{self, GraphArtifacts, GraphBuildOptions};
use crate::progress::{CancellationToken, Dispatcher, ProgressListener, TextProgressListener};
use crate::sequence::SequenceSource;
use crate::solidity::{SolidityFilter, SolidityKind};
use crate::storage::Storage;

const DEFAULT_MEMORY_CAP_BYTES: u64 = 1_000_000_000;
const DEFAULT_DISK_CAP_BYTES: u64 = 20_000_000_000;
const DEFAULT_FD_CAP: u32 = 256;
const DEFAULT_BLOOM_FP_RATE: f64 = 0.01;

/// The `-bloom` choice (spec §6: `basic|cache|neighbor`, default `neighbor`).
/// This crate's [`BloomFilter`](crate::bloom::BloomFilter) has exactly two
/// physical layouts — plain and cache-coherent blocked — so `Cache` and
/// `Neighbor` both select the cache-coherent layout; upstream's distinction
/// between them is an insertion-order optimisation for construction-time
/// locality, not a different bit layout, and this crate builds the filter in
/// one pass rather than two, so there is nothing left for `Neighbor` to
/// select beyond the blocked layout itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BloomKind {
    Basic,
    Cache,
    Neighbor,
}

impl Default for BloomKind {
    fn default() -> Self {
        Self::Neighbor
    }
}

impl BloomKind {
    fn is_cache_coherent(self) -> bool {
        !matches!(self, Self::Basic)
    }
}

/// A builder for configuring a graph build. Set at least [`k`](Self::k)
/// before calling [`build()`](Self::build).
#[derive(Debug, Clone)]
pub struct GraphBuilder {
    kmer_size: Option<usize>,
    minimizer_size: Option<usize>,
    memory_cap_bytes: u64,
    disk_cap_bytes: u64,
    fd_cap: u32,
    cores: usize,
    solidity_kind: SolidityKind,
    min_abundance: u32,
    max_abundance: u32,
    bloom_fp_rate: f64,
    bloom_kind: BloomKind,
    candidate_scan: CfpCandidateScan,
    debloom: DebloomKind,
    minimizer_order: MinimizerOrderKind,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    /// Creates a new builder with the defaults from spec §6: `abund_min = 2`
    /// (so a k-mer seen only once never counts as solid), sum solidity, a 1%
    /// Bloom false-positive target, the neighbor-layout Bloom filter, the
    /// minimizer candidate scan, the cascading cFP strategy, and
    /// lexicographic minimizer ordering.
    #[must_use]
    pub fn new() -> Self {
        Self {
            kmer_size: None,
            minimizer_size: None,
            memory_cap_bytes: DEFAULT_MEMORY_CAP_BYTES,
            disk_cap_bytes: DEFAULT_DISK_CAP_BYTES,
            fd_cap: DEFAULT_FD_CAP,
            cores: 4,
            solidity_kind: SolidityKind::Sum,
            min_abundance: 2,
            max_abundance: u32::MAX,
            bloom_fp_rate: DEFAULT_BLOOM_FP_RATE,
            bloom_kind: BloomKind::default(),
            candidate_scan: CfpCandidateScan::Minimizer,
            debloom: DebloomKind::default(),
            minimizer_order: MinimizerOrderKind::default(),
        }
    }

    /// Sets the k-mer length.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Configuration`] if `k` is outside `[K_MIN, K_MAX]`.
    pub fn k(mut self, k: usize) -> Result<Self, GraphError> {
        if !(K_MIN..=K_MAX).contains(&k) {
            return Err(GraphError::Configuration(format!(
                "kmer_size must be in [{K_MIN}, {K_MAX}], got {k}"
            )));
        }
        self.kmer_size = Some(k);
        Ok(self)
    }

    /// Sets the minimizer width. Defaults to `k.saturating_sub(10).max(4)` if
    /// never called — a width that stays well under `k` across the common
    /// 16..=64 range without the caller needing to reason about it.
    #[must_use]
    pub fn minimizer_size(mut self, m: usize) -> Self {
        self.minimizer_size = Some(m);
        self
    }

    #[must_use]
    pub fn memory_cap_bytes(mut self, bytes: u64) -> Self {
        self.memory_cap_bytes = bytes;
        self
    }

    #[must_use]
    pub fn disk_cap_bytes(mut self, bytes: u64) -> Self {
        self.disk_cap_bytes = bytes;
        self
    }

    #[must_use]
    pub fn fd_cap(mut self, fds: u32) -> Self {
        self.fd_cap = fds;
        self
    }

    #[must_use]
    pub fn cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    #[must_use]
    pub fn solidity_kind(mut self, kind: SolidityKind) -> Self {
        self.solidity_kind = kind;
        self
    }

    /// Sets the inclusive abundance floor below which a k-mer is discarded
    /// as noise (spec §4.5). Default 2.
    #[must_use]
    pub fn min_abundance(mut self, min_abundance: u32) -> Self {
        self.min_abundance = min_abundance;
        self
    }

    #[must_use]
    pub fn max_abundance(mut self, max_abundance: u32) -> Self {
        self.max_abundance = max_abundance;
        self
    }

    #[must_use]
    pub fn bloom_fp_rate(mut self, rate: f64) -> Self {
        self.bloom_fp_rate = rate;
        self
    }

    /// Selects the `-bloom` layout (spec §6). Default `neighbor`.
    #[must_use]
    pub fn bloom_kind(mut self, kind: BloomKind) -> Self {
        self.bloom_kind = kind;
        self
    }

    #[must_use]
    pub fn candidate_scan(mut self, scan: CfpCandidateScan) -> Self {
        self.candidate_scan = scan;
        self
    }

    /// Selects the `-debloom` strategy (spec §6). Default `cascading`.
    #[must_use]
    pub fn debloom(mut self, kind: DebloomKind) -> Self {
        self.debloom = kind;
        self
    }

    /// Selects the `-minimizer-type` ordering scheme (spec §6). Default
    /// `lexicographic`.
    #[must_use]
    pub fn minimizer_order(mut self, order: MinimizerOrderKind) -> Self {
        self.minimizer_order = order;
        self
    }

    fn options(&self) -> Result<GraphBuildOptions, GraphError> {
        let kmer_size = self
            .kmer_size
            .ok_or_else(|| GraphError::Configuration("k-mer length not set; call .k() first".into()))?;
        let minimizer_size = self.minimizer_size.unwrap_or_else(|| kmer_size.saturating_sub(10).max(4).min(kmer_size - 1));
        Ok(GraphBuildOptions {
            kmer_size,
            minimizer_size,
            memory_cap_bytes: self.memory_cap_bytes,
            disk_cap_bytes: self.disk_cap_bytes,
            fd_cap: self.fd_cap,
            cores: self.cores,
            solidity: SolidityFilter::new(self.solidity_kind, self.min_abundance, self.max_abundance),
            bloom_fp_rate: self.bloom_fp_rate,
            cache_coherent_bloom: self.bloom_kind.is_cache_coherent(),
            candidate_scan: self.candidate_scan,
            debloom: self.debloom,
            minimizer_order: self.minimizer_order,
        })
    }

    /// Runs the build with a fresh thread pool, no cancellation, and
    /// plain-colored stderr progress, cleaning up its own scratch directory
    /// on return.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::Configuration`] if `k` was never set or the
    /// configured options are invalid, or any error the pipeline itself
    /// raises (spec §5 "Error model").
    pub fn build(&self, banks: &[&dyn SequenceSource], storage: &dyn Storage) -> Result<GraphArtifacts, GraphError> {
        let dispatcher = Dispatcher::new(self.cores);
        let cancel = CancellationToken::new();
        let listener = TextProgressListener;
        self.build_with(banks, storage, &dispatcher, &cancel, &listener)
    }

    /// Runs the build against caller-supplied concurrency, cancellation, and
    /// progress-reporting collaborators, for callers that need to cancel a
    /// build in flight or route progress somewhere other than stderr.
    ///
    /// # Errors
    ///
    /// See [`build()`](Self::build).
    pub fn build_with(
        &self,
        banks: &[&dyn SequenceSource],
        storage: &dyn Storage,
        dispatcher: &Dispatcher,
        cancel: &CancellationToken,
        listener: &dyn ProgressListener,
    ) -> Result<GraphArtifacts, GraphError> {
        let options = self.options()?;
        let scratch = tempfile::tempdir().map_err(GraphError::io)?;
        pipeline::build(banks, &options, storage, scratch.path(), dispatcher, cancel, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::InMemorySequenceSource;
    use crate::storage::FileStorage;

    #[test]
    fn default_builder_has_no_kmer_size() {
        let builder = GraphBuilder::new();
        assert!(builder.kmer_size.is_none());
    }

    #[test]
    fn rejects_out_of_range_k() {
        assert!(GraphBuilder::new().k(0).is_err());
        assert!(GraphBuilder::new().k(65).is_err());
        assert!(GraphBuilder::new().k(21).is_ok());
    }

    #[test]
    fn build_without_k_fails_with_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let source = InMemorySequenceSource::from_sequences(["ACGT"]);
        let banks: Vec<&dyn SequenceSource> = vec![&source];

        let result = GraphBuilder::new().build(&banks, &storage);
        assert!(matches!(result, Err(GraphError::Configuration(_))));
    }

    #[test]
    fn chained_builder_runs_end_to_end() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let source = InMemorySequenceSource::from_sequences(["ACGTACGTACGTACGTACGTACGT"]);
        let banks: Vec<&dyn SequenceSource> = vec![&source];

        let artifacts = GraphBuilder::new()
            .k(5)
            .unwrap()
            .minimizer_size(3)
            .min_abundance(1)
            .cores(2)
            .build(&banks, &storage)
            .unwrap();

        assert!(artifacts.histogram.values().sum::<u64>() > 0);
    }
}
