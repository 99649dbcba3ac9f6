//! C1 — Configuration Planner: choose pass count `P` and partition count `N`
//! from input volume, memory cap, disk cap, and open-FD cap (spec §4.1).

use crate::error::GraphError;

/// Rough per-k-mer byte cost used by the planner. A packed k-mer plus a
/// per-bank count vector entry, with a constant factor for super-k-mer
/// run-length overhead (spec §4.1 "V = T·sizeof(packed k-mer)... with a
/// constant factor for super-k-mer overhead").
const SUPERKMER_OVERHEAD_FACTOR: f64 = 1.5;
const PACKED_KMER_BYTES: u64 = 16; // u128
const COUNT_ENTRY_BYTES: u64 = 8; // kmer key + one bank count, hash-mode entry

#[derive(Debug, Clone, Copy)]
pub struct PlannerInput {
    /// Estimated total base count, sampled from the input.
    pub estimated_bases: u64,
    pub kmer_size: usize,
    pub memory_cap_bytes: u64,
    pub disk_cap_bytes: u64,
    pub fd_cap: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Plan {
    pub passes: u32,
    pub partitions: u32,
}

fn volume_bytes(input: &PlannerInput) -> u64 {
    let raw = (input.estimated_bases as f64) * (PACKED_KMER_BYTES as f64);
    (raw * SUPERKMER_OVERHEAD_FACTOR).ceil() as u64
}

/// Implements the §4.1 algorithm: start `P = ceil(V/D)` (at least 1);
/// compute `N = ceil(V / (P * M_eff))`; while `N >= F/2`, increment `P` and
/// recompute. Ties prefer smaller `P` (fewer re-reads), subject to the FD
/// constraint.
pub fn plan(input: &PlannerInput) -> Result<Plan, GraphError> {
    if input.kmer_size == 0 {
        return Err(GraphError::Configuration("kmer_size must be >= 1".into()));
    }
    if input.memory_cap_bytes == 0 || input.disk_cap_bytes == 0 {
        return Err(GraphError::Configuration(
            "memory_cap_bytes and disk_cap_bytes must be > 0".into(),
        ));
    }
    if input.fd_cap < 2 {
        return Err(GraphError::Resource(
            "fd_cap must allow at least 2 open files (N < F/2 requires F >= 2)".into(),
        ));
    }

    let volume = volume_bytes(input).max(1);
    let fd_limit = input.fd_cap / 2;
    if fd_limit == 0 {
        return Err(GraphError::Resource(
            "open-FD cap too small to reserve any partitions".into(),
        ));
    }

    let mut passes: u32 = volume.div_ceil(input.disk_cap_bytes).max(1) as u32;

    loop {
        let volume_per_pass = volume / u64::from(passes);
        let partitions =
            volume_per_pass.div_ceil(input.memory_cap_bytes.max(1)).max(1) as u32;

        if partitions < fd_limit {
            return Ok(Plan { passes, partitions });
        }

        // Cannot reduce N enough within u32 range: bail out rather than loop
        // forever, since each increment of P only ever shrinks N.
        if passes == u32::MAX {
            return Err(GraphError::Resource(
                "no (pass, partition) assignment satisfies the open-FD cap".into(),
            ));
        }
        passes += 1;
    }
}

/// A coarse, k-dependent estimate of the number of distinct k-mers expected
/// in a sample, used only to seed C4's initial hash-vs-vector decision
/// before any real data for a partition has been read (spec §9 open
/// question area; grounded on the upstream's "UKL" unique-k-mer load
/// table, simplified to a closed-form heuristic rather than a lookup
/// table reproduced from the original implementation).
#[must_use]
pub fn estimate_distinct_kmers(sample_bases: u64, kmer_size: usize) -> u64 {
    if sample_bases == 0 || kmer_size == 0 {
        return 0;
    }
    let possible_windows = sample_bases.saturating_sub(kmer_size as u64 - 1);
    // Real sequencing data has far fewer distinct k-mers than possible
    // windows due to genome size and repeat structure; 60% uniqueness is a
    // deliberately conservative planning heuristic, not a measured figure.
    (possible_windows as f64 * 0.6) as u64
}
