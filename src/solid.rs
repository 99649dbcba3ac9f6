//! C6 — Solid Set Writer: appends k-mers that pass the solidity filter to
//! per-`(pass, partition)` collections and accumulates the abundance
//! histogram alongside them (spec §4.6).

use crate::error::GraphError;
use crate::histogram::{compute_histogram, Histogram};
use crate::kmer::Kmer;
use crate::storage::Collection;

/// One accepted k-mer and its aggregate abundance (spec §4.5 "Aggregate
/// abundance forwarded to C6").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolidRecord {
    pub kmer: Kmer,
    pub abundance: u64,
}

impl SolidRecord {
    fn to_bytes(self) -> [u8; 25] {
        let mut out = [0u8; 25];
        out[0..16].copy_from_slice(&self.kmer.packed().to_le_bytes());
        out[16] = self.kmer.k() as u8;
        out[17..25].copy_from_slice(&self.abundance.to_le_bytes());
        out
    }

    fn from_bytes(bytes: &[u8]) -> Result<Self, GraphError> {
        if bytes.len() != 25 {
            return Err(GraphError::Invariant(format!(
                "solid record has {} bytes, expected 25",
                bytes.len()
            )));
        }
        let packed = u128::from_le_bytes(bytes[0..16].try_into().unwrap());
        let k = bytes[16] as usize;
        let abundance = u64::from_le_bytes(bytes[17..25].try_into().unwrap());
        Ok(Self {
            kmer: Kmer::from_packed(packed, k),
            abundance,
        })
    }
}

/// Appends accepted k-mers to one `(pass, partition)` collection and tracks
/// the abundances it has seen, so the full histogram can be assembled once
/// every partition has been written (spec §4.6 "one sub-collection per
/// (pass, partition), written by exactly one worker").
pub struct SolidSetWriter<'a> {
    collection: &'a dyn Collection,
    seen_abundances: Vec<u64>,
}

impl<'a> SolidSetWriter<'a> {
    #[must_use]
    pub fn new(collection: &'a dyn Collection) -> Self {
        Self {
            collection,
            seen_abundances: Vec::new(),
        }
    }

    pub fn write(&mut self, record: SolidRecord) -> Result<(), GraphError> {
        self.collection.append(&record.to_bytes())?;
        self.seen_abundances.push(record.abundance);
        Ok(())
    }

    /// Finalises the underlying collection and returns this writer's share
    /// of the overall abundance histogram (spec §4.6 "the histogram is the
    /// sum of every worker's partial histogram").
    pub fn finish(self) -> Result<Histogram, GraphError> {
        self.collection.finalize()?;
        Ok(compute_histogram(self.seen_abundances))
    }
}

/// Merges partial per-partition histograms into one (spec §4.6).
#[must_use]
pub fn merge_histograms(partials: impl IntoIterator<Item = Histogram>) -> Histogram {
    let mut merged = Histogram::new();
    for partial in partials {
        for (abundance, frequency) in partial {
            *merged.entry(abundance).or_insert(0) += frequency;
        }
    }
    merged
}

pub fn read_solid_records(collection: &dyn Collection) -> Result<Vec<SolidRecord>, GraphError> {
    collection
        .read_all()?
        .iter()
        .map(|bytes| SolidRecord::from_bytes(bytes))
        .collect()
}

/// Below this abundance, raw histogram noise (sequencing errors, `k`-mers
/// seen once or twice) makes "first local maximum" detection unreliable, so
/// the scan for it starts here rather than at 1 (spec §9 Open Question
/// "auto threshold lower bound" — resolved in DESIGN.md).
pub const MIN_AUTO_THRESHOLD: u64 = 3;

fn smoothed(histogram: &Histogram, center: u64) -> f64 {
    let lo = center.saturating_sub(1);
    let hi = center + 1;
    let sum: u64 = (lo..=hi).map(|a| *histogram.get(&a).unwrap_or(&0)).sum();
    f64::from(u32::try_from(sum.min(u64::from(u32::MAX))).unwrap_or(u32::MAX)) / 3.0
}

/// Finds the first local minimum following the first local maximum in a
/// width-3 moving average of the histogram, the standard heuristic for
/// separating the sequencing-error peak from the true-coverage peak (spec
/// §4.6 "Automatic cutoff"). Returns `None` if the histogram is empty or no
/// such minimum exists (e.g. monotonic histograms).
#[must_use]
pub fn recommend_cutoff(histogram: &Histogram) -> Option<u64> {
    let max_abundance = *histogram.keys().max()?;
    if max_abundance < MIN_AUTO_THRESHOLD + 1 {
        return None;
    }

    let curve: Vec<(u64, f64)> = (1..=max_abundance).map(|a| (a, smoothed(histogram, a))).collect();

    let mut past_peak = false;
    for window in curve.windows(3) {
        let (a0, c0) = window[0];
        let (a1, c1) = window[1];
        let (_, c2) = window[2];
        if !past_peak {
            if a1 >= MIN_AUTO_THRESHOLD && c1 > c0 && c1 >= c2 {
                past_peak = true;
            }
        } else if c1 < c0 && c1 <= c2 {
            return Some(a1);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FileStorage, Storage};

    fn record(bases: &str, abundance: u64) -> SolidRecord {
        let k = bases.len();
        SolidRecord {
            kmer: Kmer::from_bases(bases.as_bytes(), k).unwrap(),
            abundance,
        }
    }

    #[test]
    fn writer_roundtrips_records_and_builds_histogram() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let root = storage.root().unwrap();
        let collection = root.collection("solid").unwrap();

        let mut writer = SolidSetWriter::new(collection.as_ref());
        writer.write(record("ACGT", 5)).unwrap();
        writer.write(record("TTTT", 5)).unwrap();
        writer.write(record("GGGG", 12)).unwrap();
        let histogram = writer.finish().unwrap();

        assert_eq!(histogram.get(&5), Some(&2));
        assert_eq!(histogram.get(&12), Some(&1));

        let records = read_solid_records(collection.as_ref()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().any(|r| r.abundance == 12));
    }

    #[test]
    fn merge_histograms_sums_overlapping_buckets() {
        let a = compute_histogram([1, 1, 5]);
        let b = compute_histogram([5, 5]);
        let merged = merge_histograms([a, b]);
        assert_eq!(merged.get(&1), Some(&2));
        assert_eq!(merged.get(&5), Some(&3));
    }

    #[test]
    fn recommend_cutoff_finds_valley_between_error_and_coverage_peaks() {
        let mut histogram = Histogram::new();
        // Error peak near abundance 1-2, valley around 5-6, coverage peak around 20.
        for (abundance, freq) in [
            (1, 900), (2, 500), (3, 200), (4, 80), (5, 30), (6, 25), (7, 40),
            (10, 150), (15, 400), (20, 600), (25, 400), (30, 150), (35, 40),
        ] {
            histogram.insert(abundance, freq);
        }
        let cutoff = recommend_cutoff(&histogram).unwrap();
        assert!((4..=8).contains(&cutoff), "unexpected cutoff {cutoff}");
    }

    #[test]
    fn recommend_cutoff_returns_none_for_monotonic_histogram() {
        let histogram = compute_histogram((1..50).flat_map(|a: u64| std::iter::repeat(a).take((50 - a) as usize)));
        assert!(recommend_cutoff(&histogram).is_none());
    }

    #[test]
    fn recommend_cutoff_returns_none_for_tiny_histogram() {
        let histogram = compute_histogram([1, 2]);
        assert!(recommend_cutoff(&histogram).is_none());
    }
}
