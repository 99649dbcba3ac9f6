//! Abundance histogram: maps an abundance value to the number of distinct
//! k-mers that were seen that many times (spec §4.6 "Histogram"). Used by
//! the solid-set writer to drive automatic cutoff selection.

use std::collections::BTreeMap;

/// Maps abundance -> number of distinct k-mers with that abundance.
///
/// Uses `BTreeMap` for sorted iteration, which `recommend_cutoff` (spec
/// §4.6) depends on.
pub type Histogram = BTreeMap<u64, u64>;

/// Summary statistics for an abundance histogram.
#[derive(Debug, Clone, PartialEq)]
pub struct HistogramStats {
    /// Total k-mer occurrences (sum of abundance * frequency).
    pub total_kmers: u64,
    /// Number of distinct k-mers across all abundances.
    pub distinct_kmers: u64,
    /// The abundance value that occurs for the most distinct k-mers.
    pub mode_count: u64,
    /// How many distinct k-mers have the mode abundance.
    pub mode_frequency: u64,
    /// Mean abundance across all distinct k-mers.
    pub mean_count: f64,
}

/// Builds a histogram from a stream of per-kmer abundances (one entry per
/// distinct k-mer, as produced by C4/C5).
#[must_use]
pub fn compute_histogram(abundances: impl IntoIterator<Item = u64>) -> Histogram {
    let mut histogram = BTreeMap::new();
    for abundance in abundances {
        *histogram.entry(abundance).or_insert(0) += 1;
    }
    histogram
}

#[must_use]
pub fn histogram_stats(histogram: &Histogram) -> HistogramStats {
    let distinct: u64 = histogram.values().sum();
    let total: u64 = histogram.iter().map(|(c, f)| c * f).sum();

    let (mode_count, mode_frequency) = histogram
        .iter()
        .max_by_key(|(_, f)| *f)
        .map_or((0, 0), |(&c, &f)| (c, f));

    HistogramStats {
        total_kmers: total,
        distinct_kmers: distinct,
        mode_count,
        mode_frequency,
        #[allow(clippy::cast_precision_loss)]
        mean_count: if distinct > 0 {
            total as f64 / distinct as f64
        } else {
            0.0
        },
    }
}

/// Serialises as `count(u64 LE) | (abundance(u64 LE), frequency(u64 LE))...`,
/// the `dsk/histogram` artifact (spec §6).
#[must_use]
pub fn to_bytes(histogram: &Histogram) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + histogram.len() * 16);
    out.extend_from_slice(&(histogram.len() as u64).to_le_bytes());
    for (&abundance, &frequency) in histogram {
        out.extend_from_slice(&abundance.to_le_bytes());
        out.extend_from_slice(&frequency.to_le_bytes());
    }
    out
}

#[must_use]
pub fn from_bytes(bytes: &[u8]) -> Option<Histogram> {
    if bytes.len() < 8 {
        return None;
    }
    let count = u64::from_le_bytes(bytes[0..8].try_into().ok()?) as usize;
    let body = &bytes[8..];
    if body.len() != count * 16 {
        return None;
    }
    let mut histogram = Histogram::new();
    for chunk in body.chunks_exact(16) {
        let abundance = u64::from_le_bytes(chunk[0..8].try_into().unwrap());
        let frequency = u64::from_le_bytes(chunk[8..16].try_into().unwrap());
        histogram.insert(abundance, frequency);
    }
    Some(histogram)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_serialisation_roundtrips() {
        let histogram = compute_histogram([1, 1, 2, 5, 5, 5]);
        let bytes = to_bytes(&histogram);
        let restored = from_bytes(&bytes).unwrap();
        assert_eq!(restored, histogram);
    }

    #[test]
    fn histogram_basic() {
        let hist = compute_histogram([1, 1, 2, 2]);
        assert_eq!(hist.get(&1), Some(&2));
        assert_eq!(hist.get(&2), Some(&2));
        assert_eq!(hist.get(&3), None);
    }

    #[test]
    fn histogram_single_kmer() {
        let hist = compute_histogram([100]);
        assert_eq!(hist.len(), 1);
        assert_eq!(hist.get(&100), Some(&1));
    }

    #[test]
    fn histogram_empty() {
        let hist = compute_histogram(std::iter::empty());
        assert!(hist.is_empty());
    }

    #[test]
    fn histogram_stats_basic() {
        let hist = compute_histogram([1, 1, 2, 2]);
        let stats = histogram_stats(&hist);

        assert_eq!(stats.distinct_kmers, 4);
        assert_eq!(stats.total_kmers, 6);
        assert!(stats.mode_frequency == 2);
        assert!((stats.mean_count - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_stats_empty() {
        let hist = Histogram::new();
        let stats = histogram_stats(&hist);

        assert_eq!(stats.distinct_kmers, 0);
        assert_eq!(stats.total_kmers, 0);
        assert_eq!(stats.mode_count, 0);
        assert_eq!(stats.mode_frequency, 0);
        assert!((stats.mean_count - 0.0).abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_stats_single_kmer() {
        let hist = compute_histogram([42]);
        let stats = histogram_stats(&hist);

        assert_eq!(stats.distinct_kmers, 1);
        assert_eq!(stats.total_kmers, 42);
        assert_eq!(stats.mode_count, 42);
        assert_eq!(stats.mode_frequency, 1);
        assert!((stats.mean_count - 42.0).abs() < f64::EPSILON);
    }

    #[test]
    fn histogram_sorted_keys() {
        let hist = compute_histogram([100, 1, 50]);
        let keys: Vec<_> = hist.keys().collect();
        assert_eq!(keys, vec![&1, &50, &100]);
    }
}
