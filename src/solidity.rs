//! C5 — Solidity Filter: the acceptance predicate over a k-mer's per-bank
//! count vector (spec §4.5).

use clap::ValueEnum;

/// A per-bank abundance vector. Counts saturate at `u32::MAX` (spec §3
/// "Count vector"; saturation policy unified here per spec §9 Open
/// Question — see DESIGN.md).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CountVector(Vec<u32>);

impl CountVector {
    #[must_use]
    pub fn zeroed(bank_count: usize) -> Self {
        Self(vec![0; bank_count.max(1)])
    }

    pub fn increment(&mut self, bank: usize) {
        self.0[bank] = self.0[bank].saturating_add(1);
    }

    #[must_use]
    pub fn counts(&self) -> &[u32] {
        &self.0
    }

    #[must_use]
    pub fn sum(&self) -> u64 {
        self.0.iter().map(|&c| u64::from(c)).sum()
    }

    #[must_use]
    pub fn min(&self) -> u32 {
        self.0.iter().copied().min().unwrap_or(0)
    }

    #[must_use]
    pub fn max(&self) -> u32 {
        self.0.iter().copied().max().unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum SolidityKind {
    Sum,
    Min,
    Max,
    One,
    All,
}

impl Default for SolidityKind {
    fn default() -> Self {
        Self::Sum
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolidityFilter {
    pub kind: SolidityKind,
    pub abund_min: u32,
    pub abund_max: u32,
}

impl SolidityFilter {
    #[must_use]
    pub fn new(kind: SolidityKind, abund_min: u32, abund_max: u32) -> Self {
        Self {
            kind,
            abund_min,
            abund_max,
        }
    }

    fn in_range(&self, v: u32) -> bool {
        self.abund_min <= v && v <= self.abund_max
    }

    /// Spec §4.5 table. With `bank_count == 1` every kind coincides.
    #[must_use]
    pub fn accepts(&self, counts: &CountVector) -> bool {
        match self.kind {
            SolidityKind::Sum => self.in_range(counts.sum().min(u64::from(u32::MAX)) as u32),
            SolidityKind::Min => self.in_range(counts.min()),
            SolidityKind::Max => self.in_range(counts.max()),
            SolidityKind::One => counts.counts().iter().any(|&c| self.in_range(c)),
            SolidityKind::All => counts.counts().iter().all(|&c| self.in_range(c)),
        }
    }

    /// Aggregate abundance forwarded to C6: always `sum(c_i)`, saturated
    /// (spec §4.5).
    #[must_use]
    pub fn aggregate(counts: &CountVector) -> u64 {
        counts.sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(values: &[u32]) -> CountVector {
        CountVector(values.to_vec())
    }

    #[test]
    fn sum_kind_sums_all_banks() {
        let filter = SolidityFilter::new(SolidityKind::Sum, 2, 10);
        assert!(filter.accepts(&counts(&[1, 1])));
        assert!(!filter.accepts(&counts(&[0, 1])));
    }

    #[test]
    fn min_kind_requires_every_bank_at_least_min() {
        let filter = SolidityFilter::new(SolidityKind::Min, 2, 10);
        assert!(filter.accepts(&counts(&[2, 5])));
        assert!(!filter.accepts(&counts(&[1, 5])));
    }

    #[test]
    fn one_kind_requires_any_bank_in_range() {
        let filter = SolidityFilter::new(SolidityKind::One, 3, 3);
        assert!(filter.accepts(&counts(&[0, 3, 0])));
        assert!(!filter.accepts(&counts(&[0, 0, 0])));
    }

    #[test]
    fn all_kind_requires_every_bank_in_range() {
        let filter = SolidityFilter::new(SolidityKind::All, 1, 5);
        assert!(filter.accepts(&counts(&[1, 5])));
        assert!(!filter.accepts(&counts(&[1, 6])));
    }

    #[test]
    fn single_bank_all_kinds_coincide() {
        let count = counts(&[4]);
        for kind in [
            SolidityKind::Sum,
            SolidityKind::Min,
            SolidityKind::Max,
            SolidityKind::One,
            SolidityKind::All,
        ] {
            let filter = SolidityFilter::new(kind, 4, 4);
            assert!(filter.accepts(&count));
        }
    }

    #[test]
    fn increment_saturates_at_u32_max() {
        let mut v = CountVector::zeroed(1);
        for _ in 0..5 {
            v.increment(0);
        }
        assert_eq!(v.counts()[0], 5);
    }
}
