#![allow(clippy::unwrap_used, clippy::expect_used)]

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dbgcore::builder::GraphBuilder;
use dbgcore::kmer::Kmer;
use dbgcore::sequence::{InMemorySequenceSource, SequenceSource};
use dbgcore::storage::FileStorage;

fn bench_from_bases(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::from_bases");

    for k in [5, 11, 21, 31] {
        let seq = "ACGT".repeat(k / 4 + 1);
        let bases = seq.as_bytes()[..k].to_vec();

        group.bench_with_input(BenchmarkId::from_parameter(k), &bases, |b, bases| {
            b.iter(|| Kmer::from_bases(black_box(bases), k).unwrap())
        });
    }

    group.finish();
}

fn bench_canonical_already_smallest(c: &mut Criterion) {
    // "AAAA..." is already canonical, so no swap happens.
    let mut group = c.benchmark_group("Kmer::canonical_no_swap");

    for k in [5, 11, 21, 31] {
        let bases = vec![b'A'; k];
        let kmer = Kmer::from_bases(&bases, k).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, kmer| {
            b.iter(|| black_box(kmer.canonical()))
        });
    }

    group.finish();
}

fn bench_canonical_needs_swap(c: &mut Criterion) {
    // "TTTT..." canonicalises to its reverse complement "AAAA...".
    let mut group = c.benchmark_group("Kmer::canonical_swap");

    for k in [5, 11, 21, 31] {
        let bases = vec![b'T'; k];
        let kmer = Kmer::from_bases(&bases, k).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, kmer| {
            b.iter(|| black_box(kmer.canonical()))
        });
    }

    group.finish();
}

fn bench_to_bases(c: &mut Criterion) {
    let mut group = c.benchmark_group("Kmer::to_bases");

    for k in [5, 11, 21, 31] {
        let seq = "ACGT".repeat(k / 4 + 1);
        let bases = seq.as_bytes()[..k].to_vec();
        let kmer = Kmer::from_bases(&bases, k).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(k), &kmer, |b, kmer| {
            b.iter(|| black_box(kmer.to_bases()))
        });
    }

    group.finish();
}

fn bench_full_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("GraphBuilder::build");
    group.sample_size(10);

    let sequence = "ACGTACGTACGTACGTACGTACGTACGTACGT".repeat(200);

    for k in [11, 21] {
        group.bench_with_input(BenchmarkId::from_parameter(k), &k, |b, &k| {
            b.iter(|| {
                let source = InMemorySequenceSource::from_sequences([sequence.as_str()]);
                let banks: Vec<&dyn SequenceSource> = vec![&source];
                let dir = tempfile::tempdir().unwrap();
                let storage = FileStorage::open(dir.path()).unwrap();

                black_box(
                    GraphBuilder::new()
                        .k(k)
                        .unwrap()
                        .min_abundance(1)
                        .build(&banks, &storage)
                        .unwrap(),
                )
            })
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_from_bases,
    bench_canonical_already_smallest,
    bench_canonical_needs_swap,
    bench_to_bases,
    bench_full_build,
);

criterion_main!(benches);
