//! End-to-end scenarios exercising the public `GraphBuilder` surface exactly
//! as an embedding caller would use it: build over one or more banks, then
//! query the resulting oracle.

use dbgcore::builder::GraphBuilder;
use dbgcore::kmer::{Kmer, KmerModel};
use dbgcore::sequence::{InMemorySequenceSource, SequenceSource};
use dbgcore::solidity::SolidityKind;
use dbgcore::storage::FileStorage;

fn kmer(bases: &str) -> Kmer {
    Kmer::from_bases(bases.as_bytes(), bases.len()).unwrap()
}

#[test]
fn single_bank_sum_solidity_finds_every_canonical_kmer_in_a_short_read() {
    let bank = InMemorySequenceSource::from_sequences(["ACGTACGTAC"]);
    let banks: Vec<&dyn SequenceSource> = vec![&bank];
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).unwrap();

    let artifacts = GraphBuilder::new()
        .k(3)
        .unwrap()
        .minimizer_size(2)
        .solidity_kind(SolidityKind::Sum)
        .min_abundance(1)
        .build(&banks, &storage)
        .unwrap();

    for window in ["ACG", "CGT", "GTA", "TAC"] {
        assert!(artifacts.oracle.contains(&kmer(window)), "{window} should be solid");
    }
    assert!(!artifacts.oracle.contains(&kmer("AAA")));
}

#[test]
fn two_bank_min_solidity_keeps_kmers_shared_across_banks() {
    let bank_a = InMemorySequenceSource::from_sequences(["AAAACCCCGGGG"]);
    let bank_b = InMemorySequenceSource::from_sequences(["CCCCGGGGTTTT"]);
    let banks: Vec<&dyn SequenceSource> = vec![&bank_a, &bank_b];
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).unwrap();

    let artifacts = GraphBuilder::new()
        .k(4)
        .unwrap()
        .minimizer_size(2)
        .solidity_kind(SolidityKind::Min)
        .min_abundance(1)
        .build(&banks, &storage)
        .unwrap();

    // These three fall in the literal overlap of the two reads and have no
    // self-reverse-complement ambiguity, so they are unambiguously solid
    // under every reasonable canonicalisation choice.
    for shared in ["CCCG", "CCGG", "CGGG"] {
        assert!(artifacts.oracle.contains(&kmer(shared)), "{shared} should be solid");
    }
}

fn synthetic_bases(len: usize) -> Vec<u8> {
    let bases = [b'A', b'C', b'G', b'T'];
    let mut state: u64 = 0x1234_5678_9abc_def0;
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        state = state.wrapping_mul(6_364_136_223_846_793_005).wrapping_add(1);
        out.push(bases[((state >> 62) & 0b11) as usize]);
    }
    out
}

#[test]
fn tight_disk_cap_forces_multiple_passes_and_the_solid_count_matches_a_reference_scan() {
    let k = 21;
    let bases = synthetic_bases(5_000);
    let bank = InMemorySequenceSource::from_sequences([bases.clone()]);
    let banks: Vec<&dyn SequenceSource> = vec![&bank];
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).unwrap();

    let artifacts = GraphBuilder::new()
        .k(k)
        .unwrap()
        .minimizer_size(5)
        .min_abundance(1)
        .memory_cap_bytes(50_000)
        .disk_cap_bytes(10_000)
        .build(&banks, &storage)
        .unwrap();

    assert!(artifacts.plan.passes > 1, "expected the disk cap to force multiple passes");

    let model = KmerModel::new(k, 5);
    let reference: std::collections::HashSet<u128> = model.iter_canonical(&bases).map(|(kmer, _)| kmer.packed()).collect();
    let distinct_in_graph: u64 = artifacts.histogram.values().sum();
    assert_eq!(distinct_in_graph as usize, reference.len());

    for packed in reference.iter().take(20) {
        let k_mer = Kmer::from_packed(*packed, k);
        assert!(artifacts.oracle.contains(&k_mer));
    }
}

#[test]
fn build_is_deterministic_across_worker_counts() {
    let k = 11;
    let read = b"CGCTATTCATCATTGTTTATCGCTATTCATCATTGTTTATCGCTATTCATCATTGTTTAT".to_vec();

    let mut histograms = Vec::new();
    let mut membership_samples = Vec::new();

    for cores in [1usize, 2, 4] {
        let bank = InMemorySequenceSource::from_sequences([read.clone()]);
        let banks: Vec<&dyn SequenceSource> = vec![&bank];
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();

        let artifacts = GraphBuilder::new()
            .k(k)
            .unwrap()
            .minimizer_size(5)
            .min_abundance(1)
            .cores(cores)
            .build(&banks, &storage)
            .unwrap();

        histograms.push(artifacts.histogram.clone());
        let sample: Vec<bool> = read
            .windows(k)
            .map(|w| artifacts.oracle.contains(&Kmer::from_bases(w, k).unwrap()))
            .collect();
        membership_samples.push(sample);
    }

    assert!(histograms.windows(2).all(|pair| pair[0] == pair[1]), "histograms diverged across worker counts");
    assert!(
        membership_samples.windows(2).all(|pair| pair[0] == pair[1]),
        "oracle membership diverged across worker counts"
    );
}

#[test]
fn a_build_can_be_reopened_from_storage_for_querying() {
    let bank = InMemorySequenceSource::from_sequences(["ACGTACGTACGTACGTACGT"]);
    let banks: Vec<&dyn SequenceSource> = vec![&bank];
    let dir = tempfile::tempdir().unwrap();
    let storage = FileStorage::open(dir.path()).unwrap();

    GraphBuilder::new().k(5).unwrap().minimizer_size(3).min_abundance(1).build(&banks, &storage).unwrap();

    let reopened = dbgcore::pipeline::load(&storage).unwrap();
    assert!(reopened.oracle.contains(&kmer("ACGTA")));
    assert!(reopened.histogram.values().sum::<u64>() > 0);
}
