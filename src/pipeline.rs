//! Wires C1 through C9 end to end: plan passes and partitions, partition
//! every bank, count and filter each partition, assemble the final solid
//! set's histogram, then build the Bloom filter and cFP correction that
//! back a `GraphOracle` (spec §3 "Lifecycle").

use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use crate::bloom::BloomFilter;
use crate::cfp::{CascadingCfp, CfpCandidateScan, DebloomKind, SortedCfp};
use crate::config::{self, Plan, PlannerInput};
use crate::counter::{self};
use crate::error::GraphError;
use crate::histogram::Histogram;
use crate::kmer::{Kmer, KmerModel, K_MAX, K_MIN};
use crate::minimizer::{MinimizerOrder, MinimizerOrderKind, RepartTable};
use crate::oracle::{Cfp, GraphOracle};
use crate::partition::{self, PartitionWriters};
use crate::progress::{CancellationToken, Dispatcher, ProgressListener, WorkProgress};
use crate::sequence::SequenceSource;
use crate::solid::{self, SolidRecord, SolidSetWriter};
use crate::solidity::SolidityFilter;
use crate::storage::{layout, Storage};

/// Every knob `dbgh5` (or an embedding caller) exposes over the build (spec
/// §6 CLI flags), collected into one value so `GraphBuilder` has something
/// concrete to assemble before calling [`build`].
#[derive(Debug, Clone)]
pub struct GraphBuildOptions {
    pub kmer_size: usize,
    pub minimizer_size: usize,
    pub memory_cap_bytes: u64,
    pub disk_cap_bytes: u64,
    pub fd_cap: u32,
    pub cores: usize,
    pub solidity: SolidityFilter,
    pub bloom_fp_rate: f64,
    pub cache_coherent_bloom: bool,
    pub candidate_scan: CfpCandidateScan,
    pub debloom: DebloomKind,
    pub minimizer_order: MinimizerOrderKind,
}

impl GraphBuildOptions {
    fn validate(&self) -> Result<(), GraphError> {
        if !(K_MIN..=K_MAX).contains(&self.kmer_size) {
            return Err(GraphError::Configuration(format!(
                "kmer_size must be in [{K_MIN}, {K_MAX}], got {}",
                self.kmer_size
            )));
        }
        if self.minimizer_size == 0 || self.minimizer_size >= self.kmer_size {
            return Err(GraphError::Configuration(
                "minimizer_size must be >= 1 and < kmer_size".into(),
            ));
        }
        if self.solidity.abund_min > self.solidity.abund_max {
            return Err(GraphError::Configuration(
                "abund_min must be <= abund_max".into(),
            ));
        }
        Ok(())
    }
}

/// Everything a finished build produces (spec §6 "Graph artifact layout" —
/// `oracle` is what's actually queried, `histogram`/`plan`/`repart` are
/// exposed for diagnostics and the `dbgh5 histogram` sub-command).
pub struct GraphArtifacts {
    pub oracle: GraphOracle,
    pub histogram: Histogram,
    pub plan: Plan,
    pub repart: RepartTable,
}

fn solid_collection_name(pass: u32, partition: u32) -> String {
    format!("pass-{pass:04}-partition-{partition:06}")
}

const MINIMIZER_SAMPLE_CAP: usize = 1_000_000;

/// A bounded sample of canonical k-mers drawn from the input banks,
/// used to rank m-mers by frequency for the `-minimizer-type frequency`
/// scheme (spec §4.2, §6). Capped the same way `RepartTable::build_frequency`
/// itself caps, so a large run never holds more than `MINIMIZER_SAMPLE_CAP`
/// k-mers in memory just to build the repart table.
fn sample_kmers_for_minimizer_ranking(banks: &[&dyn SequenceSource], model: &KmerModel) -> Vec<Kmer> {
    let mut sample = Vec::new();
    'banks: for bank in banks {
        for record in bank.records() {
            let Ok(record) = record else { continue };
            for (kmer, _) in model.iter_canonical(&record.data) {
                sample.push(kmer);
                if sample.len() >= MINIMIZER_SAMPLE_CAP {
                    break 'banks;
                }
            }
        }
    }
    sample
}

/// Runs the whole pipeline against `banks`, writing final artifacts under
/// `storage` and transient per-partition files under `scratch_dir` (spec §3
/// "scratch files are written in C3, read once in C4, then deleted" — never
/// part of the `Storage` contract itself).
pub fn build(
    banks: &[&dyn SequenceSource],
    options: &GraphBuildOptions,
    storage: &dyn Storage,
    scratch_dir: &Path,
    dispatcher: &Dispatcher,
    cancel: &CancellationToken,
    listener: &dyn ProgressListener,
) -> Result<GraphArtifacts, GraphError> {
    options.validate()?;
    if banks.is_empty() {
        return Err(GraphError::Configuration(
            "at least one input bank is required".into(),
        ));
    }

    let estimated_bases: u64 = banks.iter().map(|b| b.estimate().total_bases).sum();
    let plan = config::plan(&PlannerInput {
        estimated_bases,
        kmer_size: options.kmer_size,
        memory_cap_bytes: options.memory_cap_bytes,
        disk_cap_bytes: options.disk_cap_bytes,
        fd_cap: options.fd_cap,
    })?;

    let model = KmerModel::new(options.kmer_size, options.minimizer_size);
    let repart = match options.minimizer_order {
        MinimizerOrderKind::Lexicographic => RepartTable::build_lexicographic(options.minimizer_size, plan.partitions),
        MinimizerOrderKind::Frequency => {
            let sample = sample_kmers_for_minimizer_ranking(banks, &model);
            RepartTable::build_frequency(options.minimizer_size, plan.partitions, options.kmer_size, sample.into_iter(), 0)
        }
    };

    let root = storage.root()?;
    root.set_property("kmer_size", &options.kmer_size.to_string())?;
    root.set_property("minimizer_size", &options.minimizer_size.to_string())?;
    root.set_property("bank_count", &banks.len().to_string())?;
    root.set_property("passes", &plan.passes.to_string())?;
    root.set_property("partitions", &plan.partitions.to_string())?;
    root.set_property(
        "minimizer_type",
        match options.minimizer_order {
            MinimizerOrderKind::Lexicographic => "0",
            MinimizerOrderKind::Frequency => "1",
        },
    )?;

    let minimizers = root.subgroup(layout::MINIMIZERS)?;
    let repart_collection = minimizers.collection(layout::MINIMIZERS_REPART)?;
    repart_collection.append(&repart.to_bytes())?;
    repart_collection.finalize()?;
    if let Some(rank_bytes) = repart.rank_bytes() {
        let rank_collection = minimizers.collection(layout::MINIMIZERS_RANK)?;
        rank_collection.append(&rank_bytes)?;
        rank_collection.finalize()?;
    }

    let dsk = root.subgroup(layout::DSK)?;
    let solid_group = dsk.subgroup(layout::DSK_SOLID)?;

    let per_partition_budget = options.memory_cap_bytes / u64::from(plan.partitions.max(1));
    let mode = counter::choose_mode(
        config::estimate_distinct_kmers(estimated_bases, options.kmer_size),
        per_partition_budget,
    );

    let progress = WorkProgress::new(u64::from(plan.passes) * u64::from(plan.partitions));
    let mut partial_histograms = Vec::new();

    for pass in 0..plan.passes {
        let mut bank_dirs = Vec::with_capacity(banks.len());
        for (b, bank) in banks.iter().enumerate() {
            let dir = scratch_dir.join(format!("pass-{pass:04}")).join(format!("bank-{b:04}"));
            let writers = PartitionWriters::create(&dir, plan.partitions, options.kmer_size)?;
            partition::partition_pass(*bank, &model, &repart, pass, plan.passes, &writers, dispatcher, cancel)?;
            bank_dirs.push(dir);
        }

        let pass_histograms: Mutex<Vec<Histogram>> = Mutex::new(Vec::new());
        dispatcher.dispatch_partitions(plan.partitions, cancel, |n| {
            let partition_files: Vec<PathBuf> = bank_dirs
                .iter()
                .map(|dir| partition::partition_file_path(dir, n))
                .collect();
            let counted = counter::count_partition(&partition_files, n, options.kmer_size, mode)?;

            let collection = solid_group.collection(&solid_collection_name(pass, n))?;
            let mut writer = SolidSetWriter::new(collection.as_ref());
            for (kmer, counts) in counted {
                if options.solidity.accepts(&counts) {
                    let abundance = SolidityFilter::aggregate(&counts);
                    writer.write(SolidRecord { kmer, abundance })?;
                }
            }
            let histogram = writer.finish()?;

            pass_histograms
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(histogram);
            progress.tick(1);
            listener.on_progress("counting", progress.snapshot());
            Ok(())
        })?;

        partial_histograms.extend(
            pass_histograms
                .into_inner()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let _ = std::fs::remove_dir_all(scratch_dir.join(format!("pass-{pass:04}")));
    }

    let histogram = solid::merge_histograms(partial_histograms);
    let histogram_collection = dsk.collection(layout::DSK_HISTOGRAM)?;
    histogram_collection.append(&crate::histogram::to_bytes(&histogram))?;
    histogram_collection.finalize()?;

    // Re-read the persisted solid set: C7/C8 are built from the final solid
    // k-mers, never by re-scanning the raw reads (spec §4.7).
    let mut solid_kmers = Vec::new();
    for pass in 0..plan.passes {
        for n in 0..plan.partitions {
            let collection = solid_group.collection(&solid_collection_name(pass, n))?;
            solid_kmers.extend(
                solid::read_solid_records(collection.as_ref())?
                    .into_iter()
                    .map(|r| r.kmer),
            );
        }
    }

    let bloom = if options.cache_coherent_bloom {
        BloomFilter::sized_for_cache_coherent(solid_kmers.len() as u64, options.bloom_fp_rate)
    } else {
        BloomFilter::sized_for(solid_kmers.len() as u64, options.bloom_fp_rate)
    };
    for kmer in &solid_kmers {
        bloom.insert(kmer.canonical().packed());
    }

    let debloom = root.subgroup(layout::DEBLOOM)?;
    let bloom_collection = debloom.collection(layout::DEBLOOM_BLOOM)?;
    bloom_collection.append(&bloom.to_bytes())?;
    bloom_collection.finalize()?;

    debloom.set_property(
        "candidate_scan",
        match options.candidate_scan {
            CfpCandidateScan::Basic => "basic",
            CfpCandidateScan::Minimizer => "minimizer",
        },
    )?;

    let cfp = match options.debloom {
        DebloomKind::None => {
            debloom.set_property("cfp_strategy", "none")?;
            Cfp::None
        }
        DebloomKind::Original => {
            let sorted = SortedCfp::build(&bloom, &solid_kmers, options.candidate_scan, Some(&repart));
            let cfp_collection = debloom.collection(layout::DEBLOOM_CFP)?;
            cfp_collection.append(&sorted.to_bytes())?;
            cfp_collection.finalize()?;
            debloom.set_property("cfp_strategy", "original")?;
            Cfp::Sorted(sorted)
        }
        DebloomKind::Cascading => {
            // The cascading levels' own Bloom filters are rebuildable from
            // the solid set and cFP strategy choice, so only the choice of
            // strategy is persisted here, not the levels themselves.
            debloom.set_property("cfp_strategy", "cascading")?;
            Cfp::Cascading(CascadingCfp::build(&bloom, &solid_kmers, options.candidate_scan, Some(&repart)))
        }
    };

    root.set_property(layout::COMPLETE_PROPERTY, "true")?;

    Ok(GraphArtifacts {
        oracle: GraphOracle::new(bloom, cfp, model),
        histogram,
        plan,
        repart,
    })
}

fn required_property(group: &dyn crate::storage::Group, key: &str) -> Result<String, GraphError> {
    group
        .property(key)?
        .ok_or_else(|| GraphError::Configuration(format!("storage is missing required property '{key}'; was it ever built?")))
}

fn parse_property<T: std::str::FromStr>(group: &dyn crate::storage::Group, key: &str) -> Result<T, GraphError> {
    required_property(group, key)?
        .parse()
        .map_err(|_| GraphError::Invariant(format!("storage property '{key}' is not a valid value")))
}

/// Reconstructs a [`GraphOracle`] and the rest of a build's artifacts from a
/// previously finished `storage` directory, without re-reading any input
/// bank (spec §6 "Graph artifact layout" is meant to be reopened by a later
/// process, e.g. `dbgh5 query`/`dbgh5 histogram`).
pub fn load(storage: &dyn Storage) -> Result<GraphArtifacts, GraphError> {
    let root = storage.root()?;
    if required_property(root.as_ref(), layout::COMPLETE_PROPERTY)? != "true" {
        return Err(GraphError::Configuration(
            "storage does not hold a completed build".into(),
        ));
    }

    let kmer_size: usize = parse_property(root.as_ref(), "kmer_size")?;
    let minimizer_size: usize = parse_property(root.as_ref(), "minimizer_size")?;
    let passes: u32 = parse_property(root.as_ref(), "passes")?;
    let partitions: u32 = parse_property(root.as_ref(), "partitions")?;
    let plan = Plan { passes, partitions };
    let model = KmerModel::new(kmer_size, minimizer_size);

    let minimizers = root.subgroup(layout::MINIMIZERS)?;
    let repart_bytes = minimizers
        .collection(layout::MINIMIZERS_REPART)?
        .read_all()?
        .into_iter()
        .next()
        .ok_or_else(|| GraphError::Invariant("repart table collection is empty".into()))?;
    let repart = match root.property("minimizer_type")?.as_deref() {
        Some("1") => {
            let rank_bytes = minimizers
                .collection(layout::MINIMIZERS_RANK)?
                .read_all()?
                .into_iter()
                .next()
                .ok_or_else(|| GraphError::Invariant("minimizer rank collection is empty".into()))?;
            let rank = RepartTable::rank_from_bytes(&rank_bytes);
            RepartTable::from_bytes(minimizer_size, &repart_bytes, MinimizerOrder::Frequency { rank })
        }
        _ => RepartTable::from_bytes_lexicographic(minimizer_size, &repart_bytes),
    };

    let dsk = root.subgroup(layout::DSK)?;
    let histogram_bytes = dsk
        .collection(layout::DSK_HISTOGRAM)?
        .read_all()?
        .into_iter()
        .next()
        .ok_or_else(|| GraphError::Invariant("histogram collection is empty".into()))?;
    let histogram = crate::histogram::from_bytes(&histogram_bytes)
        .ok_or_else(|| GraphError::Invariant("histogram collection is malformed".into()))?;

    let debloom = root.subgroup(layout::DEBLOOM)?;
    let bloom_bytes = debloom
        .collection(layout::DEBLOOM_BLOOM)?
        .read_all()?
        .into_iter()
        .next()
        .ok_or_else(|| GraphError::Invariant("bloom filter collection is empty".into()))?;
    let bloom = BloomFilter::from_bytes(&bloom_bytes)
        .ok_or_else(|| GraphError::Invariant("bloom filter collection is malformed".into()))?;

    let candidate_scan = match debloom.property("candidate_scan")?.as_deref() {
        Some("minimizer") => CfpCandidateScan::Minimizer,
        _ => CfpCandidateScan::Basic,
    };

    let cfp = match debloom.property("cfp_strategy")?.as_deref() {
        Some("none") => Cfp::None,
        Some("cascading") => {
            let solid_group = dsk.subgroup(layout::DSK_SOLID)?;
            let mut solid_kmers = Vec::new();
            for pass in 0..plan.passes {
                for n in 0..plan.partitions {
                    let collection = solid_group.collection(&solid_collection_name(pass, n))?;
                    solid_kmers.extend(
                        solid::read_solid_records(collection.as_ref())?
                            .into_iter()
                            .map(|r| r.kmer),
                    );
                }
            }
            Cfp::Cascading(CascadingCfp::build(&bloom, &solid_kmers, candidate_scan, Some(&repart)))
        }
        _ => {
            let cfp_bytes = debloom
                .collection(layout::DEBLOOM_CFP)?
                .read_all()?
                .into_iter()
                .next()
                .ok_or_else(|| GraphError::Invariant("cfp collection is empty".into()))?;
            let sorted = SortedCfp::from_bytes(&cfp_bytes)
                .ok_or_else(|| GraphError::Invariant("cfp collection is malformed".into()))?;
            Cfp::Sorted(sorted)
        }
    };

    Ok(GraphArtifacts {
        oracle: GraphOracle::new(bloom, cfp, model),
        histogram,
        plan,
        repart,
    })
}
