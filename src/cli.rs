//! Command-line interface definition for `dbgh5` (spec §6).

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::builder::BloomKind;
use crate::cfp::{CfpCandidateScan, DebloomKind};
use crate::solidity::SolidityKind;

/// Build, query, and inspect memory-bounded De Bruijn graphs.
#[derive(Parser, Debug)]
#[command(name = "dbgh5")]
#[command(version, author, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Runs the full pipeline over one or more input banks and writes the
    /// graph artifacts to a storage directory.
    Build(BuildArgs),
    /// Tests whether a k-mer is present in an already-built graph.
    Query(QueryArgs),
    /// Prints the abundance histogram of an already-built graph.
    Histogram(HistogramArgs),
}

/// Which Bloom false-positive candidate scan C8 uses. Mirrors
/// [`CfpCandidateScan`] as a CLI-facing `ValueEnum`, the way [`SolidityKind`]
/// already derives one directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum CandidateScanArg {
    Basic,
    Minimizer,
}

impl From<CandidateScanArg> for CfpCandidateScan {
    fn from(arg: CandidateScanArg) -> Self {
        match arg {
            CandidateScanArg::Basic => Self::Basic,
            CandidateScanArg::Minimizer => Self::Minimizer,
        }
    }
}

/// Mirrors [`DebloomKind`] as a CLI-facing `ValueEnum` for `-debloom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum DebloomArg {
    None,
    Original,
    Cascading,
}

impl From<DebloomArg> for DebloomKind {
    fn from(arg: DebloomArg) -> Self {
        match arg {
            DebloomArg::None => Self::None,
            DebloomArg::Original => Self::Original,
            DebloomArg::Cascading => Self::Cascading,
        }
    }
}

/// Mirrors [`BloomKind`] as a CLI-facing `ValueEnum` for `-bloom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum BloomArg {
    Basic,
    Cache,
    Neighbor,
}

impl From<BloomArg> for BloomKind {
    fn from(arg: BloomArg) -> Self {
        match arg {
            BloomArg::Basic => Self::Basic,
            BloomArg::Cache => Self::Cache,
            BloomArg::Neighbor => Self::Neighbor,
        }
    }
}

#[derive(Parser, Debug)]
pub struct BuildArgs {
    /// One or more input bank paths, each read with the `text-fasta` reader
    /// (spec §6 "a plain-file backend is permitted for testing"; real
    /// FASTA/FASTQ parsing is an external collaborator, see
    /// `sequence::SequenceSource`).
    #[arg(required = true)]
    pub banks: Vec<PathBuf>,

    /// Directory to write the graph artifacts into.
    #[arg(short, long)]
    pub storage: PathBuf,

    /// K-mer length (1-64).
    #[arg(short = 'k', long, default_value_t = 31)]
    pub k: usize,

    /// Minimizer width. Defaults to a value derived from `k` if omitted.
    #[arg(short = 'm', long = "minimizer-size")]
    pub minimizer_size: Option<usize>,

    /// Minimizer ordering scheme: `0`=lexicographic, `1`=frequency (spec §6
    /// `-minimizer-type`).
    #[arg(long = "minimizer-type", default_value_t = 0)]
    pub minimizer_type: u8,

    /// Per-partition memory budget, in megabytes.
    #[arg(long = "memory-cap-mb", default_value_t = 1_000)]
    pub memory_cap_mb: u64,

    /// Per-pass disk budget, in megabytes.
    #[arg(long = "disk-cap-mb", default_value_t = 20_000)]
    pub disk_cap_mb: u64,

    /// Maximum simultaneously open partition files.
    #[arg(long = "fd-cap", default_value_t = 256)]
    pub fd_cap: u32,

    /// Worker thread count.
    #[arg(short = 'j', long, default_value_t = 4)]
    pub cores: usize,

    /// How a k-mer's per-bank count vector is judged solid (spec §4.5).
    #[arg(long, value_enum, default_value = "sum")]
    pub solidity: SolidityKind,

    /// Inclusive abundance floor (spec §4.5).
    #[arg(long = "min-abundance", default_value_t = 2)]
    pub min_abundance: u32,

    /// Inclusive abundance ceiling (spec §4.5).
    #[arg(long = "max-abundance", default_value_t = u32::MAX)]
    pub max_abundance: u32,

    /// Target false-positive rate for the main Bloom filter.
    #[arg(long = "bloom-fp-rate", default_value_t = 0.01)]
    pub bloom_fp_rate: f64,

    /// Main Bloom filter layout (spec §4.7, §6 `-bloom`).
    #[arg(long = "bloom", value_enum, default_value = "neighbor")]
    pub bloom: BloomArg,

    /// How C8's candidate universe is generated (spec §6 `-debloom-impl`).
    #[arg(long = "debloom-impl", value_enum, default_value = "minimizer")]
    pub candidate_scan: CandidateScanArg,

    /// C8 cFP correction strategy (spec §4.8, §6 `-debloom`).
    #[arg(long = "debloom", value_enum, default_value = "cascading")]
    pub debloom: DebloomArg,

    /// Suppress progress output.
    #[arg(short, long)]
    pub quiet: bool,
}

#[derive(Parser, Debug)]
pub struct QueryArgs {
    /// Path to a graph's storage directory, as written by `build`.
    pub storage: PathBuf,

    /// K-mer sequence to query (e.g. ACGTACGT).
    pub kmer: String,
}

#[derive(Parser, Debug)]
pub struct HistogramArgs {
    /// Path to a graph's storage directory, as written by `build`.
    pub storage: PathBuf,
}
