//! `dbgh5`: build, query, and inspect memory-bounded De Bruijn graphs from
//! the command line (spec §6).

use std::process::ExitCode;

use clap::Parser;
use colored::Colorize;

use dbgcore::builder::GraphBuilder;
use dbgcore::cli::{BuildArgs, Cli, Command, HistogramArgs, QueryArgs};
use dbgcore::error::GraphError;
use dbgcore::histogram::histogram_stats;
use dbgcore::kmer::Kmer;
use dbgcore::pipeline;
use dbgcore::storage::FileStorage;

/// Set `RUST_LOG=dbgcore=debug` to see debug output.
#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
}

fn main() -> ExitCode {
    #[cfg(feature = "tracing")]
    init_tracing();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Build(args) => run_build(&args),
        Command::Query(args) => run_query(&args),
        Command::Histogram(args) => run_histogram(&args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {err}", "error:".red().bold());
            ExitCode::from(u8::try_from(err.exit_code()).unwrap_or(1))
        }
    }
}

#[cfg(feature = "text-fasta")]
fn run_build(args: &BuildArgs) -> Result<(), GraphError> {
    use dbgcore::sequence::{FastaTextSource, SequenceSource};

    let sources: Vec<FastaTextSource> = args
        .banks
        .iter()
        .map(|path| FastaTextSource::from_path(path).map_err(GraphError::io))
        .collect::<Result<_, _>>()?;
    let banks: Vec<&dyn SequenceSource> = sources.iter().map(|s| s as &dyn SequenceSource).collect();

    let minimizer_order = match args.minimizer_type {
        0 => dbgcore::minimizer::MinimizerOrderKind::Lexicographic,
        1 => dbgcore::minimizer::MinimizerOrderKind::Frequency,
        other => {
            return Err(GraphError::Configuration(format!(
                "minimizer-type must be 0 (lexicographic) or 1 (frequency), got {other}"
            )))
        }
    };

    let mut builder = GraphBuilder::new()
        .k(args.k)?
        .memory_cap_bytes(args.memory_cap_mb.saturating_mul(1_000_000))
        .disk_cap_bytes(args.disk_cap_mb.saturating_mul(1_000_000))
        .fd_cap(args.fd_cap)
        .cores(args.cores)
        .solidity_kind(args.solidity)
        .min_abundance(args.min_abundance)
        .max_abundance(args.max_abundance)
        .bloom_fp_rate(args.bloom_fp_rate)
        .bloom_kind(args.bloom.into())
        .candidate_scan(args.candidate_scan.into())
        .debloom(args.debloom.into())
        .minimizer_order(minimizer_order);
    if let Some(m) = args.minimizer_size {
        builder = builder.minimizer_size(m);
    }

    let storage = FileStorage::open(&args.storage)?;
    let artifacts = builder.build(&banks, &storage)?;

    if !args.quiet {
        let stats = histogram_stats(&artifacts.histogram);
        eprintln!(
            "{} {} distinct solid k-mers, {} passes x {} partitions",
            "done:".green().bold(),
            stats.distinct_kmers,
            artifacts.plan.passes,
            artifacts.plan.partitions,
        );
    }
    Ok(())
}

#[cfg(not(feature = "text-fasta"))]
fn run_build(_args: &BuildArgs) -> Result<(), GraphError> {
    Err(GraphError::Configuration(
        "dbgh5 was built without the 'text-fasta' feature; rebuild with --features text-fasta to read input banks".into(),
    ))
}

fn run_query(args: &QueryArgs) -> Result<(), GraphError> {
    let storage = FileStorage::open(&args.storage)?;
    let artifacts = pipeline::load(&storage)?;
    let k = artifacts.oracle.kmer_model().k;

    let kmer = Kmer::from_bases(args.kmer.as_bytes(), k)
        .map_err(|e| GraphError::Configuration(format!("invalid k-mer '{}': {e}", args.kmer)))?;

    if artifacts.oracle.contains(&kmer) {
        println!("{}", "present".green().bold());
    } else {
        println!("{}", "absent".red().bold());
    }
    Ok(())
}

fn run_histogram(args: &HistogramArgs) -> Result<(), GraphError> {
    let storage = FileStorage::open(&args.storage)?;
    let artifacts = pipeline::load(&storage)?;
    let stats = histogram_stats(&artifacts.histogram);

    println!("abundance\tdistinct_kmers");
    for (abundance, frequency) in &artifacts.histogram {
        println!("{abundance}\t{frequency}");
    }
    eprintln!(
        "{} {} distinct k-mers, {} total occurrences, mean abundance {:.2}",
        "summary:".blue().bold(),
        stats.distinct_kmers,
        stats.total_kmers,
        stats.mean_count,
    );
    Ok(())
}
