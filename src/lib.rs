//! A memory-bounded k-mer counter and Bloom/cFP De Bruijn graph oracle for
//! large DNA read sets.
//!
//! The pipeline (spec §3 "Lifecycle") runs in ten stages, each its own
//! module: [`config`] plans pass/partition counts, [`minimizer`] assigns
//! k-mers to partitions, [`partition`] streams reads into per-partition
//! super-k-mer files, [`counter`] expands and tallies each partition,
//! [`solidity`] decides which k-mers are solid, [`solid`] persists them and
//! the abundance histogram, [`bloom`] and [`cfp`] build the membership
//! structure, and [`oracle`] answers queries over it. [`progress`] supplies
//! the thread pool and cancellation earlier stages share, and [`pipeline`]
//! wires all of it together behind [`builder::GraphBuilder`].

pub mod bloom;
pub mod builder;
pub mod cfp;
pub mod cli;
pub mod config;
pub mod counter;
pub mod error;
pub mod hashutil;
pub mod histogram;
pub mod kmer;
pub mod minimizer;
#[cfg(feature = "mmap")]
pub mod mmap;
pub mod oracle;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod sequence;
pub mod solid;
pub mod solidity;
pub mod storage;

pub use builder::GraphBuilder;
pub use error::GraphError;
pub use oracle::GraphOracle;
