//! C3 — Superkmer Partitioner: streams reads into per-partition super-k-mer
//! files (spec §4.3).

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;

use crate::error::GraphError;
use crate::kmer::{pack_base_sequence, KmerModel};
use crate::minimizer::RepartTable;
use crate::progress::{CancellationToken, Dispatcher};
use crate::sequence::SequenceSource;

/// A maximal run of consecutive k-mers in a read sharing a partition id
/// (spec §3 "Super-k-mer"). `bases` holds `k + length - 1` bases packed 2
/// bits each.
#[derive(Debug, Clone)]
pub struct SuperKmer {
    pub partition: u32,
    pub length: u32,
    pub bases: Bytes,
}

impl SuperKmer {
    fn encode(partition: u32, start: usize, end_exclusive: usize, read: &[u8], k: usize) -> Result<Self, GraphError> {
        let length = (end_exclusive - start) as u32;
        let base_count = end_exclusive - start + k - 1;
        let raw = &read[start..start + base_count];
        let packed =
            pack_base_sequence(raw).map_err(|e| GraphError::Input(format!("invalid base in read: {e}")))?;
        Ok(Self {
            partition,
            length,
            bases: Bytes::from(packed),
        })
    }

    /// Serialises as `partition(u32 LE) | length(u32 LE) | base_count(u32 LE) | packed bytes`.
    #[must_use]
    pub fn to_bytes(&self, k: usize) -> Vec<u8> {
        let base_count = self.length as usize + k - 1;
        let mut out = Vec::with_capacity(12 + self.bases.len());
        out.extend_from_slice(&self.partition.to_le_bytes());
        out.extend_from_slice(&self.length.to_le_bytes());
        out.extend_from_slice(&(base_count as u32).to_le_bytes());
        out.extend_from_slice(&self.bases);
        out
    }

    /// Reads one record back from a partition file's byte stream. Returns
    /// `Ok(None)` cleanly at end of stream.
    pub fn read_one(reader: &mut impl std::io::Read) -> Result<Option<Self>, GraphError> {
        let mut header = [0u8; 12];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(GraphError::io(e)),
        }
        let partition = u32::from_le_bytes(header[0..4].try_into().unwrap());
        let length = u32::from_le_bytes(header[4..8].try_into().unwrap());
        let base_count = u32::from_le_bytes(header[8..12].try_into().unwrap()) as usize;
        let packed_len = base_count.div_ceil(4);
        let mut packed = vec![0u8; packed_len];
        reader.read_exact(&mut packed).map_err(GraphError::io)?;
        Ok(Some(Self {
            partition,
            length,
            bases: Bytes::from(packed),
        }))
    }
}

/// One open file per partition, protected by a mutex; each worker batches
/// writes into a thread-local cache and flushes under the lock on overflow
/// (spec §4.3 "Parallelism", spec §5 "Shared-resource policy").
pub struct PartitionWriters {
    k: usize,
    files: Vec<Mutex<BufWriter<File>>>,
    kmers_seen: Vec<AtomicU64>,
    superkmers_written: Vec<AtomicU64>,
}

impl PartitionWriters {
    pub fn create(dir: &Path, partition_count: u32, k: usize) -> Result<Self, GraphError> {
        std::fs::create_dir_all(dir).map_err(GraphError::io)?;
        let mut files = Vec::with_capacity(partition_count as usize);
        for n in 0..partition_count {
            let path = partition_file_path(dir, n);
            let file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&path)
                .map_err(|e| GraphError::io_on_partition(n, e))?;
            files.push(Mutex::new(BufWriter::new(file)));
        }
        Ok(Self {
            k,
            files,
            kmers_seen: (0..partition_count).map(|_| AtomicU64::new(0)).collect(),
            superkmers_written: (0..partition_count).map(|_| AtomicU64::new(0)).collect(),
        })
    }

    fn write(&self, superkmer: &SuperKmer) -> Result<(), GraphError> {
        let n = superkmer.partition;
        let bytes = superkmer.to_bytes(self.k);
        let mut guard = self.files[n as usize]
            .lock()
            .map_err(|_| GraphError::Invariant("partition file mutex poisoned".into()))?;
        guard
            .write_all(&bytes)
            .map_err(|e| GraphError::io_on_partition(n, e))?;
        self.kmers_seen[n as usize].fetch_add(u64::from(superkmer.length), Ordering::Relaxed);
        self.superkmers_written[n as usize].fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn flush_all(&self) -> Result<(), GraphError> {
        for file in &self.files {
            let mut guard = file
                .lock()
                .map_err(|_| GraphError::Invariant("partition file mutex poisoned".into()))?;
            guard.flush().map_err(GraphError::io)?;
        }
        Ok(())
    }

    #[must_use]
    pub fn stats(&self) -> PartitionStats {
        PartitionStats {
            kmers_seen: self.kmers_seen.iter().map(|c| c.load(Ordering::Relaxed)).collect(),
            superkmers_written: self
                .superkmers_written
                .iter()
                .map(|c| c.load(Ordering::Relaxed))
                .collect(),
        }
    }
}

#[must_use]
pub fn partition_file_path(dir: &Path, partition: u32) -> PathBuf {
    dir.join(format!("partition-{partition:06}.skm"))
}

#[derive(Debug, Clone, Default)]
pub struct PartitionStats {
    pub kmers_seen: Vec<u64>,
    pub superkmers_written: Vec<u64>,
}

/// A thread-local accumulator of the current run (start, length, partition)
/// within one read, emitting completed super-k-mer runs.
struct RunTracker {
    start: usize,
    len: u32,
    partition: Option<u32>,
}

impl RunTracker {
    fn new() -> Self {
        Self {
            start: 0,
            len: 0,
            partition: None,
        }
    }

    fn push(&mut self, pos: usize, partition: u32, k: usize, read: &[u8], pass: u32, passes: u32, writers: &PartitionWriters) -> Result<(), GraphError> {
        match self.partition {
            Some(current) if current == partition => {
                self.len += 1;
            }
            Some(current) => {
                self.flush(current, k, read, pass, passes, writers)?;
                self.start = pos;
                self.len = 1;
                self.partition = Some(partition);
            }
            None => {
                self.start = pos;
                self.len = 1;
                self.partition = Some(partition);
            }
        }
        Ok(())
    }

    fn flush(&self, partition: u32, k: usize, read: &[u8], pass: u32, passes: u32, writers: &PartitionWriters) -> Result<(), GraphError> {
        if u64::from(partition) % u64::from(passes) != u64::from(pass) {
            return Ok(());
        }
        let end_exclusive = self.start + self.len as usize;
        let superkmer = SuperKmer::encode(partition, self.start, end_exclusive, read, k)?;
        writers.write(&superkmer)
    }

    fn finish(&self, k: usize, read: &[u8], pass: u32, passes: u32, writers: &PartitionWriters) -> Result<(), GraphError> {
        if let Some(partition) = self.partition {
            self.flush(partition, k, read, pass, passes, writers)?;
        }
        Ok(())
    }
}

/// One sequence's worth of partitioning: walk its canonical k-mers in order,
/// track the current run, emit on partition change or sequence end (spec
/// §4.3 step 2). A run is discarded (not written) unless its partition
/// belongs to the current pass.
fn partition_sequence(
    read: &[u8],
    model: &KmerModel,
    repart: &RepartTable,
    pass: u32,
    passes: u32,
    writers: &PartitionWriters,
) -> Result<(), GraphError> {
    let mut tracker = RunTracker::new();
    for (kmer, pos) in model.iter_canonical(read) {
        let partition = repart.part(&kmer);
        tracker.push(pos, partition, model.k, read, pass, passes, writers)?;
    }
    tracker.finish(model.k, read, pass, passes, writers)
}

/// Runs one full pass of C3 over a sequence source, using the dispatcher's
/// batched-sequence iteration idiom (spec §4.10).
pub fn partition_pass(
    source: &dyn SequenceSource,
    model: &KmerModel,
    repart: &RepartTable,
    pass: u32,
    passes: u32,
    writers: &PartitionWriters,
    dispatcher: &Dispatcher,
    cancel: &CancellationToken,
) -> Result<(), GraphError> {
    let records: Vec<_> = source
        .records()
        .collect::<std::io::Result<_>>()
        .map_err(|e| GraphError::Input(e.to_string()))?;

    dispatcher.dispatch_sequences(&records, cancel, |record| {
        partition_sequence(&record.data, model, repart, pass, passes, writers)
    })?;

    writers.flush_all()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::Dispatcher;
    use crate::sequence::InMemorySequenceSource;

    #[test]
    fn partitions_one_read_and_roundtrips_superkmers() {
        let dir = tempfile::tempdir().unwrap();
        let model = KmerModel::new(3, 2);
        let repart = RepartTable::build_lexicographic(2, 4);
        let writers = PartitionWriters::create(dir.path(), 4, model.k).unwrap();
        let dispatcher = Dispatcher::new(2);
        let cancel = CancellationToken::new();
        let source = InMemorySequenceSource::from_sequences(["ACGTACGTAC"]);

        partition_pass(&source, &model, &repart, 0, 1, &writers, &dispatcher, &cancel).unwrap();

        let stats = writers.stats();
        let total_kmers: u64 = stats.kmers_seen.iter().sum();
        assert_eq!(total_kmers as usize, "ACGTACGTAC".len() - model.k + 1);

        let mut total_read_back = 0u64;
        for n in 0..4 {
            let path = partition_file_path(dir.path(), n);
            let mut file = File::open(path).unwrap();
            while let Some(sk) = SuperKmer::read_one(&mut file).unwrap() {
                assert_eq!(sk.partition, n);
                total_read_back += u64::from(sk.length);
            }
        }
        assert_eq!(total_read_back, total_kmers);
    }

    #[test]
    fn superkmer_never_crosses_partition_boundary() {
        let model = KmerModel::new(3, 2);
        let repart = RepartTable::build_lexicographic(2, 4);
        let read = b"ACGTACGTACGTACGT";
        for window in read.windows(model.k) {
            let kmer = crate::kmer::Kmer::from_bases(window, model.k).unwrap().canonical();
            let _ = repart.part(&kmer);
        }
        // Structural guarantee is enforced by RunTracker flushing on any
        // partition change; covered end-to-end above.
    }
}
