//! The `SequenceSource` contract (spec §6): the only interface the core
//! depends on for reads. FASTA/FASTQ/BAM parsing itself is an external
//! collaborator and out of scope (spec §1) — this module defines the
//! contract, an in-memory test double, and a minimal stand-in reader used
//! only to give the `dbgh5` binary and the scenario tests something to run
//! against.

use bytes::Bytes;
use std::io;

/// One sequence record: an identifier, its bases, and optional quality
/// scores. `data` is ASCII over `{A,C,G,T,N,a,c,g,t,n}` (spec §6).
#[derive(Debug, Clone)]
pub struct Record {
    pub id: Bytes,
    pub data: Bytes,
    pub quality: Option<Bytes>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Estimate {
    pub num_sequences: u64,
    pub total_bases: u64,
    pub max_len: usize,
}

/// A finite, restartable, forward-only source of sequence records.
pub trait SequenceSource: Send + Sync {
    fn records(&self) -> Box<dyn Iterator<Item = io::Result<Record>> + '_>;
    fn estimate(&self) -> Estimate;
}

/// An in-memory `SequenceSource`, used throughout the test suite in place of
/// a real parser.
#[derive(Debug, Clone, Default)]
pub struct InMemorySequenceSource {
    records: Vec<Record>,
}

impl InMemorySequenceSource {
    #[must_use]
    pub fn new(records: Vec<Record>) -> Self {
        Self { records }
    }

    #[must_use]
    pub fn from_sequences(seqs: impl IntoIterator<Item = impl AsRef<[u8]>>) -> Self {
        let records = seqs
            .into_iter()
            .enumerate()
            .map(|(i, s)| Record {
                id: Bytes::from(format!("seq{i}")),
                data: Bytes::copy_from_slice(s.as_ref()),
                quality: None,
            })
            .collect();
        Self { records }
    }
}

impl SequenceSource for InMemorySequenceSource {
    fn records(&self) -> Box<dyn Iterator<Item = io::Result<Record>> + '_> {
        Box::new(self.records.iter().cloned().map(Ok))
    }

    fn estimate(&self) -> Estimate {
        let num_sequences = self.records.len() as u64;
        let total_bases: u64 = self.records.iter().map(|r| r.data.len() as u64).sum();
        let max_len = self.records.iter().map(|r| r.data.len()).max().unwrap_or(0);
        Estimate {
            num_sequences,
            total_bases,
            max_len,
        }
    }
}

/// A minimal single-line-per-record FASTA dialect: `>id` followed by exactly
/// one line of bases. This is **not** a conforming FASTA reader (no
/// multi-line wrapping, no FASTQ, no compression) — it exists only so the
/// `dbgh5` binary has something to run without depending on a full parser
/// crate, which spec §1 puts out of scope. Gated behind the `text-fasta`
/// feature so the default build carries no reader at all.
#[cfg(feature = "text-fasta")]
pub struct FastaTextSource {
    contents: Bytes,
}

#[cfg(feature = "text-fasta")]
impl FastaTextSource {
    pub fn from_path(path: &std::path::Path) -> io::Result<Self> {
        #[cfg(feature = "gzip")]
        if path.extension().is_some_and(|ext| ext == "gz") {
            use std::io::Read as _;
            let file = std::fs::File::open(path)?;
            let mut contents = Vec::new();
            flate2::read::GzDecoder::new(file).read_to_end(&mut contents)?;
            return Ok(Self {
                contents: Bytes::from(contents),
            });
        }

        #[cfg(feature = "mmap")]
        {
            let mapped = crate::mmap::MappedFile::open(path)?;
            return Ok(Self {
                contents: Bytes::copy_from_slice(mapped.as_bytes()),
            });
        }
        #[cfg(not(feature = "mmap"))]
        {
            let contents = std::fs::read(path)?;
            Ok(Self {
                contents: Bytes::from(contents),
            })
        }
    }

    #[must_use]
    pub fn from_bytes(contents: Bytes) -> Self {
        Self { contents }
    }

    fn parse(&self) -> Vec<Record> {
        let mut records = Vec::new();
        let mut lines = self.contents.split(|&b| b == b'\n');
        while let Some(header) = lines.next() {
            if header.is_empty() {
                continue;
            }
            if header[0] != b'>' {
                continue;
            }
            let id_start = self.offset_of(header) + 1;
            let id = self.contents.slice(id_start..id_start + header.len() - 1);
            if let Some(seq_line) = lines.next() {
                let seq_start = self.offset_of(seq_line);
                let data = self.contents.slice(seq_start..seq_start + seq_line.len());
                records.push(Record {
                    id,
                    data,
                    quality: None,
                });
            }
        }
        records
    }

    fn offset_of(&self, slice: &[u8]) -> usize {
        let base = self.contents.as_ptr() as usize;
        let ptr = slice.as_ptr() as usize;
        ptr.saturating_sub(base)
    }
}

#[cfg(feature = "text-fasta")]
impl SequenceSource for FastaTextSource {
    fn records(&self) -> Box<dyn Iterator<Item = io::Result<Record>> + '_> {
        Box::new(self.parse().into_iter().map(Ok))
    }

    fn estimate(&self) -> Estimate {
        let records = self.parse();
        let num_sequences = records.len() as u64;
        let total_bases: u64 = records.iter().map(|r| r.data.len() as u64).sum();
        let max_len = records.iter().map(|r| r.data.len()).max().unwrap_or(0);
        Estimate {
            num_sequences,
            total_bases,
            max_len,
        }
    }
}
