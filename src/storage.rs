//! The storage backend contract (spec §6) and a plain-file implementation
//! permitted for testing. Reduces the upstream's `Bag<T>`/`Iterable<T>`/
//! `Collection<T>` hierarchy to two capabilities (spec §9 DESIGN NOTES
//! "Polymorphic container hierarchy"): a `Sink` (append, flush/finalize) and
//! an `Iterable` (forward read of whatever was appended).
//!
//! `FileStorage` lays a `Group` out as a directory, a `Collection` as a
//! length-prefixed binary file with a CRC32 trailer, and a group's
//! properties as a `properties.json` sidecar — directly grounded on
//! `index.rs`'s `KMIX` binary format and hand-rolled CRC32.

use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Read, Write};
use std::path::PathBuf;
use std::sync::Mutex;

use crate::error::GraphError;

/// A hierarchical grouped key-value blob store (spec §6 "Storage backend
/// contract").
pub trait Storage: Send + Sync {
    fn root(&self) -> Result<Box<dyn Group>, GraphError>;
}

pub trait Group: Send + Sync {
    fn subgroup(&self, name: &str) -> Result<Box<dyn Group>, GraphError>;
    fn collection(&self, name: &str) -> Result<Box<dyn Collection>, GraphError>;
    fn set_property(&self, key: &str, value: &str) -> Result<(), GraphError>;
    fn property(&self, key: &str) -> Result<Option<String>, GraphError>;
}

/// An append-only typed byte stream. Callers own their record framing;
/// `append` takes one already-encoded record.
pub trait Collection: Send + Sync {
    fn append(&self, record: &[u8]) -> Result<(), GraphError>;
    /// Flush and write the trailing checksum. Must be called once all
    /// writers for this collection are done.
    fn finalize(&self) -> Result<(), GraphError>;
    fn read_all(&self) -> Result<Vec<Vec<u8>>, GraphError>;
}

const MAGIC: &[u8; 4] = b"DBGC";
const CRC32_TABLE: [u32; 256] = build_crc32_table();

const fn build_crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut c = i as u32;
        let mut j = 0;
        while j < 8 {
            c = if c & 1 != 0 {
                0xEDB8_8320 ^ (c >> 1)
            } else {
                c >> 1
            };
            j += 1;
        }
        table[i] = c;
        i += 1;
    }
    table
}

fn crc32(bytes: &[u8]) -> u32 {
    let mut crc = 0xFFFF_FFFFu32;
    for &b in bytes {
        let idx = ((crc ^ u32::from(b)) & 0xFF) as usize;
        crc = CRC32_TABLE[idx] ^ (crc >> 8);
    }
    !crc
}

/// A directory-backed `Group`.
pub struct FileGroup {
    dir: PathBuf,
}

impl FileGroup {
    fn new(dir: PathBuf) -> Result<Self, GraphError> {
        fs::create_dir_all(&dir).map_err(|e| {
            let _ = &e;
            GraphError::unwritable_path(&dir)
        })?;
        Ok(Self { dir })
    }

    fn properties_path(&self) -> PathBuf {
        self.dir.join("properties.json")
    }

    fn load_properties(&self) -> Result<BTreeMap<String, String>, GraphError> {
        let path = self.properties_path();
        if !path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&path).map_err(GraphError::io)?;
        Ok(serde_json::from_str(&contents)?)
    }
}

impl Group for FileGroup {
    fn subgroup(&self, name: &str) -> Result<Box<dyn Group>, GraphError> {
        Ok(Box::new(FileGroup::new(self.dir.join(name))?))
    }

    fn collection(&self, name: &str) -> Result<Box<dyn Collection>, GraphError> {
        FileCollection::open(self.dir.join(format!("{name}.col"))).map(|c| Box::new(c) as Box<dyn Collection>)
    }

    fn set_property(&self, key: &str, value: &str) -> Result<(), GraphError> {
        let mut props = self.load_properties()?;
        props.insert(key.to_string(), value.to_string());
        let serialized = serde_json::to_string_pretty(&props)?;
        fs::write(self.properties_path(), serialized).map_err(GraphError::io)
    }

    fn property(&self, key: &str) -> Result<Option<String>, GraphError> {
        Ok(self.load_properties()?.get(key).cloned())
    }
}

/// A length-prefixed (`u32` LE) record stream with a `DBGC` magic header and
/// a trailing CRC32 over every record's bytes, mirroring `index.rs`'s
/// `KMIX`-format save/load.
pub struct FileCollection {
    path: PathBuf,
    writer: Mutex<BufWriter<File>>,
    running_crc: Mutex<RunningCrc>,
}

struct RunningCrc {
    crc: u32,
}

impl RunningCrc {
    fn new() -> Self {
        Self { crc: 0xFFFF_FFFF }
    }

    fn update(&mut self, bytes: &[u8]) {
        for &b in bytes {
            let idx = ((self.crc ^ u32::from(b)) & 0xFF) as usize;
            self.crc = CRC32_TABLE[idx] ^ (self.crc >> 8);
        }
    }

    fn finish(&self) -> u32 {
        !self.crc
    }
}

impl FileCollection {
    fn open(path: PathBuf) -> Result<Self, GraphError> {
        let is_new = !path.exists();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(GraphError::io)?;
        if is_new {
            file.write_all(MAGIC).map_err(GraphError::io)?;
        }
        Ok(Self {
            path,
            writer: Mutex::new(BufWriter::new(file)),
            running_crc: Mutex::new(RunningCrc::new()),
        })
    }
}

impl Collection for FileCollection {
    fn append(&self, record: &[u8]) -> Result<(), GraphError> {
        let len = u32::try_from(record.len())
            .map_err(|_| GraphError::Invariant("record too large to frame".into()))?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| GraphError::Invariant("collection writer mutex poisoned".into()))?;
        writer.write_all(&len.to_le_bytes()).map_err(GraphError::io)?;
        writer.write_all(record).map_err(GraphError::io)?;

        let mut crc = self
            .running_crc
            .lock()
            .map_err(|_| GraphError::Invariant("collection crc mutex poisoned".into()))?;
        crc.update(&len.to_le_bytes());
        crc.update(record);
        Ok(())
    }

    fn finalize(&self) -> Result<(), GraphError> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| GraphError::Invariant("collection writer mutex poisoned".into()))?;
        let crc = self
            .running_crc
            .lock()
            .map_err(|_| GraphError::Invariant("collection crc mutex poisoned".into()))?
            .finish();
        writer.write_all(&crc.to_le_bytes()).map_err(GraphError::io)?;
        writer.flush().map_err(GraphError::io)
    }

    fn read_all(&self) -> Result<Vec<Vec<u8>>, GraphError> {
        let mut contents = Vec::new();
        File::open(&self.path)
            .map_err(GraphError::io)?
            .read_to_end(&mut contents)
            .map_err(GraphError::io)?;

        if contents.len() < MAGIC.len() + 4 {
            return Err(GraphError::Invariant(format!(
                "collection file {} too short to contain header+trailer",
                self.path.display()
            )));
        }
        if &contents[..MAGIC.len()] != MAGIC {
            return Err(GraphError::Invariant(format!(
                "collection file {} has bad magic",
                self.path.display()
            )));
        }

        let body = &contents[MAGIC.len()..contents.len() - 4];
        let stored_crc = u32::from_le_bytes(contents[contents.len() - 4..].try_into().unwrap());

        let mut records = Vec::new();
        let mut pos = 0usize;
        let mut check = RunningCrc::new();
        while pos < body.len() {
            if pos + 4 > body.len() {
                return Err(GraphError::Invariant("truncated record length".into()));
            }
            let len = u32::from_le_bytes(body[pos..pos + 4].try_into().unwrap()) as usize;
            check.update(&body[pos..pos + 4]);
            pos += 4;
            if pos + len > body.len() {
                return Err(GraphError::Invariant("truncated record body".into()));
            }
            check.update(&body[pos..pos + len]);
            records.push(body[pos..pos + len].to_vec());
            pos += len;
        }

        if check.finish() != stored_crc {
            return Err(GraphError::Invariant(format!(
                "CRC32 mismatch reading {}: corrupt collection",
                self.path.display()
            )));
        }

        Ok(records)
    }
}

/// A directory-tree-backed `Storage` implementation, used for the `dbgh5`
/// binary and all tests (spec §6 "a plain-file backend is permitted for
/// testing").
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, GraphError> {
        let root = root.into();
        fs::create_dir_all(&root).map_err(|_| GraphError::unwritable_path(&root))?;
        Ok(Self { root })
    }
}

impl Storage for FileStorage {
    fn root(&self) -> Result<Box<dyn Group>, GraphError> {
        Ok(Box::new(FileGroup::new(self.root.clone())?))
    }
}

/// The graph artifact layout (spec §6 "Graph artifact layout").
pub mod layout {
    pub const INFO: &str = "info";
    pub const DSK: &str = "dsk";
    pub const DSK_SOLID: &str = "solid";
    pub const DSK_HISTOGRAM: &str = "histogram";
    pub const DEBLOOM: &str = "debloom";
    pub const DEBLOOM_BLOOM: &str = "bloom";
    pub const DEBLOOM_CFP: &str = "cfp";
    pub const DEBLOOM_CFP_CASCADE: &str = "cfp_cascade";
    pub const MINIMIZERS: &str = "minimizers";
    pub const MINIMIZERS_REPART: &str = "repart";
    pub const MINIMIZERS_RANK: &str = "rank";
    pub const COMPLETE_PROPERTY: &str = "complete";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collection_roundtrips_records() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let root = storage.root().unwrap();
        let collection = root.collection("test").unwrap();
        collection.append(b"hello").unwrap();
        collection.append(b"world").unwrap();
        collection.finalize().unwrap();

        let records = collection.read_all().unwrap();
        assert_eq!(records, vec![b"hello".to_vec(), b"world".to_vec()]);
    }

    #[test]
    fn corrupted_collection_fails_crc_check() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let root = storage.root().unwrap();
        let collection = root.collection("test").unwrap();
        collection.append(b"hello").unwrap();
        collection.finalize().unwrap();
        drop(collection);

        let path = dir.path().join("test.col");
        let mut bytes = fs::read(&path).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0xFF;
        fs::write(&path, bytes).unwrap();

        let reopened = FileCollection::open(path).unwrap();
        assert!(reopened.read_all().is_err());
    }

    #[test]
    fn properties_roundtrip_through_json_sidecar() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let root = storage.root().unwrap();
        root.set_property("kmer_size", "31").unwrap();
        assert_eq!(root.property("kmer_size").unwrap(), Some("31".to_string()));
        assert_eq!(root.property("missing").unwrap(), None);
    }

    #[test]
    fn subgroups_nest_as_directories() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::open(dir.path()).unwrap();
        let root = storage.root().unwrap();
        let dsk = root.subgroup(layout::DSK).unwrap();
        dsk.set_property("k", "v").unwrap();
        assert!(dir.path().join(layout::DSK).is_dir());
    }

    #[test]
    fn crc32_matches_known_vector() {
        assert_eq!(crc32(b"123456789"), 0xCBF4_3926);
    }
}
