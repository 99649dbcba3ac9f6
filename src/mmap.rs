//! Memory-mapped file support, used by `sequence::FastaTextSource` to avoid
//! copying large inputs into a heap buffer before scanning them.
//!
//! # Safety
//!
//! Memory mapping relies on the underlying file not being modified while
//! the mapping is active. Modifying a mapped file leads to undefined
//! behavior.

use memmap2::Mmap;
use std::{fs::File, io, path::Path};

/// A read-only memory-mapped file.
pub struct MappedFile {
    mmap: Mmap,
}

impl MappedFile {
    /// Open and memory-map a file.
    ///
    /// # Safety
    ///
    /// The underlying file must not be modified while this mapping exists.
    #[allow(unsafe_code)]
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = File::open(path)?;
        // SAFETY: caller must not modify the file while the mapping is held,
        // per this type's documented contract.
        let mmap = unsafe { Mmap::map(&file)? };
        Ok(Self { mmap })
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.mmap
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}
