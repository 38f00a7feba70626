//! Low-level file access and binary parsing utilities.
//!
//! Input containers are memory-mapped and parsed in place; nothing is copied
//! until the metadata reader materializes the mutable object graph. The
//! [`parser::Parser`] provides the positioned little-endian cursor used by the
//! container reader and the instruction decoder.

pub(crate) mod parser;

use std::path::Path;

use memmap2::Mmap;

use crate::{Error, Result};

/// A read-only, memory-mapped view of an on-disk module container.
///
/// The mapping stays valid for the lifetime of this value; the container
/// reader borrows the mapped bytes and never mutates them. Write-back goes
/// through a separate, freshly-encoded buffer.
pub struct MappedFile {
    data: Mmap,
}

impl MappedFile {
    /// Maps the file at `path` into memory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotFound`] if the path does not exist, [`Error::Empty`]
    /// for zero-length files, and [`Error::FileError`] for other I/O failures.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::NotFound(path.to_path_buf()));
        }

        let file = std::fs::File::open(path)?;
        // Safety: the weave session owns the file exclusively for load->write;
        // no other process mutates it while the mapping is alive.
        let data = unsafe { Mmap::map(&file)? };
        if data.is_empty() {
            return Err(Error::Empty);
        }

        Ok(MappedFile { data })
    }

    /// The mapped bytes.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}
