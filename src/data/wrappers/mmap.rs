//! Memory-mapped archive source.
//!
//! Maps an archive once and hands out the whole mapping as a byte slice, so
//! a loading session reads straight from the page cache.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{Mmap, MmapOptions};

use crate::error::IResult;

/// A read-only mapping of one archive on disk.
#[derive(Debug)]
pub struct MappedFile {
    path: PathBuf,
    mmap: Mmap,
}

impl MappedFile {
    pub fn open<P: AsRef<Path>>(path: P) -> IResult<Self> {
        let path = path.as_ref().to_owned();
        let file = File::open(&path)?;
        // The mapping is read-only; the archive is not expected to change underneath us.
        let mmap = unsafe { MmapOptions::new().map(&file) }?;
        Ok(Self { path, mmap })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mmap.is_empty()
    }
}

impl AsRef<[u8]> for MappedFile {
    fn as_ref(&self) -> &[u8] {
        &self.mmap
    }
}
