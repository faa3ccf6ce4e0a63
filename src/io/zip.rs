//! Zip entry cursor.
//!
//! Entries come out in physical archive order. Directory entries and entries
//! whose uncompressed size is zero never surface. Each surviving entry is
//! decompressed fully into memory before it is returned.

use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use std::io::{Read, Seek};
use ::zip::ZipArchive;

/// One qualifying entry, fully decompressed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Cursor over the qualifying entries of one archive.
pub struct ZipEntries<R: Read + Seek> {
    path: String,
    archive: ZipArchive<R>,
    next: usize,
}

impl<R: Read + Seek> ZipEntries<R> {
    pub fn new(path: &str, reader: R) -> LoadResult<Self> {
        let archive = ZipArchive::new(reader).map_err(|source| LoadError::Zip {
            location: SourceLocation::new(path),
            source,
        })?;
        tracing::trace!(path, entries = archive.len(), "opened zip container");
        Ok(Self {
            path: path.to_string(),
            archive,
            next: 0,
        })
    }

    /// Total entries in the central directory, skipped ones included.
    pub fn total(&self) -> usize {
        self.archive.len()
    }

    pub fn next_entry(&mut self) -> LoadResult<Option<ZipEntry>> {
        while self.next < self.archive.len() {
            let index = self.next;
            self.next += 1;
            let mut file = self.archive.by_index(index).map_err(|source| LoadError::Zip {
                location: SourceLocation::new(self.path.clone()),
                source,
            })?;
            if file.is_dir() || file.size() == 0 {
                tracing::trace!(entry = file.name(), "skipping directory or empty zip entry");
                continue;
            }
            let name = file.name().to_string();
            let mut bytes = Vec::with_capacity(file.size() as usize);
            file.read_to_end(&mut bytes).map_err(|e| {
                LoadError::io(
                    SourceLocation::new(self.path.clone()).with_entry(Some(name.clone())),
                    e,
                )
            })?;
            return Ok(Some(ZipEntry { name, bytes }));
        }
        Ok(None)
    }

    /// Entries consumed over total entries.
    pub fn progress(&self) -> f32 {
        match self.archive.len() {
            0 => 1.0,
            n => self.next as f32 / n as f32,
        }
    }
}
