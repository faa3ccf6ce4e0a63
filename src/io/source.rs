//! Where container bytes come from.
//!
//! Readers never touch the filesystem directly: they ask a [`ContainerSource`]
//! for a seekable stream. [`LocalFs`] serves real files; [`MemorySource`]
//! serves byte buffers registered under logical paths, which is what tests and
//! embedding callers use.

use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Cursor, Read, Seek, SeekFrom};
use std::path::Path;
use std::sync::{Arc, RwLock};

/// Readable and seekable byte stream that can move to a worker thread.
pub trait ReadSeek: Read + Seek + Send {}

impl<T: Read + Seek + Send> ReadSeek for T {}

/// A namespace of containers addressed by logical path.
pub trait ContainerSource: Send + Sync {
    /// Size of the container in bytes.
    fn len(&self, path: &str) -> LoadResult<u64>;

    /// Open the container at byte 0.
    fn open(&self, path: &str) -> LoadResult<Box<dyn ReadSeek>>;

    /// Open the container positioned at `offset`.
    fn open_at(&self, path: &str, offset: u64) -> LoadResult<Box<dyn ReadSeek>> {
        let mut stream = self.open(path)?;
        if offset > 0 {
            stream
                .seek(SeekFrom::Start(offset))
                .map_err(|e| LoadError::io(SourceLocation::new(path).at_offset(offset), e))?;
        }
        Ok(stream)
    }

    /// Read the whole container into memory.
    fn read_all(&self, path: &str) -> LoadResult<Vec<u8>> {
        let mut stream = self.open(path)?;
        let mut buf = Vec::new();
        stream
            .read_to_end(&mut buf)
            .map_err(|e| LoadError::io(SourceLocation::new(path), e))?;
        Ok(buf)
    }
}

/// Plain files; logical paths are filesystem paths.
#[derive(Clone, Copy, Debug, Default)]
pub struct LocalFs;

impl ContainerSource for LocalFs {
    fn len(&self, path: &str) -> LoadResult<u64> {
        std::fs::metadata(Path::new(path))
            .map(|m| m.len())
            .map_err(|e| LoadError::io(SourceLocation::new(path), e))
    }

    fn open(&self, path: &str) -> LoadResult<Box<dyn ReadSeek>> {
        let file = File::open(path).map_err(|e| LoadError::io(SourceLocation::new(path), e))?;
        Ok(Box::new(file))
    }
}

/// In-memory containers keyed by logical path.
#[derive(Clone, Debug, Default)]
pub struct MemorySource {
    files: Arc<RwLock<BTreeMap<String, Arc<[u8]>>>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a container.
    pub fn insert(&self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) {
        let bytes: Arc<[u8]> = Arc::from(bytes.into());
        if let Ok(mut files) = self.files.write() {
            files.insert(path.into(), bytes);
        }
    }

    #[must_use]
    pub fn with(self, path: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.insert(path, bytes);
        self
    }

    /// Registered paths, sorted.
    pub fn paths(&self) -> Vec<String> {
        self.files
            .read()
            .map(|files| files.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn get(&self, path: &str) -> LoadResult<Arc<[u8]>> {
        let files = self.files.read().map_err(|_| {
            LoadError::io(
                SourceLocation::new(path),
                std::io::Error::other("memory source lock poisoned"),
            )
        })?;
        files.get(path).cloned().ok_or_else(|| {
            LoadError::io(
                SourceLocation::new(path),
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such container"),
            )
        })
    }
}

impl ContainerSource for MemorySource {
    fn len(&self, path: &str) -> LoadResult<u64> {
        Ok(self.get(path)?.len() as u64)
    }

    fn open(&self, path: &str) -> LoadResult<Box<dyn ReadSeek>> {
        Ok(Box::new(Cursor::new(self.get(path)?)))
    }
}
