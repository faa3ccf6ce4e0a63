//! Split descriptors: one immutable byte range of one container.
//!
//! Descriptors are produced by [`planner::plan`](crate::planner::plan) and
//! consumed exactly once by the reader that owns them. Format-specific
//! carry-over state travels with the descriptor: the namespace snapshot and
//! record identity for aggregate XML, the header row for delimited text.

use crate::error::{LoadError, LoadResult};
use crate::namespace::NamespaceSnapshot;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Identity of the element that delimits records.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordElement {
    /// Local name, without prefix.
    pub name: String,
    /// Namespace URI; `None` matches any namespace.
    pub namespace: Option<String>,
}

impl RecordElement {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
        }
    }

    pub fn matches(&self, local: &str, namespace: Option<&str>) -> bool {
        self.name == local
            && match &self.namespace {
                Some(ns) => namespace == Some(ns.as_str()),
                None => true,
            }
    }
}

impl fmt::Display for RecordElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{{{ns}}}{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// An immutable byte range `[start, start + length)` within a container.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SplitDescriptor {
    pub path: String,
    pub start: u64,
    pub length: u64,
    /// Namespace bindings in scope at the first record of the split.
    pub namespaces: NamespaceSnapshot,
    /// Record identity, configured or discovered during the pre-scan.
    pub record_element: Option<RecordElement>,
    /// Offset of the first record start at or after `start`, when known.
    pub first_record: Option<u64>,
    /// Column names captured from the container's header row.
    pub header: Option<Arc<[String]>>,
}

impl SplitDescriptor {
    /// A split with no carry-over state. `length == 0` is rejected.
    pub fn new(path: impl Into<String>, start: u64, length: u64) -> LoadResult<Self> {
        let path = path.into();
        if length == 0 {
            return Err(LoadError::InvalidSplit {
                path,
                start,
                length,
                reason: "zero-length split".into(),
            });
        }
        Ok(Self {
            path,
            start,
            length,
            namespaces: NamespaceSnapshot::empty(),
            record_element: None,
            first_record: None,
            header: None,
        })
    }

    /// The whole container as one split.
    pub fn whole(path: impl Into<String>, len: u64) -> LoadResult<Self> {
        Self::new(path, 0, len)
    }

    #[must_use]
    pub fn with_namespaces(mut self, namespaces: NamespaceSnapshot) -> Self {
        self.namespaces = namespaces;
        self
    }

    #[must_use]
    pub fn with_record_element(mut self, record: Option<RecordElement>) -> Self {
        self.record_element = record;
        self
    }

    #[must_use]
    pub fn with_first_record(mut self, offset: Option<u64>) -> Self {
        self.first_record = offset;
        self
    }

    #[must_use]
    pub fn with_header(mut self, header: Option<Arc<[String]>>) -> Self {
        self.header = header;
        self
    }

    /// Exclusive end offset.
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.length)
    }

    /// Whether the split starts at the true beginning of its container.
    pub fn is_origin(&self) -> bool {
        self.start == 0
    }

    pub(crate) fn invalid(&self, reason: impl Into<String>) -> LoadError {
        LoadError::InvalidSplit {
            path: self.path.clone(),
            start: self.start,
            length: self.length,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for SplitDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}..{})", self.path, self.start, self.end())
    }
}

/// Partition `[0, total)` into contiguous ranges of at most `split_size` bytes.
///
/// Returns an empty vector for an empty container.
pub fn split_ranges(total: u64, split_size: u64) -> Vec<(u64, u64)> {
    if total == 0 {
        return Vec::new();
    }
    let size = split_size.max(1);
    let mut out = Vec::with_capacity(total.div_ceil(size) as usize);
    let mut start = 0;
    while start < total {
        let end = (start + size).min(total);
        out.push((start, end));
        start = end;
    }
    out
}
