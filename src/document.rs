//! The document model handed to downstream writers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Where a record came from. Used for diagnostics only.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    /// Logical path of the container.
    pub path: String,
    /// Zip entry name, when the record came from inside an archive.
    pub entry: Option<String>,
    /// 1-based line number (line-oriented formats).
    pub line: Option<u64>,
    /// 1-based column number.
    pub column: Option<u64>,
    /// Byte offset within the container, or within the decoded entry.
    pub offset: Option<u64>,
}

impl SourceLocation {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    #[must_use]
    pub fn with_entry(mut self, entry: Option<String>) -> Self {
        self.entry = entry;
        self
    }

    #[must_use]
    pub fn at_offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn at_line(mut self, line: u64) -> Self {
        self.line = Some(line);
        self
    }

    #[must_use]
    pub fn at_column(mut self, column: u64) -> Self {
        self.column = Some(column);
        self
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(entry) = &self.entry {
            write!(f, "!{entry}")?;
        }
        match (self.line, self.column) {
            (Some(line), Some(col)) => write!(f, ":{line}:{col}")?,
            (Some(line), None) => write!(f, ":{line}")?,
            _ => {}
        }
        if let Some(offset) = self.offset {
            write!(f, " @{offset}")?;
        }
        Ok(())
    }
}

/// Kind of document content, used to decide between text and byte payloads.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentType {
    Xml,
    Json,
    Text,
    Binary,
}

impl DocumentType {
    pub fn is_text(self) -> bool {
        !matches!(self, DocumentType::Binary)
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Some(Self::Xml),
            "json" => Some(Self::Json),
            "text" | "txt" => Some(Self::Text),
            "binary" => Some(Self::Binary),
            _ => None,
        }
    }
}

/// Record payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Content {
    Text(String),
    Binary(Vec<u8>),
}

impl Content {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Content::Text(s) => Some(s),
            Content::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Content::Text(s) => s.as_bytes(),
            Content::Binary(b) => b,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Text when `kind` is textual and the bytes are valid UTF-8, bytes otherwise.
    pub fn from_bytes(bytes: Vec<u8>, kind: DocumentType) -> Self {
        if !kind.is_text() {
            return Content::Binary(bytes);
        }
        match String::from_utf8(bytes) {
            Ok(s) => Content::Text(s),
            Err(e) => Content::Binary(e.into_bytes()),
        }
    }
}

/// One permission grant from an archive sidecar.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub role: String,
    pub capability: String,
}

/// Metadata attached to a record: archive sidecars and RDF graph collections.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub format: Option<DocumentType>,
    pub collections: Vec<String>,
    pub permissions: Vec<Permission>,
    pub quality: i32,
    /// Serialized properties fragment, if any.
    pub properties: Option<String>,
    pub values: BTreeMap<String, String>,
    /// Metadata-only record: there is no content entry.
    pub naked: bool,
}

/// The unit handed to downstream collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DocumentRecord {
    pub id: String,
    pub content: Content,
    pub location: SourceLocation,
    pub metadata: Option<DocumentMetadata>,
    /// The identifier was empty or could not be resolved; count it and move on.
    pub skip: bool,
}

impl DocumentRecord {
    pub fn new(id: impl Into<String>, content: Content, location: SourceLocation) -> Self {
        Self {
            id: id.into(),
            content,
            location,
            metadata: None,
            skip: false,
        }
    }

    /// A record the caller must count as skipped rather than write.
    pub fn skipped(id: impl Into<String>, content: Content, location: SourceLocation) -> Self {
        Self {
            skip: true,
            ..Self::new(id, content, location)
        }
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn text(&self) -> Option<&str> {
        self.content.as_text()
    }
}
