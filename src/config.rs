//! Fully resolved reader configuration.
//!
//! The command-line layer that produces this value lives elsewhere; readers
//! only ever see a validated [`ReaderConfig`], passed explicitly to their
//! constructors. Nothing in this crate keeps configuration in global state.
//!
//! ```
//! use ironload::config::{IdSource, InputFormat, ReaderConfig};
//!
//! let cfg = ReaderConfig::from_json_str(r#"{
//!     "format": "aggregates",
//!     "record_element": "person",
//!     "id_source": { "attribute": "id" }
//! }"#).unwrap();
//! assert_eq!(cfg.format, InputFormat::Aggregates);
//! assert_eq!(cfg.id_source, IdSource::Attribute("id".into()));
//! ```

use crate::document::DocumentType;
use crate::error::{LoadError, LoadResult};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Default nominal split size (64 MiB).
pub const DEFAULT_SPLIT_SIZE: u64 = 64 * 1024 * 1024;

/// Container format family.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputFormat {
    /// Aggregate XML: many records inside one wrapper element.
    Aggregates,
    /// Delimited text, one record per row.
    DelimitedText,
    /// One JSON value per line.
    DelimitedJson,
    /// Zip archive with `.metadata` sidecars.
    Archive,
    /// N-Triples / N-Quads batched into triples documents.
    Rdf,
    /// Every file (or zip entry) is one document.
    #[default]
    Documents,
    /// Hadoop SequenceFile.
    Sequencefile,
}

/// Compression applied to the containers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    #[default]
    None,
    Zip,
    Gzip,
    Zstd,
    Bzip2,
    Xz,
    /// Decide per container from its extension, then its magic bytes.
    Auto,
}

impl CompressionKind {
    /// Codec name for whole-stream codecs; `None` for `none`, `zip`, and `auto`.
    pub fn stream_codec(self) -> Option<&'static str> {
        match self {
            CompressionKind::Gzip => Some("gzip"),
            CompressionKind::Zstd => Some("zstd"),
            CompressionKind::Bzip2 => Some("bzip2"),
            CompressionKind::Xz => Some("xz"),
            CompressionKind::None | CompressionKind::Zip | CompressionKind::Auto => None,
        }
    }
}

/// Where a record's identifier comes from.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdSource {
    /// Deterministic per-split sequence.
    #[default]
    Generated,
    /// Attribute on the record element or one of its descendants.
    Attribute(String),
    /// Text content of a named element inside the record.
    Element(String),
    /// Named column of a delimited row.
    Column(String),
    /// Top-level property of a JSON line.
    Property(String),
}

impl IdSource {
    pub fn name(&self) -> Option<&str> {
        match self {
            IdSource::Generated => None,
            IdSource::Attribute(n)
            | IdSource::Element(n)
            | IdSource::Column(n)
            | IdSource::Property(n) => Some(n),
        }
    }
}

/// Serialization of delimited rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelimitedOutput {
    #[default]
    Xml,
    Json,
}

/// Every knob the readers consume.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub format: InputFormat,
    pub compression: CompressionKind,

    /// Local name of the record element; discovered from the first child of
    /// the root when absent.
    pub record_element: Option<String>,
    /// Namespace URI the record element must be in.
    pub record_namespace: Option<String>,
    pub id_source: IdSource,

    pub delimiter: char,
    /// Column names; when set, the first row is data, not a header.
    pub delimited_fields: Option<Vec<String>>,
    /// Wrapper element of rows rendered as XML.
    pub delimited_root: String,
    pub delimited_output: DelimitedOutput,

    /// Maximum statements per triples document.
    pub rdf_max_statements: usize,
    /// Maximum graph groups held open at once.
    pub rdf_max_graphs: usize,
    /// Capacity of the parser-to-assembler hand-off queue.
    pub rdf_buffer: usize,
    /// Emit `<triples xmlns='...'>` instead of the `sem:` prefixed form.
    pub rdf_legacy_wrapper: bool,
    /// Graph assigned to statements that carry none.
    pub rdf_default_graph: Option<String>,
    /// Fixed salt for blank node rewriting; random per reader when absent.
    pub rdf_blank_salt: Option<u64>,

    pub archive_metadata_optional: bool,

    /// Split uncompressed containers by `split_size`.
    pub split_input: bool,
    pub split_size: u64,
    /// Regex a file name must match to be picked up.
    pub input_file_pattern: Option<String>,

    /// Force the type of `documents` records.
    pub document_type: Option<DocumentType>,
    /// Extension (without dot, lowercase) to document type.
    pub extension_types: BTreeMap<String, DocumentType>,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            format: InputFormat::default(),
            compression: CompressionKind::default(),
            record_element: None,
            record_namespace: None,
            id_source: IdSource::default(),
            delimiter: ',',
            delimited_fields: None,
            delimited_root: "root".to_string(),
            delimited_output: DelimitedOutput::default(),
            rdf_max_statements: 100,
            rdf_max_graphs: 100,
            rdf_buffer: 1024,
            rdf_legacy_wrapper: false,
            rdf_default_graph: None,
            rdf_blank_salt: None,
            archive_metadata_optional: false,
            split_input: false,
            split_size: DEFAULT_SPLIT_SIZE,
            input_file_pattern: Some("^[^.].*".to_string()),
            document_type: None,
            extension_types: default_extension_types(),
        }
    }
}

fn default_extension_types() -> BTreeMap<String, DocumentType> {
    let mut m = BTreeMap::new();
    for ext in ["xml", "xsd", "xsl", "xslt", "xhtml", "svg", "rdf", "owl"] {
        m.insert(ext.to_string(), DocumentType::Xml);
    }
    for ext in ["json", "geojson"] {
        m.insert(ext.to_string(), DocumentType::Json);
    }
    for ext in ["txt", "text", "csv", "tsv", "html", "htm", "md", "nt", "nq", "ttl", "sparql"] {
        m.insert(ext.to_string(), DocumentType::Text);
    }
    m
}

impl ReaderConfig {
    /// Default configuration for `format`. Archives default to zip.
    pub fn for_format(format: InputFormat) -> Self {
        let compression = match format {
            InputFormat::Archive => CompressionKind::Zip,
            _ => CompressionKind::None,
        };
        Self {
            format,
            compression,
            ..Default::default()
        }
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: Self = serde_json::from_str(json).context("parse reader configuration")?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("read configuration {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("load configuration {}", path.display()))
    }

    /// Document type for a name, by configured override then extension.
    pub fn document_type_for(&self, name: &str) -> DocumentType {
        if let Some(t) = self.document_type {
            return t;
        }
        let ext = name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        self.extension_types
            .get(&ext)
            .copied()
            .unwrap_or(DocumentType::Binary)
    }

    /// Reject combinations no reader can honour.
    pub fn validate(&self) -> LoadResult<()> {
        let bad = |msg: String| Err(LoadError::Config(msg));

        match (&self.id_source, self.format) {
            (IdSource::Attribute(_) | IdSource::Element(_), InputFormat::Aggregates) => {}
            (IdSource::Column(_), InputFormat::DelimitedText) => {}
            (IdSource::Property(_), InputFormat::DelimitedJson) => {}
            (IdSource::Generated, _) => {}
            (src, fmt) => return bad(format!("id source {src:?} does not apply to {fmt:?}")),
        }
        if let Some(name) = self.id_source.name()
            && name.trim().is_empty()
        {
            return bad("id source name is empty".into());
        }
        if !self.delimiter.is_ascii() || self.delimiter == '\n' || self.delimiter == '"' {
            return bad(format!("delimiter {:?} must be a single ASCII byte", self.delimiter));
        }
        if let Some(fields) = &self.delimited_fields
            && fields.is_empty()
        {
            return bad("delimited_fields is empty".into());
        }
        if self.delimited_root.trim().is_empty() {
            return bad("delimited_root is empty".into());
        }
        if self.rdf_max_statements == 0 {
            return bad("rdf_max_statements must be at least 1".into());
        }
        if self.rdf_max_graphs == 0 {
            return bad("rdf_max_graphs must be at least 1".into());
        }
        if self.rdf_buffer == 0 {
            return bad("rdf_buffer must be at least 1".into());
        }
        if self.split_size == 0 {
            return bad("split_size must be positive".into());
        }
        if self.format == InputFormat::Archive
            && !matches!(self.compression, CompressionKind::Zip | CompressionKind::Auto)
        {
            return bad("archive input requires zip compression".into());
        }
        if self.format == InputFormat::Sequencefile && self.compression != CompressionKind::None {
            return bad("sequence files carry their own compression; set compression to none".into());
        }
        if let Some(pattern) = &self.input_file_pattern
            && let Err(e) = regex::Regex::new(pattern)
        {
            return bad(format!("input_file_pattern {pattern:?}: {e}"));
        }
        Ok(())
    }
}
