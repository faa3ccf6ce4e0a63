//! Error taxonomy for record extraction.
//!
//! Readers fail with a [`LoadError`]. Every variant carries the
//! [`SourceLocation`] it happened at so the orchestration layer can report the
//! failed split precisely. Conditions the readers tolerate (a malformed XML
//! attribute, a missing optional archive sidecar, a short delimited row) never
//! become errors: they are logged with `tracing::warn!` and processing goes on.
//!
//! Outer surfaces (configuration files, glob expansion, the [`Runner`]) return
//! `anyhow::Result` and wrap a `LoadError` with context.
//!
//! [`Runner`]: crate::runner::Runner

use crate::document::SourceLocation;
use thiserror::Error;

/// Result alias used by every reader.
pub type LoadResult<T> = std::result::Result<T, LoadError>;

/// A failure while opening a container or pulling records out of it.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The container's byte stream is not what its format promises (for
    /// example an XML declaration in the middle of a split).
    #[error("malformed container at {location}: {reason}")]
    MalformedContainer { location: SourceLocation, reason: String },

    /// The stream ended while a record was still open.
    #[error("truncated record <{element}> at {location}: stream ended before its end tag")]
    TruncatedRecord { location: SourceLocation, element: String },

    /// A record closed without the mandatory identifier ever being seen.
    #[error("record <{element}> at {location} closed without identifier `{id_name}`")]
    MissingIdentifier {
        location: SourceLocation,
        element: String,
        id_name: String,
    },

    /// The identifier-bearing element contained something other than text.
    #[error("identifier element <{element}> at {location} must contain exactly one text node")]
    MalformedIdentifierElement { location: SourceLocation, element: String },

    /// The requested codec is unknown or was not compiled in.
    #[error("unsupported compression codec `{codec}` for {location}")]
    UnsupportedCodec { location: SourceLocation, codec: String },

    /// The split descriptor cannot be honoured for this container.
    #[error("invalid split {path} [{start}, +{length}): {reason}")]
    InvalidSplit {
        path: String,
        start: u64,
        length: u64,
        reason: String,
    },

    /// The resolved configuration is inconsistent.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("XML error at {location}: {source}")]
    Xml {
        location: SourceLocation,
        #[source]
        source: quick_xml::Error,
    },

    #[error("delimited text error at {location}: {source}")]
    Csv {
        location: SourceLocation,
        #[source]
        source: csv::Error,
    },

    #[error("zip archive error at {location}: {source}")]
    Zip {
        location: SourceLocation,
        #[source]
        source: zip::result::ZipError,
    },

    #[error("JSON error at {location}: {source}")]
    Json {
        location: SourceLocation,
        #[source]
        source: serde_json::Error,
    },

    #[error("RDF syntax error at {location}: {message}")]
    RdfSyntax { location: SourceLocation, message: String },

    #[error("I/O error at {location}: {source}")]
    Io {
        location: SourceLocation,
        #[source]
        source: std::io::Error,
    },

    /// The reader was used after [`RecordReader::close`](crate::cursor::RecordReader::close).
    #[error("reader for {0} is closed")]
    Closed(String),
}

impl LoadError {
    pub fn malformed(location: SourceLocation, reason: impl Into<String>) -> Self {
        Self::MalformedContainer {
            location,
            reason: reason.into(),
        }
    }

    pub fn io(location: SourceLocation, source: std::io::Error) -> Self {
        Self::Io { location, source }
    }

    /// Whether this error aborts the split. Configuration errors are raised
    /// before any split is opened, so everything but them is split-fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Config(_))
    }

    /// Location the error refers to, when it has one.
    pub fn location(&self) -> Option<&SourceLocation> {
        match self {
            Self::MalformedContainer { location, .. }
            | Self::TruncatedRecord { location, .. }
            | Self::MissingIdentifier { location, .. }
            | Self::MalformedIdentifierElement { location, .. }
            | Self::UnsupportedCodec { location, .. }
            | Self::Xml { location, .. }
            | Self::Csv { location, .. }
            | Self::Zip { location, .. }
            | Self::Json { location, .. }
            | Self::RdfSyntax { location, .. }
            | Self::Io { location, .. } => Some(location),
            Self::InvalidSplit { .. } | Self::Config(_) | Self::Closed(_) => None,
        }
    }
}

/// Log a reader failure with its location before it propagates.
pub(crate) fn report(err: &LoadError) {
    match err.location() {
        Some(loc) => tracing::error!(
            path = %loc.path,
            entry = loc.entry.as_deref().unwrap_or(""),
            location = %loc,
            error = %err,
            "record extraction failed"
        ),
        None => tracing::error!(error = %err, "record extraction failed"),
    }
}
