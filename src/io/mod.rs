//! Container formats, codecs and sources.
//!
//! Every format reader is opened with the same four inputs (a
//! [`ContainerSource`], a [`CodecRegistry`], the resolved
//! [`ReaderConfig`] and one [`SplitDescriptor`]) and implements
//! [`RecordReader`]. [`open_reader`] picks the reader for the configured
//! format.

pub mod archive;
pub mod compression;
pub mod delimited;
pub mod delimited_json;
pub mod documents;
pub mod glob;
pub mod lines;
pub mod rdf;
pub mod sequencefile;
pub mod source;
pub mod xml;
pub mod zip;

use crate::config::{InputFormat, ReaderConfig};
use crate::cursor::RecordReader;
use crate::error::LoadResult;
use crate::split::SplitDescriptor;

pub use archive::ArchiveReader;
pub use compression::{CodecRegistry, ContainerStreams, Decoding, SplitStream, StreamCodec};
pub use delimited::DelimitedTextReader;
pub use delimited_json::DelimitedJsonReader;
pub use documents::DocumentsReader;
pub use rdf::RdfReader;
pub use sequencefile::SequenceFileReader;
pub use source::{ContainerSource, LocalFs, MemorySource};
pub use xml::AggregateXmlReader;

/// Open the reader for `config.format` over `split`.
pub fn open_reader(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    split: SplitDescriptor,
) -> LoadResult<Box<dyn RecordReader>> {
    tracing::trace!(split = %split, format = ?config.format, "opening reader");
    Ok(match config.format {
        InputFormat::Aggregates => Box::new(AggregateXmlReader::open(source, registry, config, split)?),
        InputFormat::DelimitedText => {
            Box::new(DelimitedTextReader::open(source, registry, config, split)?)
        }
        InputFormat::DelimitedJson => {
            Box::new(DelimitedJsonReader::open(source, registry, config, split)?)
        }
        InputFormat::Archive => Box::new(ArchiveReader::open(source, registry, config, split)?),
        InputFormat::Rdf => Box::new(RdfReader::open(source, registry, config, split)?),
        InputFormat::Documents => Box::new(DocumentsReader::open(source, registry, config, split)?),
        InputFormat::Sequencefile => Box::new(SequenceFileReader::open(source, config, split)?),
    })
}
