//! Whole documents: each file, decoded stream, or zip entry is one record.

use crate::config::ReaderConfig;
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentRecord};
use crate::error::{LoadError, LoadResult, report};
use crate::io::compression::{CodecRegistry, ContainerStreams, Decoding, resolve_decoding};
use crate::io::source::ContainerSource;
use crate::split::SplitDescriptor;
use std::io::Read;

pub struct DocumentsReader {
    split: SplitDescriptor,
    config: ReaderConfig,
    /// Identifier of a non-zip container's single document.
    document_id: String,
    streams: ContainerStreams,
    done: bool,
    closed: bool,
}

impl DocumentsReader {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let decoding = resolve_decoding(source, registry, config.compression, &split.path)?;
        if matches!(decoding, Decoding::Raw)
            && (!split.is_origin() || split.end() < source.len(&split.path)?)
        {
            return Err(split.invalid("whole documents cannot be split"));
        }
        let document_id = match &decoding {
            Decoding::Stream(_) => registry.strip_extension(&split.path).unwrap_or(&split.path),
            Decoding::Raw | Decoding::Zip => &split.path,
        }
        .to_string();
        let streams = ContainerStreams::open_with(source, decoding, &split)?;
        Ok(Self {
            config: config.clone(),
            document_id,
            split,
            streams,
            done: false,
            closed: false,
        })
    }

    fn advance(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.done {
            return Ok(None);
        }
        let Some(mut stream) = self.streams.next_stream()? else {
            self.done = true;
            return Ok(None);
        };
        let location = stream.location();
        let mut bytes = Vec::new();
        stream
            .reader
            .read_to_end(&mut bytes)
            .map_err(|e| LoadError::io(location.clone(), e))?;
        let id = stream.entry.unwrap_or_else(|| self.document_id.clone());
        let kind = self.config.document_type_for(&id);
        tracing::trace!(id = %id, bytes = bytes.len(), kind = ?kind, "read whole document");
        Ok(Some(DocumentRecord::new(
            id,
            Content::from_bytes(bytes, kind),
            location.at_offset(0),
        )))
    }
}

impl RecordReader for DocumentsReader {
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.closed {
            return Err(LoadError::Closed(self.split.to_string()));
        }
        self.advance().inspect_err(|e| {
            report(e);
            self.done = true;
        })
    }

    fn progress(&self) -> f32 {
        if self.done {
            1.0
        } else {
            self.streams.progress()
        }
    }

    fn close(&mut self) -> LoadResult<()> {
        self.closed = true;
        self.done = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CompressionKind, InputFormat};
    use crate::cursor::RecordCursor;
    use crate::io::source::MemorySource;

    fn read(src: &MemorySource, path: &str, compression: CompressionKind) -> Vec<DocumentRecord> {
        let config = ReaderConfig {
            compression,
            ..ReaderConfig::for_format(InputFormat::Documents)
        };
        let split = SplitDescriptor::whole(path, src.len(path).unwrap()).unwrap();
        let reader = DocumentsReader::open(src, &CodecRegistry::new(), &config, split).unwrap();
        RecordCursor::new(reader).collect::<LoadResult<Vec<_>>>().unwrap()
    }

    #[test]
    fn plain_file_is_one_document() {
        let src = MemorySource::new().with("/d/a.xml", "<a/>");
        let recs = read(&src, "/d/a.xml", CompressionKind::None);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].id, "/d/a.xml");
        assert_eq!(recs[0].content, Content::Text("<a/>".into()));
    }

    #[test]
    fn unknown_extension_is_binary() {
        let src = MemorySource::new().with("/d/blob.dat", vec![0u8, 159, 146, 150]);
        let recs = read(&src, "/d/blob.dat", CompressionKind::None);
        assert!(matches!(recs[0].content, Content::Binary(_)));
    }

    #[test]
    fn partial_split_is_rejected() {
        let src = MemorySource::new().with("a.txt", "hello");
        let split = SplitDescriptor::new("a.txt", 0, 2).unwrap();
        let config = ReaderConfig::for_format(InputFormat::Documents);
        assert!(matches!(
            DocumentsReader::open(&src, &CodecRegistry::new(), &config, split),
            Err(LoadError::InvalidSplit { .. })
        ));
    }
}
