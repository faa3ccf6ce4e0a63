//! Aggregate XML reader: many records inside one wrapper element.

use crate::config::{IdSource, ReaderConfig};
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentRecord, SourceLocation};
use crate::error::{LoadError, LoadResult, report};
use crate::id::IdGenerator;
use crate::io::compression::{BoxedBufRead, CodecRegistry, ContainerStreams, SplitStream};
use crate::io::source::ContainerSource;
use crate::io::xml::assembler::{AssembledRecord, Assembler};
use crate::io::xml::seeker::{scan_for_record, skip_to};
use crate::io::xml::token::{Token, Tokenizer};
use crate::namespace::NamespaceScopes;
use crate::split::{RecordElement, SplitDescriptor};

/// The stream currently being tokenized.
struct ActiveStream {
    tokens: Tokenizer<BoxedBufRead>,
    assembler: Assembler,
    /// Nominal end; records starting at or after it belong to the next split.
    end: Option<u64>,
    ids: IdGenerator,
    location: SourceLocation,
}

impl ActiveStream {
    fn name(&mut self, rec: AssembledRecord) -> DocumentRecord {
        let id = rec.id.unwrap_or_else(|| self.ids.next_id());
        let location = self.location.clone().at_offset(rec.offset);
        let mut doc = DocumentRecord::new(id, Content::Text(rec.content), location);
        doc.skip = rec.skip;
        doc
    }
}

pub struct AggregateXmlReader {
    split: SplitDescriptor,
    id_source: IdSource,
    record: Option<RecordElement>,
    streams: ContainerStreams,
    active: Option<ActiveStream>,
    done: bool,
    closed: bool,
}

impl AggregateXmlReader {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let streams = ContainerStreams::open(source, registry, config, &split)?;
        let record = match &config.record_element {
            Some(name) => Some(RecordElement::new(name, config.record_namespace.clone())),
            None => split.record_element.clone(),
        };
        Ok(Self {
            split,
            id_source: config.id_source.clone(),
            record,
            streams,
            active: None,
            done: false,
            closed: false,
        })
    }

    /// Position a fresh stream on its first record. `None` when the split
    /// holds no record start.
    fn activate(&self, stream: SplitStream) -> LoadResult<Option<ActiveStream>> {
        let location = stream.location();
        let ids = match &stream.entry {
            Some(entry) => IdGenerator::for_entry(&stream.path, entry, 0),
            None => IdGenerator::new(&stream.path, self.split.start),
        };
        if stream.is_origin() {
            // Zip entries are independent documents with fresh scopes.
            let scopes = match stream.entry {
                Some(_) => NamespaceScopes::new(),
                None => NamespaceScopes::from_snapshot(&self.split.namespaces),
            };
            let end = stream.end;
            return Ok(Some(ActiveStream {
                tokens: Tokenizer::new(stream.reader, 0, true, location.clone()),
                assembler: Assembler::new(
                    self.record.clone(),
                    &self.id_source,
                    true,
                    scopes,
                    location.clone(),
                ),
                end,
                ids,
                location,
            }));
        }

        let record = self.record.clone().ok_or_else(|| {
            self.split
                .invalid("record element is unknown for a split that starts mid-container")
        })?;
        let end = stream.end.unwrap_or(u64::MAX);
        let positioned = match self.split.first_record {
            Some(hint) if hint < stream.start => {
                return Err(self.split.invalid(format!("record hint {hint} precedes the split")));
            }
            Some(hint) if hint >= end => None,
            Some(hint) => Some((skip_to(stream.reader, stream.start, hint, &location)?, hint)),
            None => scan_for_record(stream.reader, stream.start, end, &record.name, &location)?,
        };
        let Some((reader, base)) = positioned else {
            tracing::trace!(split = %self.split, "no record starts inside split");
            return Ok(None);
        };
        Ok(Some(ActiveStream {
            tokens: Tokenizer::new(reader, base, false, location.clone()),
            assembler: Assembler::new(
                Some(record),
                &self.id_source,
                false,
                NamespaceScopes::from_snapshot(&self.split.namespaces),
                location.clone(),
            ),
            end: Some(end),
            ids,
            location,
        }))
    }

    fn advance(&mut self) -> LoadResult<Option<DocumentRecord>> {
        loop {
            let Some(active) = self.active.as_mut() else {
                if self.done {
                    return Ok(None);
                }
                match self.streams.next_stream()? {
                    Some(stream) => self.active = self.activate(stream)?,
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
                continue;
            };
            let (offset, token) = active.tokens.next_token()?;
            if active.assembler.is_awaiting() && active.end.is_some_and(|end| offset >= end) {
                self.active = None;
                continue;
            }
            if token == Token::Eof {
                active.assembler.finish(offset)?;
                self.active = None;
                continue;
            }
            if let Some(rec) = active.assembler.feed(offset, token)? {
                return Ok(Some(active.name(rec)));
            }
        }
    }
}

impl RecordReader for AggregateXmlReader {
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.closed {
            return Err(LoadError::Closed(self.split.to_string()));
        }
        self.advance().inspect_err(|e| {
            report(e);
            self.active = None;
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
        if !self.closed {
            tracing::trace!(split = %self.split, "closing aggregate XML reader");
        }
        self.active = None;
        self.closed = true;
        self.done = true;
        Ok(())
    }
}
