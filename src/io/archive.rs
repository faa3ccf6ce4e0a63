//! Archives: zip containers pairing content entries with metadata sidecars.
//!
//! Entry layout, in physical order:
//!
//! - `<uri>.metadata`: XML sidecar for the content entry that follows it.
//! - `<uri>`: the content itself.
//! - `<uri>.naked`: a metadata-only property record with no content entry.
//!
//! Sidecars look like this (element prefixes are ignored):
//!
//! ```xml
//! <metadata>
//!   <format>xml</format>
//!   <collections><collection>c1</collection></collections>
//!   <permissions>
//!     <permission><role-name>reader</role-name><capability>read</capability></permission>
//!   </permissions>
//!   <quality>2</quality>
//!   <prop:properties xmlns:prop="http://marklogic.com/xdmp/property">...</prop:properties>
//!   <metadata-values><metadata-value key="k">v</metadata-value></metadata-values>
//! </metadata>
//! ```

use crate::config::ReaderConfig;
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentMetadata, DocumentRecord, DocumentType, Permission, SourceLocation};
use crate::error::{LoadError, LoadResult, report};
use crate::io::compression::{CodecRegistry, ContainerStreams, SplitStream};
use crate::io::source::ContainerSource;
use crate::io::xml::token::{Token, Tokenizer};
use crate::split::SplitDescriptor;
use std::io::Read;

pub const METADATA_SUFFIX: &str = ".metadata";
pub const NAKED_SUFFIX: &str = ".naked";

/// Parse one metadata sidecar.
pub fn parse_metadata(bytes: &[u8], location: &SourceLocation) -> LoadResult<DocumentMetadata> {
    let mut tokens = Tokenizer::new(bytes, 0, true, location.clone());
    let mut meta = DocumentMetadata::default();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();
    let mut key: Option<String> = None;
    let mut role: Option<String> = None;
    let mut capability: Option<String> = None;

    loop {
        let (offset, token) = tokens.next_token()?;
        match token {
            Token::Empty(tag) if tag.local() == "properties" => {
                meta.properties = Some(slice(bytes, offset, tokens.position()));
            }
            Token::Start(tag) if tag.local() == "properties" => {
                let mut depth = 1usize;
                while depth > 0 {
                    match tokens.next_token()?.1 {
                        Token::Start(_) => depth += 1,
                        Token::End(_) => depth -= 1,
                        Token::Eof => {
                            return Err(LoadError::TruncatedRecord {
                                location: location.clone().at_offset(offset),
                                element: tag.qname,
                            });
                        }
                        _ => {}
                    }
                }
                meta.properties = Some(slice(bytes, offset, tokens.position()));
            }
            Token::Start(tag) => {
                if tag.local() == "metadata-value" {
                    key = tag.attribute("key").map(str::to_string);
                }
                path.push(tag.local().to_string());
                text.clear();
            }
            Token::Text(t) | Token::CData(t) => text.push_str(&t),
            Token::End(_) => {
                let Some(local) = path.pop() else {
                    continue;
                };
                let value = text.trim();
                match local.as_str() {
                    "collection" if !value.is_empty() => meta.collections.push(value.to_string()),
                    "role-name" | "role" => role = Some(value.to_string()),
                    "capability" => capability = Some(value.to_string()),
                    "permission" => match (role.take(), capability.take()) {
                        (Some(role), Some(capability)) => {
                            meta.permissions.push(Permission { role, capability })
                        }
                        _ => tracing::warn!(location = %location, "incomplete permission in metadata; dropped"),
                    },
                    "quality" => {
                        meta.quality = value.parse().map_err(|_| {
                            LoadError::malformed(
                                location.clone().at_offset(offset),
                                format!("quality {value:?} is not an integer"),
                            )
                        })?;
                    }
                    "format" => meta.format = DocumentType::parse(value),
                    "metadata-value" => {
                        if let Some(k) = key.take() {
                            meta.values.insert(k, value.to_string());
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Token::Eof => break,
            _ => {}
        }
    }
    Ok(meta)
}

fn slice(bytes: &[u8], from: u64, to: u64) -> String {
    let from = (from as usize).min(bytes.len());
    let to = (to as usize).clamp(from, bytes.len());
    String::from_utf8_lossy(&bytes[from..to]).into_owned()
}

/// Sidecar waiting for its content entry.
struct Pending {
    uri: String,
    metadata: DocumentMetadata,
}

pub struct ArchiveReader {
    split: SplitDescriptor,
    config: ReaderConfig,
    streams: ContainerStreams,
    pending: Option<Pending>,
    done: bool,
    closed: bool,
}

impl ArchiveReader {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let streams = ContainerStreams::open(source, registry, config, &split)?;
        if !streams.is_zip() {
            return Err(LoadError::malformed(
                SourceLocation::new(split.path.clone()),
                "archive input must be a zip container",
            ));
        }
        Ok(Self {
            split,
            config: config.clone(),
            streams,
            pending: None,
            done: false,
            closed: false,
        })
    }

    fn drop_pending(&mut self, why: &str) {
        if let Some(p) = self.pending.take() {
            tracing::warn!(path = %self.split.path, uri = %p.uri, "metadata sidecar {why}; discarded");
        }
    }

    fn advance(&mut self) -> LoadResult<Option<DocumentRecord>> {
        loop {
            if self.done {
                return Ok(None);
            }
            let Some(stream) = self.streams.next_stream()? else {
                self.drop_pending("has no content entry");
                self.done = true;
                return Ok(None);
            };
            let (name, location, bytes) = read_entry(stream)?;

            if let Some(uri) = name.strip_suffix(METADATA_SUFFIX) {
                self.drop_pending("is followed by another sidecar");
                let metadata = parse_metadata(&bytes, &location)?;
                self.pending = Some(Pending {
                    uri: uri.to_string(),
                    metadata,
                });
                continue;
            }

            if let Some(uri) = name.strip_suffix(NAKED_SUFFIX) {
                let mut metadata = parse_metadata(&bytes, &location)?;
                metadata.naked = true;
                let content = Content::Text(metadata.properties.clone().unwrap_or_default());
                return Ok(Some(
                    DocumentRecord::new(uri, content, location).with_metadata(metadata),
                ));
            }

            let metadata = match self.pending.take() {
                Some(p) if p.uri == name => Some(p.metadata),
                other => {
                    self.pending = other;
                    self.drop_pending("does not match the next content entry");
                    None
                }
            };
            let Some(metadata) = metadata else {
                if !self.config.archive_metadata_optional {
                    return Err(LoadError::malformed(
                        location,
                        format!("archive entry `{name}` has no {METADATA_SUFFIX} sidecar"),
                    ));
                }
                tracing::warn!(location = %location, "archive entry has no metadata; loading content only");
                let kind = self.config.document_type_for(&name);
                return Ok(Some(DocumentRecord::new(
                    name,
                    Content::from_bytes(bytes, kind),
                    location,
                )));
            };
            let kind = metadata
                .format
                .unwrap_or_else(|| self.config.document_type_for(&name));
            return Ok(Some(
                DocumentRecord::new(name, Content::from_bytes(bytes, kind), location)
                    .with_metadata(metadata),
            ));
        }
    }
}

fn read_entry(mut stream: SplitStream) -> LoadResult<(String, SourceLocation, Vec<u8>)> {
    let location = stream.location();
    let mut bytes = Vec::new();
    stream
        .reader
        .read_to_end(&mut bytes)
        .map_err(|e| LoadError::io(location.clone(), e))?;
    let name = stream.entry.unwrap_or(stream.path);
    Ok((name, location, bytes))
}

impl RecordReader for ArchiveReader {
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.closed {
            return Err(LoadError::Closed(self.split.to_string()));
        }
        self.advance().inspect_err(|e| {
            report(e);
            self.pending = None;
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
        self.pending = None;
        self.closed = true;
        self.done = true;
        Ok(())
    }
}
