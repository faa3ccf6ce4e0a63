use crate::config::ReaderConfig;
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentMetadata, DocumentRecord, DocumentType, SourceLocation};
use crate::error::{LoadError, LoadResult, report};
use crate::id::IdGenerator;
use crate::io::compression::{CodecRegistry, ContainerStreams, SplitStream};
use crate::io::lines::LineCursor;
use crate::io::rdf::batch::{Batch, GraphBatcher};
use crate::io::rdf::statement::{RDF_LANG_STRING, Statement, Term, XSD_STRING, parse_line};
use crate::io::source::ContainerSource;
use crate::io::xml::{escape_attr, escape_text};
use crate::split::SplitDescriptor;
use sha2::{Digest, Sha256};
use std::sync::mpsc::{Receiver, RecvError, SyncSender, sync_channel};
use std::thread::JoinHandle;

pub const SEM_NAMESPACE: &str = "http://marklogic.com/semantics";
pub const DEFAULT_GRAPH: &str = "http://marklogic.com/semantics#default-graph";
pub const BLANK_PREFIX: &str = "http://marklogic.com/semantics/blank/";

type Parsed = LoadResult<(Statement, SourceLocation)>;

/// Parser thread for one stream and the receiving end of its queue.
struct Producer {
    rx: Receiver<Parsed>,
    handle: Option<JoinHandle<()>>,
    location: SourceLocation,
}

impl Producer {
    fn spawn(stream: SplitStream, capacity: usize) -> LoadResult<Self> {
        let location = stream.location();
        let (tx, rx) = sync_channel(capacity);
        let name = format!("ironload-rdf:{}", stream.entry.as_deref().unwrap_or(&stream.path));
        let handle = std::thread::Builder::new()
            .name(name)
            .spawn(move || parse_stream(stream, tx))
            .map_err(|e| LoadError::io(location.clone(), e))?;
        tracing::trace!(location = %location, capacity, "started RDF parser thread");
        Ok(Self {
            rx,
            handle: Some(handle),
            location,
        })
    }

    /// Drop the queue so a blocked sender fails, then wait for the thread.
    fn stop(self) {
        let Producer { rx, handle, location } = self;
        drop(rx);
        if let Some(h) = handle
            && h.join().is_err()
        {
            tracing::error!(location = %location, "RDF parser thread panicked");
        }
    }
}

fn parse_stream(stream: SplitStream, tx: SyncSender<Parsed>) {
    let mut lines = match LineCursor::open(stream) {
        Ok(lines) => lines,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };
    loop {
        let line = match lines.next_line() {
            Ok(Some(line)) => line,
            Ok(None) => return,
            Err(e) => {
                let _ = tx.send(Err(e));
                return;
            }
        };
        let location = line.location(lines.location());
        let msg = match parse_line(&line.text) {
            Ok(Some(st)) => Ok((st, location)),
            Ok(None) => continue,
            Err(message) => Err(LoadError::RdfSyntax { location, message }),
        };
        let failed = msg.is_err();
        if tx.send(msg).is_err() || failed {
            return;
        }
    }
}

/// Rewrites blank node labels into stable IRIs for one reader.
struct BlankNodes {
    salt: u64,
    scope: String,
}

impl BlankNodes {
    fn iri(&self, label: &str) -> String {
        let mut h = Sha256::new();
        h.update(self.salt.to_le_bytes());
        h.update(self.scope.as_bytes());
        h.update(b"#");
        h.update(label.as_bytes());
        let digest = hex::encode(h.finalize());
        format!("{BLANK_PREFIX}{}", &digest[..16])
    }

    fn resolve(&self, term: &Term) -> String {
        match term {
            Term::Iri(iri) => iri.clone(),
            Term::Blank(label) => self.iri(label),
            Term::Literal { value, .. } => value.clone(),
        }
    }
}

struct Shape {
    legacy: bool,
}

impl Shape {
    fn el(&self, local: &str) -> String {
        if self.legacy {
            local.to_string()
        } else {
            format!("sem:{local}")
        }
    }

    fn triple(&self, st: &Statement, blanks: &BlankNodes) -> String {
        let (t, s, p, o) = (self.el("triple"), self.el("subject"), self.el("predicate"), self.el("object"));
        let subject = escape_text(&blanks.resolve(&st.subject)).into_owned();
        let predicate = escape_text(&blanks.resolve(&st.predicate)).into_owned();
        let object = match &st.object {
            Term::Literal { value, datatype, lang } => {
                let mut attrs = String::new();
                match lang {
                    Some(lang) => {
                        attrs.push_str(&format!(" datatype=\"{RDF_LANG_STRING}\""));
                        attrs.push_str(&format!(" xml:lang=\"{}\"", escape_attr(lang)));
                    }
                    None => {
                        let dt = datatype.as_deref().unwrap_or(XSD_STRING);
                        attrs.push_str(&format!(" datatype=\"{}\"", escape_attr(dt)));
                    }
                }
                format!("<{o}{attrs}>{}</{o}>", escape_text(value))
            }
            other => format!("<{o}>{}</{o}>", escape_text(&blanks.resolve(other))),
        };
        format!("<{t}><{s}>{subject}</{s}><{p}>{predicate}</{p}>{object}</{t}>")
    }

    fn document(&self, statements: &[String]) -> String {
        let body = statements.concat();
        if self.legacy {
            format!("<triples xmlns='{SEM_NAMESPACE}'>{body}</triples>")
        } else {
            format!("<sem:triples xmlns:sem='{SEM_NAMESPACE}'>{body}</sem:triples>")
        }
    }
}

/// RDF reader: statements parsed on a background thread, batched by graph into
/// triples documents.
pub struct RdfReader {
    split: SplitDescriptor,
    capacity: usize,
    default_graph: String,
    shape: Shape,
    salt: u64,
    batcher: GraphBatcher,
    streams: ContainerStreams,
    producer: Option<Producer>,
    blanks: Option<BlankNodes>,
    ids: IdGenerator,
    /// Location of the first statement of the batch being filled.
    location: SourceLocation,
    done: bool,
    closed: bool,
}

impl RdfReader {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let streams = ContainerStreams::open(source, registry, config, &split)?;
        let salt = config.rdf_blank_salt.unwrap_or_else(rand::random);
        Ok(Self {
            capacity: config.rdf_buffer,
            default_graph: config
                .rdf_default_graph
                .clone()
                .unwrap_or_else(|| DEFAULT_GRAPH.to_string()),
            shape: Shape {
                legacy: config.rdf_legacy_wrapper,
            },
            salt,
            batcher: GraphBatcher::new(config.rdf_max_statements, config.rdf_max_graphs),
            ids: IdGenerator::new(&split.path, split.start),
            location: SourceLocation::new(split.path.clone()),
            split,
            streams,
            producer: None,
            blanks: None,
            done: false,
            closed: false,
        })
    }

    fn emit(&mut self, batch: Batch) -> DocumentRecord {
        let id = format!("/triplestore/{}.xml", self.ids.next_id());
        let content = Content::Text(self.shape.document(&batch.statements));
        let metadata = DocumentMetadata {
            format: Some(DocumentType::Xml),
            collections: vec![batch.graph],
            ..Default::default()
        };
        DocumentRecord::new(id, content, self.location.clone()).with_metadata(metadata)
    }

    fn advance(&mut self) -> LoadResult<Option<DocumentRecord>> {
        loop {
            if let Some(batch) = self.batcher.next_ready() {
                return Ok(Some(self.emit(batch)));
            }
            if self.done {
                return Ok(None);
            }
            let Some(producer) = self.producer.as_ref() else {
                match self.streams.next_stream()? {
                    Some(stream) => {
                        let scope = match &stream.entry {
                            Some(entry) => format!("{}/{entry}", stream.path),
                            None => stream.path.clone(),
                        };
                        self.blanks = Some(BlankNodes {
                            salt: self.salt,
                            scope,
                        });
                        self.producer = Some(Producer::spawn(stream, self.capacity)?);
                    }
                    None => {
                        self.batcher.finish();
                        self.done = true;
                    }
                }
                continue;
            };
            match producer.rx.recv() {
                Ok(Ok((st, location))) => {
                    let Some(blanks) = self.blanks.as_ref() else {
                        continue;
                    };
                    let graph = match &st.graph {
                        Some(g) => blanks.resolve(g),
                        None => self.default_graph.clone(),
                    };
                    let xml = self.shape.triple(&st, blanks);
                    if self.batcher.is_empty() {
                        self.location = location;
                    }
                    self.batcher.push(&graph, xml);
                }
                Ok(Err(e)) => return Err(e),
                Err(RecvError) => {
                    // Sender gone: the stream is fully parsed.
                    if let Some(p) = self.producer.take() {
                        tracing::trace!(location = %p.location, "RDF stream exhausted");
                        p.stop();
                    }
                }
            }
        }
    }

    fn shutdown(&mut self) {
        if let Some(p) = self.producer.take() {
            p.stop();
        }
    }
}

impl RecordReader for RdfReader {
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.closed {
            return Err(LoadError::Closed(self.split.to_string()));
        }
        self.advance().inspect_err(|e| {
            report(e);
            self.shutdown();
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
        self.shutdown();
        self.batcher = GraphBatcher::new(1, 1);
        self.closed = true;
        self.done = true;
        Ok(())
    }
}

impl Drop for RdfReader {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_nodes_are_stable_per_salt() {
        let a = BlankNodes { salt: 7, scope: "f.nt".into() };
        let b = BlankNodes { salt: 8, scope: "f.nt".into() };
        assert_eq!(a.iri("x"), a.iri("x"));
        assert_ne!(a.iri("x"), a.iri("y"));
        assert_ne!(a.iri("x"), b.iri("x"));
        assert!(a.iri("x").starts_with(BLANK_PREFIX));
        assert_eq!(a.iri("x").len(), BLANK_PREFIX.len() + 16);
    }

    #[test]
    fn triple_markup() {
        let shape = Shape { legacy: false };
        let blanks = BlankNodes { salt: 0, scope: String::new() };
        let st = parse_line(r#"<http://s> <http://p> "a<b"@en ."#).unwrap().unwrap();
        assert_eq!(
            shape.triple(&st, &blanks),
            format!(
                "<sem:triple><sem:subject>http://s</sem:subject><sem:predicate>http://p</sem:predicate>\
                 <sem:object datatype=\"{RDF_LANG_STRING}\" xml:lang=\"en\">a&lt;b</sem:object></sem:triple>"
            )
        );
        let legacy = Shape { legacy: true };
        assert!(legacy.document(&[]).starts_with("<triples xmlns='http://marklogic.com/semantics'>"));
    }
}
