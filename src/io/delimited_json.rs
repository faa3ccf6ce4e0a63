//! Delimited JSON: one JSON value per line.

use crate::config::{IdSource, ReaderConfig};
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentRecord, SourceLocation};
use crate::error::{LoadError, LoadResult, report};
use crate::id::IdGenerator;
use crate::io::compression::{CodecRegistry, ContainerStreams};
use crate::io::lines::{Line, LineCursor};
use crate::io::source::ContainerSource;
use crate::split::SplitDescriptor;
use serde_json::Value;

/// Identifier carried by `value` under `property`, if usable.
fn property_id(value: &Value, property: &str) -> Option<String> {
    match value.get(property)? {
        Value::String(s) => Some(s.clone()),
        v @ (Value::Number(_) | Value::Bool(_)) => Some(v.to_string()),
        _ => None,
    }
}

fn to_record(
    id_source: &IdSource,
    ids: &mut IdGenerator,
    line: Line,
    base: &SourceLocation,
) -> DocumentRecord {
    let location = line.location(base);
    let value = match serde_json::from_str::<Value>(&line.text) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(location = %location, error = %e, "unparseable JSON line; skipping");
            return DocumentRecord::skipped(String::new(), Content::Text(line.text), location);
        }
    };
    let id = match id_source {
        IdSource::Property(name) => property_id(&value, name).unwrap_or_default(),
        _ => ids.next_id(),
    };
    if id.is_empty() {
        tracing::debug!(location = %location, "JSON line has no usable identifier; skipping");
        return DocumentRecord::skipped(id, Content::Text(line.text), location);
    }
    DocumentRecord::new(id, Content::Text(line.text), location)
}

struct ActiveLines {
    lines: LineCursor,
    ids: IdGenerator,
}

pub struct DelimitedJsonReader {
    split: SplitDescriptor,
    id_source: IdSource,
    streams: ContainerStreams,
    active: Option<ActiveLines>,
    done: bool,
    closed: bool,
}

impl DelimitedJsonReader {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let streams = ContainerStreams::open(source, registry, config, &split)?;
        Ok(Self {
            split,
            id_source: config.id_source.clone(),
            streams,
            active: None,
            done: false,
            closed: false,
        })
    }

    fn advance(&mut self) -> LoadResult<Option<DocumentRecord>> {
        loop {
            let Some(active) = self.active.as_mut() else {
                if self.done {
                    return Ok(None);
                }
                match self.streams.next_stream()? {
                    Some(stream) => {
                        let ids = match &stream.entry {
                            Some(entry) => IdGenerator::for_entry(&stream.path, entry, 0),
                            None => IdGenerator::new(&stream.path, self.split.start),
                        };
                        self.active = Some(ActiveLines {
                            lines: LineCursor::open(stream)?,
                            ids,
                        });
                    }
                    None => {
                        self.done = true;
                        return Ok(None);
                    }
                }
                continue;
            };
            match active.lines.next_line()? {
                Some(line) if line.text.trim().is_empty() => continue,
                Some(line) => {
                    let base = active.lines.location();
                    return Ok(Some(to_record(&self.id_source, &mut active.ids, line, base)));
                }
                None => self.active = None,
            }
        }
    }
}

impl RecordReader for DelimitedJsonReader {
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
        self.active = None;
        self.closed = true;
        self.done = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InputFormat;
    use crate::cursor::RecordCursor;
    use crate::io::source::MemorySource;

    fn read(data: &str, id_source: IdSource) -> Vec<DocumentRecord> {
        let src = MemorySource::new().with("t.jsonl", data);
        let config = ReaderConfig {
            id_source,
            ..ReaderConfig::for_format(InputFormat::DelimitedJson)
        };
        let split = SplitDescriptor::whole("t.jsonl", data.len() as u64).unwrap();
        let reader = DelimitedJsonReader::open(&src, &CodecRegistry::new(), &config, split).unwrap();
        RecordCursor::new(reader).collect::<LoadResult<Vec<_>>>().unwrap()
    }

    #[test]
    fn property_ids_and_skips() {
        let data = "{\"k\":\"a\",\"v\":1}\n\n{\"k\":5}\n{\"v\":2}\nnot json\n{\"k\":\"\"}\n";
        let recs = read(data, IdSource::Property("k".into()));
        let got: Vec<_> = recs.iter().map(|r| (r.id.as_str(), r.skip)).collect();
        assert_eq!(
            got,
            vec![("a", false), ("5", false), ("", true), ("", true), ("", true)]
        );
        assert_eq!(recs[0].text(), Some("{\"k\":\"a\",\"v\":1}"));
        assert_eq!(recs[1].location.line, Some(3));
    }

    #[test]
    fn generated_ids_are_distinct() {
        let recs = read("{}\n{}\n{}\n", IdSource::Generated);
        let mut ids: Vec<_> = recs.iter().map(|r| r.id.clone()).collect();
        ids.dedup();
        assert_eq!(ids.len(), 3);
    }
}
