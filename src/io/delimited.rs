//! Delimited text: one record per row, rendered as a small XML or JSON document.
//!
//! Rows are owned by splits with the same rule as [`LineCursor`]: a reader
//! opened mid-container drops the bytes through the first newline and stops
//! after the first row that starts beyond its nominal end. A quoted field
//! spanning a split boundary is not supported; plan such files as one split.
//!
//! [`LineCursor`]: crate::io::lines::LineCursor

use crate::config::{DelimitedOutput, IdSource, ReaderConfig};
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentRecord, SourceLocation};
use crate::error::{LoadError, LoadResult, report};
use crate::id::IdGenerator;
use crate::io::compression::{BoxedBufRead, CodecRegistry, ContainerStreams, SplitStream};
use crate::io::source::ContainerSource;
use crate::io::xml::{escape_text, xml_name};
use crate::split::SplitDescriptor;
use csv::StringRecord;
use serde_json::{Map, Value};
use std::io::{BufRead, BufReader};
use std::sync::Arc;

fn builder(delimiter: u8) -> csv::ReaderBuilder {
    let mut b = csv::ReaderBuilder::new();
    b.has_headers(false).flexible(true).delimiter(delimiter);
    b
}

fn header_of(row: &StringRecord) -> Arc<[String]> {
    row.iter()
        .enumerate()
        .map(|(i, name)| match i {
            0 => name.trim_start_matches('\u{feff}').to_string(),
            _ => name.to_string(),
        })
        .collect()
}

/// Read the header row of an uncompressed delimited container.
pub fn read_header(
    source: &dyn ContainerSource,
    path: &str,
    delimiter: u8,
) -> LoadResult<Option<Arc<[String]>>> {
    let mut rdr = builder(delimiter).from_reader(BufReader::new(source.open(path)?));
    let mut row = StringRecord::new();
    let found = rdr.read_record(&mut row).map_err(|e| LoadError::Csv {
        location: SourceLocation::new(path).at_offset(0),
        source: e,
    })?;
    Ok(found.then(|| header_of(&row)))
}

/// How rows turn into content.
struct RowShape {
    root: String,
    output: DelimitedOutput,
    delimiter: char,
}

impl RowShape {
    fn render(&self, columns: &[String], row: &StringRecord, location: &SourceLocation) -> LoadResult<String> {
        match self.output {
            DelimitedOutput::Xml => {
                let mut out = format!("<{}>", self.root);
                for (col, value) in columns.iter().zip(row.iter()) {
                    out.push_str(&format!("<{col}>{}</{col}>", escape_text(value)));
                }
                out.push_str(&format!("</{}>", self.root));
                Ok(out)
            }
            DelimitedOutput::Json => {
                let map: Map<String, Value> = columns
                    .iter()
                    .zip(row.iter())
                    .map(|(col, value)| (col.clone(), Value::String(value.to_string())))
                    .collect();
                serde_json::to_string(&Value::Object(map)).map_err(|e| LoadError::Json {
                    location: location.clone(),
                    source: e,
                })
            }
        }
    }

    fn raw(&self, row: &StringRecord) -> String {
        row.iter()
            .collect::<Vec<_>>()
            .join(&self.delimiter.to_string())
    }
}

struct ActiveTable {
    rows: csv::Reader<BoxedBufRead>,
    /// Absolute offset of the first byte handed to `rows`.
    base: u64,
    end: Option<u64>,
    origin: bool,
    header: Arc<[String]>,
    /// Header names as element or property names.
    columns: Vec<String>,
    id_index: Option<usize>,
    ids: IdGenerator,
    location: SourceLocation,
}

impl ActiveTable {
    fn next_row(&mut self, shape: &RowShape) -> LoadResult<Option<DocumentRecord>> {
        let mut row = StringRecord::new();
        let more = self.rows.read_record(&mut row).map_err(|e| LoadError::Csv {
            location: self.location.clone(),
            source: e,
        })?;
        if !more {
            return Ok(None);
        }
        let (byte, line) = row
            .position()
            .map_or((0, 0), |p| (p.byte(), p.line()));
        let offset = self.base + byte;
        if self.end.is_some_and(|end| offset > end) {
            return Ok(None);
        }
        let mut location = self.location.clone().at_offset(offset);
        if self.origin {
            location = location.at_line(line);
        }

        if row.len() != self.header.len() {
            tracing::warn!(
                location = %location,
                expected = self.header.len(),
                found = row.len(),
                "row field count differs from header; skipping row"
            );
            return Ok(Some(DocumentRecord::skipped(
                String::new(),
                Content::Text(shape.raw(&row)),
                location,
            )));
        }

        let id = match self.id_index {
            Some(i) => row.get(i).unwrap_or_default().to_string(),
            None => self.ids.next_id(),
        };
        let content = Content::Text(shape.render(&self.columns, &row, &location)?);
        if id.is_empty() {
            tracing::debug!(location = %location, "empty identifier column; skipping row");
            return Ok(Some(DocumentRecord::skipped(id, content, location)));
        }
        Ok(Some(DocumentRecord::new(id, content, location)))
    }
}

pub struct DelimitedTextReader {
    split: SplitDescriptor,
    delimiter: u8,
    shape: RowShape,
    id_source: IdSource,
    /// Configured column names; the first row is then data.
    fields: Option<Arc<[String]>>,
    /// Header of the container, for readers that start mid-container.
    header: Option<Arc<[String]>>,
    streams: ContainerStreams,
    active: Option<ActiveTable>,
    done: bool,
    closed: bool,
}

impl DelimitedTextReader {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let delimiter = u8::try_from(config.delimiter)
            .map_err(|_| LoadError::Config(format!("delimiter {:?} is not one byte", config.delimiter)))?;
        let streams = ContainerStreams::open(source, registry, config, &split)?;
        let fields: Option<Arc<[String]>> = config
            .delimited_fields
            .as_ref()
            .map(|f| f.iter().cloned().collect());
        let mut header = split.header.clone();
        if fields.is_none() && header.is_none() && !split.is_origin() {
            header = read_header(source, &split.path, delimiter)?;
        }
        Ok(Self {
            delimiter,
            shape: RowShape {
                root: xml_name(&config.delimited_root),
                output: config.delimited_output,
                delimiter: config.delimiter,
            },
            id_source: config.id_source.clone(),
            fields,
            header,
            split,
            streams,
            active: None,
            done: false,
            closed: false,
        })
    }

    fn activate(&self, stream: SplitStream) -> LoadResult<Option<ActiveTable>> {
        let location = stream.location();
        let origin = stream.is_origin();
        let ids = match &stream.entry {
            Some(entry) => IdGenerator::for_entry(&stream.path, entry, 0),
            None => IdGenerator::new(&stream.path, self.split.start),
        };
        let mut reader = stream.reader;
        let mut base = stream.start;
        if !origin {
            let mut partial = Vec::new();
            let n = reader
                .read_until(b'\n', &mut partial)
                .map_err(|e| LoadError::io(location.clone().at_offset(base), e))?;
            base += n as u64;
        }
        let mut rows = builder(self.delimiter).from_reader(reader);

        let header = match (&self.fields, origin) {
            (Some(fields), _) => fields.clone(),
            (None, true) => {
                let mut first = StringRecord::new();
                let found = rows.read_record(&mut first).map_err(|e| LoadError::Csv {
                    location: location.clone().at_offset(0),
                    source: e,
                })?;
                if !found {
                    tracing::trace!(location = %location, "empty delimited stream");
                    return Ok(None);
                }
                header_of(&first)
            }
            (None, false) => self
                .header
                .clone()
                .ok_or_else(|| self.split.invalid("delimited header is unknown"))?,
        };

        let id_index = match &self.id_source {
            IdSource::Column(name) => Some(
                header
                    .iter()
                    .position(|h| h.trim() == name.trim())
                    .ok_or_else(|| {
                        LoadError::malformed(
                            location.clone(),
                            format!("identifier column `{name}` is not in the header"),
                        )
                    })?,
            ),
            _ => None,
        };
        let columns = header.iter().map(|h| xml_name(h)).collect();
        Ok(Some(ActiveTable {
            rows,
            base,
            end: stream.end,
            origin,
            header,
            columns,
            id_index,
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
            match active.next_row(&self.shape)? {
                Some(record) => return Ok(Some(record)),
                None => self.active = None,
            }
        }
    }
}

impl RecordReader for DelimitedTextReader {
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
