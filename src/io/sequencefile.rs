//! Hadoop SequenceFile reader (version 6, uncompressed).
//!
//! Layout: `SEQ` + version byte, key and value class names as vint-prefixed
//! strings, record/block compression flags, a metadata map and a 16-byte sync
//! marker. Each record is `i32 record_len, i32 key_len, key, value`; a record
//! length of `-1` escapes a sync marker instead.
//!
//! Splits align on sync markers. A reader that starts mid-file skips to the
//! first sync marker at or after its start. It stops at the first record that
//! begins at or after its end once a sync marker has been crossed, so the
//! records between the nominal end and the next marker stay with this split.

use crate::config::ReaderConfig;
use crate::cursor::RecordReader;
use crate::document::{Content, DocumentRecord, SourceLocation};
use crate::error::{LoadError, LoadResult, report};
use crate::io::compression::{BoxedBufRead, ContainerStreams, Decoding};
use crate::io::source::ContainerSource;
use crate::split::SplitDescriptor;
use std::io::{BufReader, Read};

pub const MAGIC: &[u8; 3] = b"SEQ";
pub const VERSION: u8 = 6;
pub const SYNC_SIZE: usize = 16;
/// Record length announcing a sync marker.
const SYNC_ESCAPE: i32 = -1;

pub const TEXT_CLASS: &str = "org.apache.hadoop.io.Text";
pub const BYTES_CLASS: &str = "org.apache.hadoop.io.BytesWritable";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum ValueKind {
    Text,
    Bytes,
}

/// Parsed file header.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeqHeader {
    pub key_class: String,
    pub value_class: String,
    pub metadata: Vec<(String, String)>,
    pub sync: [u8; SYNC_SIZE],
    /// Offset of the first record.
    pub len: u64,
}

/// Byte reader that tracks its absolute offset.
struct Input {
    inner: BoxedBufRead,
    pos: u64,
    /// Container length; no declared length may reach past it.
    limit: u64,
    location: SourceLocation,
}

impl Input {
    fn err(&self, e: std::io::Error) -> LoadError {
        LoadError::io(self.location.clone().at_offset(self.pos), e)
    }

    fn truncated(&self, what: &str) -> LoadError {
        LoadError::malformed(
            self.location.clone().at_offset(self.pos),
            format!("sequence file ends inside {what}"),
        )
    }

    /// Fill `buf`; `Ok(false)` on a clean end of stream before the first byte.
    fn fill(&mut self, buf: &mut [u8], what: &str) -> LoadResult<bool> {
        let mut got = 0;
        while got < buf.len() {
            let n = self.inner.read(&mut buf[got..]).map_err(|e| self.err(e))?;
            if n == 0 {
                return if got == 0 { Ok(false) } else { Err(self.truncated(what)) };
            }
            got += n;
            self.pos += n as u64;
        }
        Ok(true)
    }

    fn exact(&mut self, buf: &mut [u8], what: &str) -> LoadResult<()> {
        if buf.is_empty() || self.fill(buf, what)? {
            Ok(())
        } else {
            Err(self.truncated(what))
        }
    }

    /// Read a length-prefixed field of `len` bytes. The length comes from the
    /// file, so it is checked against what remains before allocating.
    fn take(&mut self, len: u64, what: &str) -> LoadResult<Vec<u8>> {
        let remaining = self.limit.saturating_sub(self.pos);
        if len > remaining {
            return Err(LoadError::malformed(
                self.location.clone().at_offset(self.pos),
                format!("{what} declares {len} bytes but only {remaining} remain"),
            ));
        }
        let mut buf = vec![0u8; len as usize];
        self.exact(&mut buf, what)?;
        Ok(buf)
    }

    fn byte(&mut self, what: &str) -> LoadResult<u8> {
        let mut b = [0u8; 1];
        self.exact(&mut b, what)?;
        Ok(b[0])
    }

    fn i32_or_eof(&mut self, what: &str) -> LoadResult<Option<i32>> {
        let mut b = [0u8; 4];
        Ok(self.fill(&mut b, what)?.then(|| i32::from_be_bytes(b)))
    }

    fn i32(&mut self, what: &str) -> LoadResult<i32> {
        self.i32_or_eof(what)?.ok_or_else(|| self.truncated(what))
    }

    fn vlong(&mut self) -> LoadResult<i64> {
        let first = self.byte("a variable-length integer")? as i8;
        let (len, negative) = vint_size(first);
        if len == 1 {
            return Ok(first as i64);
        }
        let mut value: i64 = 0;
        for _ in 0..len - 1 {
            value = (value << 8) | self.byte("a variable-length integer")? as i64;
        }
        Ok(if negative { !value } else { value })
    }

    fn string(&mut self, what: &str) -> LoadResult<String> {
        let len = self.vlong()?;
        let len = u64::try_from(len).map_err(|_| {
            LoadError::malformed(self.location.clone().at_offset(self.pos), format!("negative length for {what}"))
        })?;
        let buf = self.take(len, what)?;
        String::from_utf8(buf).map_err(|_| {
            LoadError::malformed(self.location.clone().at_offset(self.pos), format!("{what} is not UTF-8"))
        })
    }

    /// Skip to just past the next occurrence of `sync`. `false` at end of stream.
    fn seek_sync(&mut self, sync: &[u8; SYNC_SIZE]) -> LoadResult<bool> {
        let mut window: Vec<u8> = Vec::with_capacity(SYNC_SIZE);
        loop {
            let mut b = [0u8; 1];
            if !self.fill(&mut b, "a sync marker")? {
                return Ok(false);
            }
            if window.len() == SYNC_SIZE {
                window.remove(0);
            }
            window.push(b[0]);
            if window.as_slice() == sync {
                return Ok(true);
            }
        }
    }
}

/// Byte count and sign of a Hadoop vint from its first byte.
fn vint_size(first: i8) -> (usize, bool) {
    if first >= -112 {
        (1, first < 0)
    } else if first < -120 {
        ((-119 - first as i32) as usize, true)
    } else {
        ((-111 - first as i32) as usize, false)
    }
}

/// Decode a Hadoop vint from the front of `bytes`; returns value and width.
fn decode_vint(bytes: &[u8]) -> Option<(i64, usize)> {
    let first = *bytes.first()? as i8;
    let (len, negative) = vint_size(first);
    if len == 1 {
        return Some((first as i64, 1));
    }
    let tail = bytes.get(1..len)?;
    let value = tail.iter().fold(0i64, |acc, &b| (acc << 8) | b as i64);
    Some((if negative { !value } else { value }, len))
}

fn read_header_from(input: &mut Input) -> LoadResult<SeqHeader> {
    let mut magic = [0u8; 4];
    input.exact(&mut magic, "the file header")?;
    if &magic[..3] != MAGIC {
        return Err(LoadError::malformed(
            input.location.clone().at_offset(0),
            "not a sequence file",
        ));
    }
    if magic[3] != VERSION {
        return Err(LoadError::malformed(
            input.location.clone().at_offset(3),
            format!("sequence file version {} is not supported", magic[3]),
        ));
    }
    let key_class = input.string("the key class name")?;
    let value_class = input.string("the value class name")?;
    let compressed = input.byte("the compression flag")? != 0;
    let block = input.byte("the block compression flag")? != 0;
    if compressed || block {
        let codec = input.string("the codec class name")?;
        return Err(LoadError::UnsupportedCodec {
            location: input.location.clone(),
            codec: format!("{} ({codec})", if block { "block" } else { "record" }),
        });
    }
    let count = input.i32("the metadata count")?;
    let mut metadata = Vec::new();
    for _ in 0..count.max(0) {
        let k = input.string("a metadata key")?;
        let v = input.string("a metadata value")?;
        metadata.push((k, v));
    }
    let mut sync = [0u8; SYNC_SIZE];
    input.exact(&mut sync, "the sync marker")?;
    Ok(SeqHeader {
        key_class,
        value_class,
        metadata,
        sync,
        len: input.pos,
    })
}

/// Read the header of a sequence file from byte 0.
pub fn read_header(source: &dyn ContainerSource, path: &str) -> LoadResult<SeqHeader> {
    let mut input = Input {
        inner: Box::new(BufReader::new(source.open(path)?)),
        pos: 0,
        limit: source.len(path)?,
        location: SourceLocation::new(path),
    };
    read_header_from(&mut input)
}

pub struct SequenceFileReader {
    split: SplitDescriptor,
    config: ReaderConfig,
    header: SeqHeader,
    container_len: u64,
    value_kind: ValueKind,
    streams: ContainerStreams,
    input: Option<Input>,
    /// A sync marker was crossed since the last record.
    sync_seen: bool,
    done: bool,
    closed: bool,
}

impl SequenceFileReader {
    pub fn open(
        source: &dyn ContainerSource,
        config: &ReaderConfig,
        split: SplitDescriptor,
    ) -> LoadResult<Self> {
        let header = read_header(source, &split.path)?;
        let container_len = source.len(&split.path)?;
        let location = SourceLocation::new(split.path.clone());
        if !header.key_class.ends_with(".Text") {
            return Err(LoadError::malformed(
                location,
                format!("key class {} is not supported; keys must be Text", header.key_class),
            ));
        }
        let value_kind = if header.value_class.ends_with(".Text") {
            ValueKind::Text
        } else if header.value_class.ends_with(".BytesWritable") {
            ValueKind::Bytes
        } else {
            return Err(LoadError::malformed(
                location,
                format!("value class {} is not supported", header.value_class),
            ));
        };
        let streams = ContainerStreams::open_with(source, Decoding::Raw, &split)?;
        Ok(Self {
            split,
            config: config.clone(),
            header,
            container_len,
            value_kind,
            streams,
            input: None,
            sync_seen: false,
            done: false,
            closed: false,
        })
    }

    /// Position the split stream on its first owned record.
    fn position(&mut self) -> LoadResult<bool> {
        let Some(stream) = self.streams.next_stream()? else {
            return Ok(false);
        };
        let mut input = Input {
            location: stream.location(),
            pos: stream.start,
            limit: self.container_len,
            inner: stream.reader,
        };
        if input.pos <= self.header.len {
            input.take(self.header.len - input.pos, "the file header")?;
            // The header ends with a sync marker.
            self.sync_seen = true;
        } else {
            let mut escape = [0u8; 4];
            if !input.fill(&mut escape, "a sync escape")? || !input.seek_sync(&self.header.sync)? {
                tracing::trace!(split = %self.split, "no sync marker inside split");
                return Ok(false);
            }
            self.sync_seen = true;
        }
        self.input = Some(input);
        Ok(true)
    }

    fn advance(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.done {
            return Ok(None);
        }
        if self.input.is_none() && !self.position()? {
            self.done = true;
            return Ok(None);
        }
        let Some(input) = self.input.as_mut() else {
            return Ok(None);
        };
        let end = self.split.end();
        let offset = input.pos;
        let Some(mut len) = input.i32_or_eof("a record length")? else {
            self.done = true;
            return Ok(None);
        };
        if len == SYNC_ESCAPE {
            let mut sync = [0u8; SYNC_SIZE];
            input.exact(&mut sync, "a sync marker")?;
            if sync != self.header.sync {
                return Err(LoadError::malformed(
                    input.location.clone().at_offset(offset),
                    "sync marker does not match the file header",
                ));
            }
            self.sync_seen = true;
            let Some(next) = input.i32_or_eof("a record length")? else {
                self.done = true;
                return Ok(None);
            };
            len = next;
        }
        if offset >= end && self.sync_seen {
            self.done = true;
            return Ok(None);
        }
        self.sync_seen = false;

        let key_len = input.i32("a key length")?;
        if len < 0 || key_len < 0 || key_len > len {
            return Err(LoadError::malformed(
                input.location.clone().at_offset(offset),
                format!("bad record lengths {len}/{key_len}"),
            ));
        }
        let key = input.take(key_len as u64, "a record key")?;
        let value = input.take((len - key_len) as u64, "a record value")?;

        let location = input.location.clone().at_offset(offset);
        let id = decode_text(&key, &location)?;
        let content = match self.value_kind {
            ValueKind::Text => Content::Text(decode_text(&value, &location)?),
            ValueKind::Bytes => {
                let bytes = value.get(4..).ok_or_else(|| {
                    LoadError::malformed(location.clone(), "BytesWritable value shorter than its length")
                })?;
                Content::from_bytes(bytes.to_vec(), self.config.document_type_for(&id))
            }
        };
        if id.is_empty() {
            return Ok(Some(DocumentRecord::skipped(id, content, location)));
        }
        Ok(Some(DocumentRecord::new(id, content, location)))
    }
}

/// Decode a serialized `Text`: vint length then UTF-8 bytes.
fn decode_text(bytes: &[u8], location: &SourceLocation) -> LoadResult<String> {
    let bad = || LoadError::malformed(location.clone(), "malformed Text value");
    let (len, width) = decode_vint(bytes).ok_or_else(bad)?;
    let len = usize::try_from(len).map_err(|_| bad())?;
    let body = bytes.get(width..width + len).ok_or_else(bad)?;
    String::from_utf8(body.to_vec()).map_err(|_| bad())
}

impl RecordReader for SequenceFileReader {
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.closed {
            return Err(LoadError::Closed(self.split.to_string()));
        }
        self.advance().inspect_err(|e| {
            report(e);
            self.input = None;
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
        self.input = None;
        self.closed = true;
        self.done = true;
        Ok(())
    }
}
