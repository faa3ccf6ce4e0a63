//! In-memory container builders.

use crate::io::sequencefile::{BYTES_CLASS, MAGIC, SYNC_SIZE, TEXT_CLASS, VERSION};
use std::fmt::Write as _;
use std::io::{Cursor, Write};

/// Zip archive bytes. `None` content makes a directory entry.
///
/// # Panics
///
/// Panics if the zip writer fails, which only happens on a bad entry name.
#[must_use]
pub fn zip_bytes(entries: &[(&str, Option<&[u8]>)]) -> Vec<u8> {
    let mut zip = ::zip::ZipWriter::new(Cursor::new(Vec::new()));
    let options = ::zip::write::FileOptions::default()
        .compression_method(::zip::CompressionMethod::Deflated);
    for (name, content) in entries {
        match content {
            Some(bytes) => {
                zip.start_file(*name, options).expect("start zip entry");
                zip.write_all(bytes).expect("write zip entry");
            }
            None => {
                zip.add_directory(name.trim_end_matches('/'), options)
                    .expect("add zip directory");
            }
        }
    }
    zip.finish().expect("finish zip").into_inner()
}

/// Gzip-compress `bytes`.
///
/// # Panics
///
/// Panics if writing to the in-memory encoder fails.
#[cfg(feature = "compression-gzip")]
#[must_use]
pub fn gzip_bytes(bytes: &[u8]) -> Vec<u8> {
    use flate2::{Compression, write::GzEncoder};
    let mut enc = GzEncoder::new(Vec::new(), Compression::default());
    enc.write_all(bytes).expect("gzip write");
    enc.finish().expect("gzip finish")
}

/// Aggregate XML with `n` records under a namespaced root:
///
/// ```text
/// <?xml version="1.0"?>
/// <catalog xmlns="urn:catalog" xmlns:x="urn:extra">
///   <item><id>0</id><x:note>item &amp; 0</x:note></item>
///   ...
/// </catalog>
/// ```
#[must_use]
pub fn aggregate_xml(n: usize) -> String {
    let mut out = String::from("<?xml version=\"1.0\"?>\n<catalog xmlns=\"urn:catalog\" xmlns:x=\"urn:extra\">\n");
    for i in 0..n {
        let _ = writeln!(
            out,
            "  <item><id>{i}</id><x:note>item &amp; {i}</x:note></item>"
        );
    }
    out.push_str("</catalog>\n");
    out
}

/// N-Triples with `n` statements, each with a distinct subject.
#[must_use]
pub fn ntriples(n: usize) -> String {
    (0..n)
        .map(|i| format!("<http://example.org/s{i}> <http://example.org/p> \"value {i}\" .\n"))
        .collect()
}

/// Value class of a [`SequenceFileBuilder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeqValues {
    Text,
    Bytes,
}

/// Builds an uncompressed version-6 Hadoop sequence file with `Text` keys.
///
/// ```
/// use ironload::testing::{SeqValues, SequenceFileBuilder};
///
/// let bytes = SequenceFileBuilder::new(SeqValues::Text)
///     .sync_every(10)
///     .records((0..25).map(|i| (format!("/k{i}"), format!("v{i}").into_bytes())))
///     .build();
/// assert_eq!(&bytes[..3], b"SEQ");
/// ```
#[derive(Clone, Debug)]
pub struct SequenceFileBuilder {
    values: SeqValues,
    sync: [u8; SYNC_SIZE],
    sync_every: usize,
    metadata: Vec<(String, String)>,
    records: Vec<(String, Vec<u8>)>,
}

impl SequenceFileBuilder {
    #[must_use]
    pub fn new(values: SeqValues) -> Self {
        let mut sync = [0u8; SYNC_SIZE];
        for (i, b) in sync.iter_mut().enumerate() {
            *b = 0xa5 ^ (i as u8).wrapping_mul(37);
        }
        Self {
            values,
            sync,
            sync_every: 0,
            metadata: Vec::new(),
            records: Vec::new(),
        }
    }

    /// Write a sync marker before every `n`th record; 0 means never.
    #[must_use]
    pub fn sync_every(mut self, n: usize) -> Self {
        self.sync_every = n;
        self
    }

    #[must_use]
    pub fn metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.push((key.to_string(), value.to_string()));
        self
    }

    #[must_use]
    pub fn records<I: IntoIterator<Item = (String, Vec<u8>)>>(mut self, records: I) -> Self {
        self.records.extend(records);
        self
    }

    #[must_use]
    pub fn sync_marker(&self) -> [u8; SYNC_SIZE] {
        self.sync
    }

    #[must_use]
    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        write_string(&mut out, TEXT_CLASS);
        write_string(
            &mut out,
            match self.values {
                SeqValues::Text => TEXT_CLASS,
                SeqValues::Bytes => BYTES_CLASS,
            },
        );
        out.push(0);
        out.push(0);
        out.extend_from_slice(&(self.metadata.len() as i32).to_be_bytes());
        for (k, v) in &self.metadata {
            write_string(&mut out, k);
            write_string(&mut out, v);
        }
        out.extend_from_slice(&self.sync);

        for (i, (key, value)) in self.records.iter().enumerate() {
            if self.sync_every > 0 && i > 0 && i % self.sync_every == 0 {
                out.extend_from_slice(&(-1i32).to_be_bytes());
                out.extend_from_slice(&self.sync);
            }
            let mut k = Vec::new();
            write_string(&mut k, key);
            let mut v = Vec::new();
            match self.values {
                SeqValues::Text => {
                    write_vlong(&mut v, value.len() as i64);
                    v.extend_from_slice(value);
                }
                SeqValues::Bytes => {
                    v.extend_from_slice(&(value.len() as i32).to_be_bytes());
                    v.extend_from_slice(value);
                }
            }
            out.extend_from_slice(&((k.len() + v.len()) as i32).to_be_bytes());
            out.extend_from_slice(&(k.len() as i32).to_be_bytes());
            out.extend_from_slice(&k);
            out.extend_from_slice(&v);
        }
        out
    }
}

/// Hadoop `WritableUtils.writeVLong`.
pub fn write_vlong(out: &mut Vec<u8>, value: i64) {
    if (-112..=127).contains(&value) {
        out.push(value as u8);
        return;
    }
    let (mut len, magnitude) = if value < 0 { (-120i32, !value) } else { (-112i32, value) };
    let mut tmp = magnitude;
    while tmp != 0 {
        tmp >>= 8;
        len -= 1;
    }
    out.push(len as u8);
    let bytes = if len < -120 { -(len + 120) } else { -(len + 112) };
    for idx in (0..bytes).rev() {
        out.push((magnitude >> (idx * 8)) as u8);
    }
}

/// A serialized `Text`: vlong length then UTF-8 bytes.
fn write_string(out: &mut Vec<u8>, s: &str) {
    write_vlong(out, s.len() as i64);
    out.extend_from_slice(s.as_bytes());
}
