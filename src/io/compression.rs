//! Compression adapter between a container and its format reader.
//!
//! Two families of compression are handled:
//!
//! - **Zip containers** hold many entries. Each qualifying entry (not a
//!   directory, not empty) is decompressed fully into memory and handed to the
//!   format reader as its own stream, in physical archive order.
//! - **Stream codecs** (gzip, zstd, bzip2, xz) wrap one continuous stream. They
//!   are never splittable: the stream is always decoded from byte 0, and a split
//!   that does not cover the whole container is rejected with
//!   [`LoadError::InvalidSplit`] instead of silently under-producing records.
//!
//! Uncompressed containers are served as a raw byte range positioned at the
//! split start.
//!
//! ## Codec registry
//!
//! Stream codecs implement [`StreamCodec`] and live in a [`CodecRegistry`]
//! value that the caller owns and passes to readers. Built-in codecs are
//! compiled in behind cargo features:
//! - **Gzip** (`.gz`) via `flate2` (feature: `compression-gzip`)
//! - **Zstd** (`.zst`) via `zstd` (feature: `compression-zstd`)
//! - **Bzip2** (`.bz2`) via `bzip2` (feature: `compression-bzip2`)
//! - **Xz** (`.xz`) via `xz2` (feature: `compression-xz`)
//!
//! A codec named in configuration but not compiled in is reported as
//! [`LoadError::UnsupportedCodec`].
//!
//! ```
//! use ironload::io::compression::{CodecRegistry, StreamCodec};
//! use std::io::Read;
//!
//! struct Identity;
//!
//! impl StreamCodec for Identity {
//!     fn name(&self) -> &str { "identity" }
//!     fn extensions(&self) -> &[&str] { &[".id"] }
//!     fn magic_bytes(&self) -> Option<&[u8]> { None }
//!     fn wrap_reader(&self, r: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
//!         Ok(r)
//!     }
//! }
//!
//! let mut registry = CodecRegistry::new();
//! registry.register(std::sync::Arc::new(Identity));
//! assert!(registry.by_name("identity").is_some());
//! assert_eq!(registry.strip_extension("dump.xml.id"), Some("dump.xml"));
//! ```
//!
//! ## Detection
//!
//! With `compression = auto`, the container's extension is checked first
//! (`.zip`, then registered codec extensions), falling back to magic bytes only
//! when the extension is not recognized.

use crate::config::{CompressionKind, ReaderConfig};
use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use crate::io::source::{ContainerSource, ReadSeek};
use crate::io::zip::ZipEntries;
use crate::split::SplitDescriptor;
use std::fmt;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Local file header signature of a zip archive.
pub const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// End-of-central-directory signature; an empty zip archive starts with it.
const ZIP_EMPTY_MAGIC: &[u8] = b"PK\x05\x06";

/// Pluggable whole-stream compression codec.
///
/// Implementations must be `Send + Sync`: one registry is shared by every
/// reader of a job, and readers run on worker threads.
pub trait StreamCodec: Send + Sync {
    /// Codec name as used in configuration (e.g. "gzip").
    fn name(&self) -> &str;

    /// Lowercase extensions with leading dot (e.g. `&[".gz"]`).
    fn extensions(&self) -> &[&str];

    /// Signature at the start of an encoded stream, if the format has one.
    fn magic_bytes(&self) -> Option<&[u8]>;

    /// Wrap a reader with decompression.
    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>>;
}

/// The set of stream codecs available to a job.
#[derive(Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn StreamCodec>>,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.codecs.iter().map(|c| c.name().to_string()))
            .finish()
    }
}

impl CodecRegistry {
    /// Registry with every built-in codec that was compiled in.
    pub fn new() -> Self {
        Self {
            codecs: vec![
                #[cfg(feature = "compression-gzip")]
                Arc::new(GzipCodec),
                #[cfg(feature = "compression-zstd")]
                Arc::new(ZstdCodec),
                #[cfg(feature = "compression-bzip2")]
                Arc::new(Bzip2Codec),
                #[cfg(feature = "compression-xz")]
                Arc::new(XzCodec),
            ],
        }
    }

    /// Registry without any codec.
    pub fn empty() -> Self {
        Self { codecs: Vec::new() }
    }

    /// Add a codec. Later registrations win on name clashes.
    pub fn register(&mut self, codec: Arc<dyn StreamCodec>) {
        self.codecs.insert(0, codec);
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn StreamCodec>> {
        self.codecs
            .iter()
            .find(|c| c.name().eq_ignore_ascii_case(name))
            .cloned()
    }

    /// Codec whose extension ends `path`, case-insensitively.
    pub fn detect_from_extension(&self, path: &str) -> Option<Arc<dyn StreamCodec>> {
        self.codecs
            .iter()
            .find(|c| c.extensions().iter().any(|ext| stem_len(path, ext).is_some()))
            .cloned()
    }

    /// Codec whose signature starts `head`.
    pub fn detect_from_magic(&self, head: &[u8]) -> Option<Arc<dyn StreamCodec>> {
        self.codecs
            .iter()
            .find(|c| c.magic_bytes().is_some_and(|m| head.starts_with(m)))
            .cloned()
    }

    /// `path` without its codec extension, when it has one.
    pub fn strip_extension<'a>(&self, path: &'a str) -> Option<&'a str> {
        self.codecs.iter().find_map(|c| {
            c.extensions()
                .iter()
                .find_map(|ext| stem_len(path, ext))
                .and_then(|cut| path.get(..cut))
        })
    }
}

/// Byte length of `path` before a trailing `ext`, ASCII case-insensitive.
/// `None` when `ext` does not end `path` on a char boundary.
fn stem_len(path: &str, ext: &str) -> Option<usize> {
    let cut = path.len().checked_sub(ext.len())?;
    path.get(cut..)
        .filter(|tail| tail.eq_ignore_ascii_case(ext))
        .map(|_| cut)
}

/// How one container is decoded.
#[derive(Clone)]
pub enum Decoding {
    Raw,
    Zip,
    Stream(Arc<dyn StreamCodec>),
}

impl fmt::Debug for Decoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decoding::Raw => f.write_str("Raw"),
            Decoding::Zip => f.write_str("Zip"),
            Decoding::Stream(c) => write!(f, "Stream({})", c.name()),
        }
    }
}

impl Decoding {
    /// Whether byte-range splits inside the container are meaningful.
    pub fn is_splittable(&self) -> bool {
        matches!(self, Decoding::Raw)
    }
}

/// Decide how `path` is decoded under `kind`.
pub fn resolve_decoding(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    kind: CompressionKind,
    path: &str,
) -> LoadResult<Decoding> {
    match kind {
        CompressionKind::None => Ok(Decoding::Raw),
        CompressionKind::Zip => Ok(Decoding::Zip),
        CompressionKind::Auto => detect(source, registry, path),
        other => {
            let name = other.stream_codec().unwrap_or("unknown");
            registry
                .by_name(name)
                .map(Decoding::Stream)
                .ok_or_else(|| LoadError::UnsupportedCodec {
                    location: SourceLocation::new(path),
                    codec: name.to_string(),
                })
        }
    }
}

fn detect(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    path: &str,
) -> LoadResult<Decoding> {
    if stem_len(path, ".zip").is_some() {
        return Ok(Decoding::Zip);
    }
    if let Some(codec) = registry.detect_from_extension(path) {
        return Ok(Decoding::Stream(codec));
    }
    let mut head = Vec::with_capacity(8);
    source
        .open(path)?
        .take(8)
        .read_to_end(&mut head)
        .map_err(|e| LoadError::io(SourceLocation::new(path), e))?;
    if head.starts_with(ZIP_MAGIC) || head.starts_with(ZIP_EMPTY_MAGIC) {
        return Ok(Decoding::Zip);
    }
    Ok(registry
        .detect_from_magic(&head)
        .map_or(Decoding::Raw, Decoding::Stream))
}

/// Shared byte counter read by `progress()` while the stream is consumed.
#[derive(Clone, Debug, Default)]
pub struct ByteCounter(Arc<AtomicU64>);

impl ByteCounter {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

struct CountingReader<R> {
    inner: R,
    count: ByteCounter,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count.0.fetch_add(n as u64, Ordering::Relaxed);
        Ok(n)
    }
}

pub type BoxedBufRead = Box<dyn BufRead + Send>;

/// One decoded byte stream handed to a format reader.
pub struct SplitStream {
    /// Container path.
    pub path: String,
    /// Zip entry name, for streams taken out of an archive.
    pub entry: Option<String>,
    pub reader: BoxedBufRead,
    /// Offset within the decoded stream at which `reader` is positioned.
    pub start: u64,
    /// Nominal end offset; `None` means read to the end of the stream.
    pub end: Option<u64>,
    /// Decoded size when known up front.
    pub size_hint: Option<u64>,
}

impl SplitStream {
    /// Whether the reader sits at the true beginning of its stream.
    pub fn is_origin(&self) -> bool {
        self.start == 0
    }

    pub fn location(&self) -> SourceLocation {
        SourceLocation::new(self.path.clone()).with_entry(self.entry.clone())
    }

    /// Stream over in-memory bytes, as produced for zip entries.
    pub fn from_bytes(path: impl Into<String>, entry: Option<String>, bytes: Vec<u8>) -> Self {
        let size = bytes.len() as u64;
        Self {
            path: path.into(),
            entry,
            reader: Box::new(Cursor::new(bytes)),
            start: 0,
            end: None,
            size_hint: Some(size),
        }
    }
}

enum Pending {
    Single(Option<SplitStream>),
    Zip(ZipEntries<Box<dyn ReadSeek>>),
}

/// The streams of one split: a single raw range or decoded stream, or one
/// stream per qualifying zip entry.
pub struct ContainerStreams {
    path: String,
    decoding: Decoding,
    pending: Pending,
    counter: ByteCounter,
    /// Denominator for byte-based progress.
    span: u64,
}

impl ContainerStreams {
    pub fn open(
        source: &dyn ContainerSource,
        registry: &CodecRegistry,
        config: &ReaderConfig,
        split: &SplitDescriptor,
    ) -> LoadResult<Self> {
        let decoding = resolve_decoding(source, registry, config.compression, &split.path)?;
        Self::open_with(source, decoding, split)
    }

    pub fn open_with(
        source: &dyn ContainerSource,
        decoding: Decoding,
        split: &SplitDescriptor,
    ) -> LoadResult<Self> {
        let path = split.path.clone();
        let counter = ByteCounter::default();
        tracing::trace!(split = %split, decoding = ?decoding, "opening container");
        let (pending, span) = match &decoding {
            Decoding::Raw => {
                let raw = source.open_at(&path, split.start)?;
                let reader = CountingReader {
                    inner: raw,
                    count: counter.clone(),
                };
                let stream = SplitStream {
                    path: path.clone(),
                    entry: None,
                    reader: Box::new(BufReader::new(reader)),
                    start: split.start,
                    end: Some(split.end()),
                    size_hint: None,
                };
                (Pending::Single(Some(stream)), split.length)
            }
            Decoding::Stream(codec) => {
                let total = source.len(&path)?;
                if split.start != 0 || split.end() < total {
                    return Err(split.invalid(format!(
                        "{} streams cannot be split; use one split per container",
                        codec.name()
                    )));
                }
                let raw: Box<dyn Read + Send> = Box::new(CountingReader {
                    inner: source.open(&path)?,
                    count: counter.clone(),
                });
                let decoded = codec
                    .wrap_reader(raw)
                    .map_err(|e| LoadError::io(SourceLocation::new(path.clone()), e))?;
                let stream = SplitStream {
                    path: path.clone(),
                    entry: None,
                    reader: Box::new(BufReader::new(decoded)),
                    start: 0,
                    end: None,
                    size_hint: None,
                };
                (Pending::Single(Some(stream)), total)
            }
            Decoding::Zip => {
                if split.start != 0 {
                    return Err(split.invalid("zip containers cannot be split"));
                }
                let entries = ZipEntries::new(&path, source.open(&path)?)?;
                (Pending::Zip(entries), 0)
            }
        };
        Ok(Self {
            path,
            decoding,
            pending,
            counter,
            span,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn decoding(&self) -> &Decoding {
        &self.decoding
    }

    pub fn is_zip(&self) -> bool {
        matches!(self.decoding, Decoding::Zip)
    }

    /// Next stream, or `None` when the split has no more.
    pub fn next_stream(&mut self) -> LoadResult<Option<SplitStream>> {
        match &mut self.pending {
            Pending::Single(slot) => Ok(slot.take()),
            Pending::Zip(entries) => Ok(entries
                .next_entry()?
                .map(|e| SplitStream::from_bytes(self.path.clone(), Some(e.name), e.bytes))),
        }
    }

    /// Fraction of the split consumed so far.
    pub fn progress(&self) -> f32 {
        let frac = match &self.pending {
            Pending::Zip(entries) => entries.progress(),
            Pending::Single(_) if self.span == 0 => 1.0,
            Pending::Single(_) => self.counter.get() as f32 / self.span as f32,
        };
        frac.clamp(0.0, 1.0)
    }
}

// ============================================================================
// Built-in codecs
// ============================================================================

#[cfg(feature = "compression-gzip")]
struct GzipCodec;

#[cfg(feature = "compression-gzip")]
impl StreamCodec for GzipCodec {
    fn name(&self) -> &str {
        "gzip"
    }

    fn extensions(&self) -> &[&str] {
        &[".gz", ".gzip"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x1f, 0x8b])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        // Concatenated members are one logical stream.
        Ok(Box::new(flate2::read::MultiGzDecoder::new(reader)))
    }

}

#[cfg(feature = "compression-zstd")]
struct ZstdCodec;

#[cfg(feature = "compression-zstd")]
impl StreamCodec for ZstdCodec {
    fn name(&self) -> &str {
        "zstd"
    }

    fn extensions(&self) -> &[&str] {
        &[".zst", ".zstd"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0x28, 0xb5, 0x2f, 0xfd])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        zstd::stream::read::Decoder::new(reader).map(|d| Box::new(d) as Box<dyn Read + Send>)
    }

}

#[cfg(feature = "compression-bzip2")]
struct Bzip2Codec;

#[cfg(feature = "compression-bzip2")]
impl StreamCodec for Bzip2Codec {
    fn name(&self) -> &str {
        "bzip2"
    }

    fn extensions(&self) -> &[&str] {
        &[".bz2", ".bzip2"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(b"BZh")
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(bzip2::read::MultiBzDecoder::new(reader)))
    }

}

#[cfg(feature = "compression-xz")]
struct XzCodec;

#[cfg(feature = "compression-xz")]
impl StreamCodec for XzCodec {
    fn name(&self) -> &str {
        "xz"
    }

    fn extensions(&self) -> &[&str] {
        &[".xz"]
    }

    fn magic_bytes(&self) -> Option<&[u8]> {
        Some(&[0xfd, 0x37, 0x7a, 0x58, 0x5a, 0x00])
    }

    fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
        Ok(Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)))
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::source::MemorySource;

    #[test]
    fn registry_strips_codec_extensions() {
        let reg = CodecRegistry::new();
        if reg.by_name("gzip").is_some() {
            assert_eq!(reg.strip_extension("a/b.xml.GZ"), Some("a/b.xml"));
        }
        assert_eq!(reg.strip_extension("a/b.xml"), None);
    }

    struct KelvinCodec;

    impl StreamCodec for KelvinCodec {
        fn name(&self) -> &str {
            "kelvin"
        }

        fn extensions(&self) -> &[&str] {
            &[".k"]
        }

        fn magic_bytes(&self) -> Option<&[u8]> {
            None
        }

        fn wrap_reader(&self, reader: Box<dyn Read + Send>) -> std::io::Result<Box<dyn Read + Send>> {
            Ok(reader)
        }
    }

    #[test]
    fn extension_match_respects_char_boundaries() {
        let mut reg = CodecRegistry::empty();
        reg.register(Arc::new(KelvinCodec));
        // U+212A KELVIN SIGN lowercases to an ASCII 'k' but is three bytes long.
        let path = "dump.\u{212A}";
        assert_eq!(reg.strip_extension(path), None);
        assert!(reg.detect_from_extension(path).is_none());
        assert_eq!(reg.strip_extension("dump.K"), Some("dump"));
        assert!(reg.detect_from_extension("dump.K").is_some());
        assert_eq!(reg.strip_extension("é.k"), Some("é"));
    }

    #[test]
    fn unknown_codec_is_unsupported() {
        let src = MemorySource::new().with("a.gz", vec![0x1f, 0x8b]);
        let err = resolve_decoding(&src, &CodecRegistry::empty(), CompressionKind::Gzip, "a.gz")
            .unwrap_err();
        assert!(matches!(err, LoadError::UnsupportedCodec { ref codec, .. } if codec == "gzip"));
    }

    #[test]
    fn auto_detects_zip_by_magic() {
        let src = MemorySource::new().with("bundle", b"PK\x03\x04rest".to_vec());
        let d = resolve_decoding(&src, &CodecRegistry::new(), CompressionKind::Auto, "bundle")
            .unwrap();
        assert!(matches!(d, Decoding::Zip));
    }

    #[test]
    fn auto_falls_back_to_raw() {
        let src = MemorySource::new().with("plain", b"<a/>".to_vec());
        let d = resolve_decoding(&src, &CodecRegistry::new(), CompressionKind::Auto, "plain")
            .unwrap();
        assert!(d.is_splittable());
    }

    #[test]
    fn raw_stream_is_positioned_at_split_start() {
        let src = MemorySource::new().with("f", b"0123456789".to_vec());
        let split = SplitDescriptor::new("f", 4, 3).unwrap();
        let mut streams = ContainerStreams::open_with(&src, Decoding::Raw, &split).unwrap();
        let mut s = streams.next_stream().unwrap().unwrap();
        assert_eq!((s.start, s.end), (4, Some(7)));
        let mut out = String::new();
        s.reader.read_to_string(&mut out).unwrap();
        assert_eq!(out, "456789");
        assert!(streams.next_stream().unwrap().is_none());
        assert_eq!(streams.progress(), 1.0);
    }
}
