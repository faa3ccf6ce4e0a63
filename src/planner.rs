//! Split planning.
//!
//! The planner turns a list of containers into [`SplitDescriptor`]s, one pass
//! per container:
//!
//! 1. **Skip empty containers** -- a zero-length split is invalid.
//! 2. **Keep unsplittable containers whole** -- zip archives, stream codecs,
//!    whole-document formats, and anything at all when `split_input` is off.
//! 3. **Pre-scan aggregate XML** -- one full pass places each split start on a
//!    true record start and captures the namespace bindings and record
//!    identity valid there. Nominal ranges without a record start fold into
//!    the range before them.
//! 4. **Cut line formats by size** -- delimited text, delimited JSON and
//!    N-Triples / N-Quads; delimited text also carries its header row.
//! 5. **Cut sequence files by size** -- sync-marker alignment happens in the
//!    reader.
//!
//! [`Plan`] implements `Display` as an explain listing.

use crate::config::{InputFormat, ReaderConfig};
use crate::io::compression::{CodecRegistry, Decoding, resolve_decoding};
use crate::io::delimited::read_header;
use crate::io::source::ContainerSource;
use crate::io::xml::prescan;
use crate::namespace::NamespaceSnapshot;
use crate::split::{RecordElement, SplitDescriptor, split_ranges};
use crate::document::SourceLocation;
use anyhow::{Context, Result};
use std::fmt::{Display, Formatter, Result as FormatResult};
use std::io::BufReader;

/// A finalized split plan.
#[derive(Clone, Debug, Default)]
pub struct Plan {
    pub splits: Vec<SplitDescriptor>,
    /// Planning decisions, in container order.
    pub notes: Vec<PlanNote>,
}

/// One planning decision worth explaining.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlanNote {
    /// The container is empty and contributes no split.
    SkippedEmpty { path: String },
    /// The container is read as one split.
    Whole { path: String, reason: &'static str },
    /// The container was cut into byte ranges.
    Ranged {
        path: String,
        nominal: usize,
        kept: usize,
    },
    /// The record element was discovered by the pre-scan.
    DiscoveredRecord { path: String, record: RecordElement },
    /// Pre-scan found no record at all.
    NoRecords { path: String },
}

impl Plan {
    /// Total bytes covered by the plan.
    pub fn total_bytes(&self) -> u64 {
        self.splits.iter().map(|s| s.length).sum()
    }

    pub fn len(&self) -> usize {
        self.splits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FormatResult {
        writeln!(f, "┌─ SPLIT PLAN ─────────────────────────────────────────────────┐")?;
        writeln!(f, "│ Splits:            {:>10}", self.splits.len())?;
        writeln!(f, "│ Bytes:             {:>10}", self.total_bytes())?;
        writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        writeln!(f)?;
        writeln!(f, "┌─ SPLITS ─────────────────────────────────────────────────────┐")?;
        for (i, split) in self.splits.iter().enumerate() {
            write!(f, "│ {i:>4}: {split}")?;
            if let Some(first) = split.first_record {
                write!(f, " first record @{first}")?;
            }
            if !split.namespaces.is_empty() {
                write!(f, " ns[{}]", split.namespaces.prefixes().collect::<Vec<_>>().join(","))?;
            }
            if let Some(record) = &split.record_element {
                write!(f, " <{record}>")?;
            }
            if let Some(header) = &split.header {
                write!(f, " header({})", header.len())?;
            }
            writeln!(f)?;
        }
        writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        if !self.notes.is_empty() {
            writeln!(f)?;
            writeln!(f, "┌─ DECISIONS ──────────────────────────────────────────────────┐")?;
            for note in &self.notes {
                match note {
                    PlanNote::SkippedEmpty { path } => writeln!(f, "│ • {path}: empty, skipped")?,
                    PlanNote::Whole { path, reason } => {
                        writeln!(f, "│ • {path}: one split ({reason})")?;
                    }
                    PlanNote::Ranged { path, nominal, kept } => {
                        writeln!(f, "│ • {path}: {nominal} nominal ranges → {kept} splits")?;
                    }
                    PlanNote::DiscoveredRecord { path, record } => {
                        writeln!(f, "│ • {path}: discovered record element <{record}>")?;
                    }
                    PlanNote::NoRecords { path } => writeln!(f, "│ • {path}: no records found")?,
                }
            }
            writeln!(f, "└──────────────────────────────────────────────────────────────┘")?;
        }
        Ok(())
    }
}

/// Plan every container in `paths`.
pub fn plan<S: AsRef<str>>(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    paths: &[S],
) -> Result<Plan> {
    config.validate().context("plan splits")?;
    let mut out = Plan::default();
    for path in paths {
        let path = path.as_ref();
        plan_container(source, registry, config, path, &mut out)
            .with_context(|| format!("plan splits for {path}"))?;
    }
    tracing::debug!(splits = out.splits.len(), bytes = out.total_bytes(), "split plan ready");
    Ok(out)
}

fn whole_reason(config: &ReaderConfig, decoding: &Decoding, len: u64) -> Option<&'static str> {
    if !config.split_input {
        return Some("splitting disabled");
    }
    match decoding {
        Decoding::Zip => return Some("zip container"),
        Decoding::Stream(_) => return Some("stream codec"),
        Decoding::Raw => {}
    }
    match config.format {
        InputFormat::Documents => Some("whole documents"),
        InputFormat::Archive => Some("archive"),
        _ if len <= config.split_size => Some("smaller than split size"),
        _ => None,
    }
}

fn plan_container(
    source: &dyn ContainerSource,
    registry: &CodecRegistry,
    config: &ReaderConfig,
    path: &str,
    out: &mut Plan,
) -> Result<()> {
    let len = source.len(path)?;
    if len == 0 {
        tracing::debug!(path, "skipping empty container");
        out.notes.push(PlanNote::SkippedEmpty { path: path.to_string() });
        return Ok(());
    }
    let decoding = resolve_decoding(source, registry, config.compression, path)?;
    if let Some(reason) = whole_reason(config, &decoding, len) {
        tracing::debug!(path, reason, "planning container as one split");
        out.notes.push(PlanNote::Whole {
            path: path.to_string(),
            reason,
        });
        out.splits.push(SplitDescriptor::whole(path, len)?);
        return Ok(());
    }

    let ranges = split_ranges(len, config.split_size);
    let nominal = ranges.len();
    let before = out.splits.len();
    match config.format {
        InputFormat::Aggregates => plan_aggregate(source, config, path, &ranges, out)?,
        InputFormat::DelimitedText => {
            let header = match &config.delimited_fields {
                Some(_) => None,
                None => read_header(source, path, config.delimiter as u8)?,
            };
            for (start, end) in ranges {
                out.splits
                    .push(SplitDescriptor::new(path, start, end - start)?.with_header(header.clone()));
            }
        }
        // Documents and archives never get here; their readers reject ranged splits.
        _ => {
            for (start, end) in ranges {
                out.splits.push(SplitDescriptor::new(path, start, end - start)?);
            }
        }
    }
    let kept = out.splits.len() - before;
    tracing::debug!(path, nominal, kept, "cut container into ranges");
    out.notes.push(PlanNote::Ranged {
        path: path.to_string(),
        nominal,
        kept,
    });
    Ok(())
}

fn plan_aggregate(
    source: &dyn ContainerSource,
    config: &ReaderConfig,
    path: &str,
    ranges: &[(u64, u64)],
    out: &mut Plan,
) -> Result<()> {
    let len = ranges.last().map_or(0, |r| r.1);
    let configured = config
        .record_element
        .as_ref()
        .map(|name| RecordElement::new(name, config.record_namespace.clone()));
    let boundaries: Vec<u64> = ranges.iter().skip(1).map(|r| r.0).collect();
    let reader = BufReader::new(source.open(path)?);
    let layout = prescan(reader, SourceLocation::new(path), configured.clone(), &boundaries)?;

    let Some(record) = layout.record else {
        out.notes.push(PlanNote::NoRecords { path: path.to_string() });
        out.splits.push(SplitDescriptor::whole(path, len)?);
        return Ok(());
    };
    if configured.is_none() {
        out.notes.push(PlanNote::DiscoveredRecord {
            path: path.to_string(),
            record: record.clone(),
        });
    }

    let mut starts: Vec<(u64, Option<u64>, NamespaceSnapshot)> =
        vec![(0, None, NamespaceSnapshot::empty())];
    starts.extend(
        layout
            .cuts
            .into_iter()
            .map(|c| (c.boundary, Some(c.first_record), c.namespaces)),
    );
    for (i, (start, first, namespaces)) in starts.iter().enumerate() {
        let end = starts.get(i + 1).map_or(len, |next| next.0);
        out.splits.push(
            SplitDescriptor::new(path, *start, end - start)?
                .with_record_element(Some(record.clone()))
                .with_first_record(*first)
                .with_namespaces(namespaces.clone()),
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompressionKind;
    use crate::io::source::MemorySource;

    fn config(format: InputFormat, split_size: u64) -> ReaderConfig {
        ReaderConfig {
            split_input: true,
            split_size,
            ..ReaderConfig::for_format(format)
        }
    }

    #[test]
    fn empty_containers_are_skipped() {
        let src = MemorySource::new().with("e.csv", "");
        let p = plan(&src, &CodecRegistry::new(), &config(InputFormat::DelimitedText, 4), &["e.csv"]).unwrap();
        assert!(p.is_empty());
        assert_eq!(p.notes, vec![PlanNote::SkippedEmpty { path: "e.csv".into() }]);
    }

    #[test]
    fn delimited_splits_carry_header() {
        let src = MemorySource::new().with("t.csv", "id,name\n1,a\n2,b\n3,c\n");
        let p = plan(&src, &CodecRegistry::new(), &config(InputFormat::DelimitedText, 8), &["t.csv"]).unwrap();
        assert_eq!(p.len(), 3);
        assert!(p.splits.iter().all(|s| s.header.as_deref() == Some(&["id".to_string(), "name".to_string()][..])));
        assert_eq!(p.total_bytes(), 20);
    }

    #[test]
    fn aggregate_splits_start_on_records() {
        let xml = "<r xmlns:a=\"urn:a\"><a:p>1111</a:p><a:p>2222</a:p><a:p>3333</a:p></r>";
        let src = MemorySource::new().with("d.xml", xml);
        let p = plan(&src, &CodecRegistry::new(), &config(InputFormat::Aggregates, 20), &["d.xml"]).unwrap();
        assert!(p.len() >= 2);
        for split in p.splits.iter().skip(1) {
            let first = split.first_record.unwrap() as usize;
            assert!(xml[first..].starts_with("<a:p>"));
            assert_eq!(split.namespaces.resolve("a"), Some("urn:a"));
        }
        assert!(p.to_string().contains("discovered record element <{urn:a}p>"));
    }

    #[test]
    fn unsplittable_inputs_stay_whole() {
        let src = MemorySource::new().with("a.txt", "0123456789");
        let mut cfg = config(InputFormat::Documents, 2);
        let p = plan(&src, &CodecRegistry::new(), &cfg, &["a.txt"]).unwrap();
        assert_eq!(p.len(), 1);
        cfg.format = InputFormat::DelimitedJson;
        cfg.split_input = false;
        let p = plan(&src, &CodecRegistry::new(), &cfg, &["a.txt"]).unwrap();
        assert_eq!(p.len(), 1);
    }

    #[test]
    fn whole_formats_ignore_split_size() {
        let src = MemorySource::new().with("a.bin", vec![7u8; 64]);
        for (format, why) in [(InputFormat::Documents, "whole documents"), (InputFormat::Archive, "archive")] {
            // Auto sees neither a zip name nor a signature, so both stay raw.
            let cfg = ReaderConfig {
                compression: CompressionKind::Auto,
                ..config(format, 4)
            };
            let p = plan(&src, &CodecRegistry::empty(), &cfg, &["a.bin"]).unwrap();
            assert_eq!(p.len(), 1);
            assert_eq!((p.splits[0].start, p.splits[0].length), (0, 64));
            assert_eq!(
                p.notes,
                vec![PlanNote::Whole { path: "a.bin".into(), reason: why }]
            );
        }
    }
}
