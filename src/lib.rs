//! # Ironload
//!
//! Split-aware record extraction for bulk loading. Ironload reads large
//! containers (aggregate XML, delimited text, line-delimited JSON, RDF,
//! zip archives with metadata sidecars, plain documents and Hadoop sequence
//! files) and turns them into a stream of [`DocumentRecord`]s, each an
//! identifier, a content payload and optional metadata.
//!
//! ## Key Features
//!
//! - **Byte-range splits** - one container can be read by many readers at
//!   once; every record is produced by exactly one split
//! - **Aggregate XML** - records are sub-trees of one big document, emitted as
//!   standalone XML with the namespace bindings they need
//! - **Pluggable codecs** - zip, gzip, zstd, bzip2 and xz (each behind a
//!   feature flag), chosen by configuration, extension or magic bytes
//! - **RDF batching** - N-Triples and N-Quads grouped by graph into triples
//!   documents, parsed on a background thread
//! - **Pull interface** - [`RecordCursor`] over any [`RecordReader`]
//! - **Sequential and parallel execution** - [`Runner`] reads a [`Plan`] on
//!   one thread or on a `rayon` pool
//!
//! ## Quick Start
//!
//! ```no_run
//! use ironload::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let config = ReaderConfig::from_json_str(r#"{
//!     "format": "aggregates",
//!     "record_element": "item",
//!     "id_source": { "element": "id" },
//!     "split_input": true
//! }"#)?;
//! let inputs = io::glob::discover_inputs(&["data/"], &config)?;
//!
//! let registry = CodecRegistry::new();
//! let plan = planner::plan(&LocalFs, &registry, &config, &inputs)?;
//! println!("{plan}");
//!
//! let output = Runner::default().run(&LocalFs, &registry, &config, &plan)?;
//! for record in &output.records {
//!     println!("{} ({} bytes)", record.id, record.content.len());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! Reading a single split by hand:
//!
//! ```
//! use ironload::*;
//! # use anyhow::Result;
//!
//! # fn main() -> Result<()> {
//! let src = MemorySource::new().with("people.csv", "id,name\n1,Ada\n2,Grace\n");
//! let config = ReaderConfig {
//!     id_source: IdSource::Column("id".into()),
//!     ..ReaderConfig::for_format(InputFormat::DelimitedText)
//! };
//! let split = SplitDescriptor::whole("people.csv", 22)?;
//! let reader = io::open_reader(&src, &CodecRegistry::new(), &config, split)?;
//!
//! let ids: Vec<String> = RecordCursor::new(reader)
//!     .map(|r| r.map(|r| r.id))
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(ids, ["1", "2"]);
//! # Ok(())
//! # }
//! ```
//!
//! ## Feature Flags
//!
//! - `compression-gzip`, `compression-zstd`, `compression-bzip2`,
//!   `compression-xz` - register the stream codec (all on by default)
//! - `parallel-io` - run [`ExecMode::Parallel`] on a `rayon` pool; without it
//!   the parallel mode reads splits one after another
//!
//! ## Module Overview
//!
//! - [`config`] - [`ReaderConfig`], loaded from JSON through `serde`
//! - [`split`] - [`SplitDescriptor`] and nominal range cutting
//! - [`planner`] - containers to splits, with an explain listing
//! - [`io`] - sources, codecs and one reader per format
//! - [`cursor`] - the pull interface
//! - [`runner`] - executes a plan
//! - [`error`] - [`LoadError`]
//! - [`logging`] - `tracing` subscriber setup
//! - [`testing`] - fixtures and assertions for tests

pub mod config;
pub mod cursor;
pub mod document;
pub mod error;
pub mod id;
pub mod io;
pub mod logging;
pub mod namespace;
pub mod planner;
pub mod runner;
pub mod split;
pub mod testing;

pub use config::{CompressionKind, DelimitedOutput, IdSource, InputFormat, ReaderConfig};
pub use cursor::{RecordCursor, RecordReader};
pub use document::{Content, DocumentMetadata, DocumentRecord, DocumentType, Permission, SourceLocation};
pub use error::{LoadError, LoadResult};
pub use id::IdGenerator;
pub use io::{CodecRegistry, ContainerSource, LocalFs, MemorySource};
pub use planner::{Plan, PlanNote, plan};
pub use runner::{ExecMode, JobOutput, JobStats, Runner, SplitFailure};
pub use split::{RecordElement, SplitDescriptor};
