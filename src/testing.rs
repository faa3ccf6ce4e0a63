//! Test support for code that drives the readers.
//!
//! [`fixtures`] builds container bytes (zip archives, gzip streams, aggregate
//! XML, N-Triples, Hadoop sequence files) in memory; [`assertions`] checks the
//! properties every split plan must keep, such as no record read twice and no
//! record lost.
//!
//! ```
//! use ironload::config::{IdSource, InputFormat, ReaderConfig};
//! use ironload::io::{CodecRegistry, MemorySource};
//! use ironload::planner::plan;
//! use ironload::runner::Runner;
//! use ironload::testing::*;
//!
//! # fn main() -> anyhow::Result<()> {
//! let src = MemorySource::new().with("big.xml", aggregate_xml(50));
//! let registry = CodecRegistry::new();
//! let whole = ReaderConfig {
//!     id_source: IdSource::Element("id".into()),
//!     ..ReaderConfig::for_format(InputFormat::Aggregates)
//! };
//! let split = ReaderConfig {
//!     split_input: true,
//!     split_size: 256,
//!     ..whole.clone()
//! };
//!
//! let expected = Runner::sequential().run(&src, &registry, &whole, &plan(&src, &registry, &whole, &["big.xml"])?)?;
//! let actual = Runner::default().run(&src, &registry, &split, &plan(&src, &registry, &split, &["big.xml"])?)?;
//! assert_unique_ids(&actual.records);
//! assert_same_records(&actual.records, &expected.records);
//! # Ok(())
//! # }
//! ```

pub mod assertions;
pub mod fixtures;

pub use assertions::*;
pub use fixtures::*;
