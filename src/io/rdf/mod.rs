//! RDF: N-Triples and N-Quads batched into triples documents.
//!
//! Each stream is parsed on its own background thread and handed to the
//! reader through a bounded queue (`rdf_buffer` statements). Statements are
//! grouped by graph and flushed `rdf_max_statements` at a time; the graph
//! becomes the record's collection. Closing the reader drops the queue and
//! joins the parser thread.
//!
//! Blank nodes are rewritten to
//! `http://marklogic.com/semantics/blank/<16 hex digits>`, derived from a
//! per-reader salt, the container path and the node label. Without a
//! configured `rdf_blank_salt` the salt is random, so blank nodes are scoped to
//! one split.

pub mod batch;
pub mod reader;
pub mod statement;

pub use batch::{Batch, GraphBatcher};
pub use reader::{DEFAULT_GRAPH, RdfReader, SEM_NAMESPACE};
pub use statement::{Statement, Term, parse_line};
