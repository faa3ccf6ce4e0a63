//! Aggregate XML: tokenizer, boundary seeker, record assembler, pre-scan and
//! the reader that ties them together.

pub mod aggregate;
pub mod assembler;
pub mod escape;
pub mod prescan;
pub mod seeker;
pub mod token;

pub use aggregate::AggregateXmlReader;
pub use escape::{escape_attr, escape_text, xml_name};
pub use prescan::{Cut, XmlLayout, prescan};
