//! Whole-container pre-scan for aggregate XML.
//!
//! One pass with the same tokenizer, namespace scopes and record matcher the
//! readers use. For every nominal boundary it records the first true record
//! start at or after it and the namespace bindings in scope there. A nominal
//! range that contains no record start gets no cut, so the planner folds it
//! into the range before it.

use crate::config::IdSource;
use crate::document::SourceLocation;
use crate::error::LoadResult;
use crate::io::xml::assembler::Assembler;
use crate::io::xml::token::{Token, Tokenizer};
use crate::namespace::{NamespaceScopes, NamespaceSnapshot};
use crate::split::RecordElement;
use std::io::BufRead;

/// Where a split should begin.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Cut {
    /// Nominal split start.
    pub boundary: u64,
    /// Offset of the first record start at or after `boundary`.
    pub first_record: u64,
    /// Bindings inherited by that record from its ancestors.
    pub namespaces: NamespaceSnapshot,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct XmlLayout {
    /// Record identity, as configured or as discovered.
    pub record: Option<RecordElement>,
    pub cuts: Vec<Cut>,
    pub records: u64,
}

/// Scan `reader` and place a cut after each of the ascending `boundaries`.
pub fn prescan<B: BufRead>(
    reader: B,
    location: SourceLocation,
    record: Option<RecordElement>,
    boundaries: &[u64],
) -> LoadResult<XmlLayout> {
    let mut tokens = Tokenizer::new(reader, 0, true, location.clone());
    let mut asm = Assembler::new(
        record,
        &IdSource::Generated,
        true,
        NamespaceScopes::new(),
        location,
    )
    .scan_only();
    let mut layout = XmlLayout::default();
    let mut next = 0;
    loop {
        let (offset, token) = tokens.next_token()?;
        if let Token::Start(tag) | Token::Empty(tag) = &token
            && asm.is_record_start(tag)
        {
            layout.records += 1;
            // Only the last boundary at or below this record can own it; the
            // ones before it saw no record start and fold backwards.
            let passed = boundaries[next..].partition_point(|&b| b <= offset);
            if passed > 0 {
                next += passed;
                layout.cuts.push(Cut {
                    boundary: boundaries[next - 1],
                    first_record: offset,
                    namespaces: asm.scopes().snapshot(),
                });
            }
        }
        let eof = token == Token::Eof;
        asm.feed(offset, token)?;
        if eof {
            break;
        }
    }
    layout.record = asm.record_element().cloned();
    Ok(layout)
}
