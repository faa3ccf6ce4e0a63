//! Boundary seeking for splits that do not start at the container origin.
//!
//! Two strategies position a stream on its first whole record:
//!
//! - [`skip_to`]: the pre-scan recorded where the first record at or after the
//!   split start begins, so the bytes before it are simply discarded.
//! - [`scan_for_record`]: without a hint, scan bytes for `<qname` whose local
//!   name matches the record element. This cannot see comment or CDATA
//!   context, so a record-like tag inside a comment can fool it; planned
//!   splits always carry a hint and never take this path.
//!
//! Either way the partial record at the head of the split is left to the
//! previous split's reader, which reads past its own end to finish it.

use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use crate::io::compression::BoxedBufRead;
use std::io::{self, BufRead, Cursor, Read};

/// Tag names longer than this are never record candidates.
const MAX_NAME: usize = 1024;

/// Discard `target - start` bytes and check that a tag begins there.
pub fn skip_to(
    mut reader: BoxedBufRead,
    start: u64,
    target: u64,
    location: &SourceLocation,
) -> LoadResult<BoxedBufRead> {
    let gap = target.saturating_sub(start);
    let skipped = io::copy(&mut (&mut reader).take(gap), &mut io::sink())
        .map_err(|e| LoadError::io(location.clone().at_offset(start), e))?;
    if skipped < gap {
        return Err(LoadError::malformed(
            location.clone().at_offset(start + skipped),
            format!("record hint at offset {target} lies beyond the end of the container"),
        ));
    }
    let head = reader
        .fill_buf()
        .map_err(|e| LoadError::io(location.clone().at_offset(target), e))?;
    if head.first() != Some(&b'<') {
        return Err(LoadError::malformed(
            location.clone().at_offset(target),
            "record hint does not point at a start tag; the container changed after planning",
        ));
    }
    Ok(reader)
}

enum Candidate {
    Match,
    NoMatch,
    NeedMore,
}

/// Classify the bytes following a `<`.
fn classify(after: &[u8], local: &[u8], eof: bool) -> Candidate {
    match after.first() {
        None => {
            return if eof {
                Candidate::NoMatch
            } else {
                Candidate::NeedMore
            };
        }
        Some(b'/' | b'?' | b'!') => return Candidate::NoMatch,
        Some(_) => {}
    }
    let end = after
        .iter()
        .position(|b| b.is_ascii_whitespace() || matches!(b, b'>' | b'/'));
    let Some(end) = end else {
        return if eof || after.len() > MAX_NAME {
            Candidate::NoMatch
        } else {
            Candidate::NeedMore
        };
    };
    let qname = &after[..end];
    let name = match qname.iter().rposition(|&b| b == b':') {
        Some(i) => &qname[i + 1..],
        None => qname,
    };
    if name == local {
        Candidate::Match
    } else {
        Candidate::NoMatch
    }
}

/// Scan forward from `start` for a start tag named `local`.
///
/// Returns the stream repositioned on that tag and its absolute offset, or
/// `None` when no candidate begins before `end`.
pub fn scan_for_record(
    mut reader: BoxedBufRead,
    start: u64,
    end: u64,
    local: &str,
    location: &SourceLocation,
) -> LoadResult<Option<(BoxedBufRead, u64)>> {
    let local = local.as_bytes();
    let mut window: Vec<u8> = Vec::new();
    let mut window_start = start;
    let mut eof = false;
    loop {
        let mut from = 0;
        let mut keep_from = window.len();
        while let Some(rel) = window[from..].iter().position(|&b| b == b'<') {
            let at = from + rel;
            let abs = window_start + at as u64;
            if abs >= end {
                return Ok(None);
            }
            match classify(&window[at + 1..], local, eof) {
                Candidate::Match => {
                    let head = window.split_off(at);
                    let resumed: BoxedBufRead = Box::new(Cursor::new(head).chain(reader));
                    return Ok(Some((resumed, abs)));
                }
                Candidate::NoMatch => from = at + 1,
                Candidate::NeedMore => {
                    keep_from = at;
                    break;
                }
            }
        }
        if eof {
            return Ok(None);
        }
        window.drain(..keep_from);
        window_start += keep_from as u64;
        if window_start >= end && window.is_empty() {
            return Ok(None);
        }
        let chunk = reader
            .fill_buf()
            .map_err(|e| LoadError::io(location.clone().at_offset(window_start), e))?;
        if chunk.is_empty() {
            eof = true;
            continue;
        }
        let n = chunk.len();
        window.extend_from_slice(chunk);
        reader.consume(n);
    }
}
