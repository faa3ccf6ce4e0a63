//! Split-aligned line cursor shared by the line-oriented formats.
//!
//! A split owns every line whose first byte lies in `(start, end]`; the split
//! at the container origin also owns the line at offset 0. A reader opened
//! mid-container therefore discards everything up to and including the first
//! newline: that line, partial or whole, belongs to the previous split, which
//! keeps reading past its own end to finish it.

use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use crate::io::compression::{BoxedBufRead, SplitStream};
use std::io::BufRead;

/// One line without its terminator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Line {
    /// Absolute offset of the first byte.
    pub offset: u64,
    /// 1-based line number; known only when reading from the origin.
    pub number: Option<u64>,
    pub text: String,
}

impl Line {
    pub fn location(&self, base: &SourceLocation) -> SourceLocation {
        let loc = base.clone().at_offset(self.offset);
        match self.number {
            Some(n) => loc.at_line(n),
            None => loc,
        }
    }
}

pub struct LineCursor {
    reader: BoxedBufRead,
    pos: u64,
    end: Option<u64>,
    line: Option<u64>,
    buf: Vec<u8>,
    location: SourceLocation,
}

impl LineCursor {
    pub fn open(stream: SplitStream) -> LoadResult<Self> {
        let location = stream.location();
        let origin = stream.is_origin();
        let mut reader = stream.reader;
        let mut pos = stream.start;
        if !origin {
            let mut partial = Vec::new();
            let n = reader
                .read_until(b'\n', &mut partial)
                .map_err(|e| LoadError::io(location.clone().at_offset(pos), e))?;
            pos += n as u64;
        }
        Ok(Self {
            reader,
            pos,
            end: stream.end,
            line: origin.then_some(0),
            buf: Vec::new(),
            location,
        })
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Next owned line, or `None` past the split end or at end of stream.
    pub fn next_line(&mut self) -> LoadResult<Option<Line>> {
        if self.end.is_some_and(|end| self.pos > end) {
            return Ok(None);
        }
        let offset = self.pos;
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .map_err(|e| LoadError::io(self.location.clone().at_offset(offset), e))?;
        if n == 0 {
            return Ok(None);
        }
        self.pos += n as u64;
        if let Some(line) = self.line.as_mut() {
            *line += 1;
        }
        while matches!(self.buf.last(), Some(b'\n' | b'\r')) {
            self.buf.pop();
        }
        let text = String::from_utf8(std::mem::take(&mut self.buf)).map_err(|_| {
            LoadError::malformed(
                self.location.clone().at_offset(offset),
                "line is not valid UTF-8",
            )
        })?;
        Ok(Some(Line {
            offset,
            number: self.line,
            text,
        }))
    }
}
