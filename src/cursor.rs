//! The pull interface the pipeline drives.
//!
//! Every format implements [`RecordReader`]. [`RecordCursor`] wraps a reader
//! with the `has_next` / `next` / `close` / `progress` protocol and a look-ahead
//! slot, and also implements [`Iterator`].

use crate::document::DocumentRecord;
use crate::error::{LoadError, LoadResult};

/// One split's record stream.
///
/// A reader is owned by exactly one thread for its whole life. It is `Send` so
/// it can be handed to a worker, but it is never shared.
pub trait RecordReader: Send {
    /// The next complete record, or `None` once the split is exhausted.
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>>;

    /// Fraction of the split consumed, in `[0, 1]`.
    fn progress(&self) -> f32;

    /// Release the stream, decoder and any background thread. Safe to call
    /// mid-record and more than once; a half-built record is discarded.
    fn close(&mut self) -> LoadResult<()>;
}

impl<R: RecordReader + ?Sized> RecordReader for Box<R> {
    fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        (**self).next_record()
    }

    fn progress(&self) -> f32 {
        (**self).progress()
    }

    fn close(&mut self) -> LoadResult<()> {
        (**self).close()
    }
}

/// `has_next` / `next` wrapper over a [`RecordReader`].
pub struct RecordCursor<R: RecordReader> {
    reader: R,
    peeked: Option<DocumentRecord>,
    done: bool,
    closed: bool,
}

impl<R: RecordReader> RecordCursor<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            peeked: None,
            done: false,
            closed: false,
        }
    }

    /// Whether another record is available. Pulls one record ahead.
    pub fn has_next(&mut self) -> LoadResult<bool> {
        if self.peeked.is_some() {
            return Ok(true);
        }
        if self.done {
            return Ok(false);
        }
        match self.reader.next_record() {
            Ok(Some(rec)) => {
                self.peeked = Some(rec);
                Ok(true)
            }
            Ok(None) => {
                self.done = true;
                Ok(false)
            }
            Err(e) => {
                self.done = true;
                Err(e)
            }
        }
    }

    /// The next record, or `None` when exhausted.
    pub fn next_record(&mut self) -> LoadResult<Option<DocumentRecord>> {
        if self.closed {
            return Err(LoadError::Closed("record cursor".into()));
        }
        if !self.has_next()? {
            return Ok(None);
        }
        Ok(self.peeked.take())
    }

    pub fn progress(&self) -> f32 {
        if self.done && self.peeked.is_none() {
            1.0
        } else {
            self.reader.progress().clamp(0.0, 1.0)
        }
    }

    pub fn close(&mut self) -> LoadResult<()> {
        self.peeked = None;
        self.done = true;
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.reader.close()
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

impl<R: RecordReader> Iterator for RecordCursor<R> {
    type Item = LoadResult<DocumentRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        self.next_record().transpose()
    }
}
