//! Owned XML tokens with absolute byte offsets.
//!
//! [`Tokenizer`] drives a `quick_xml` reader over one decoded stream and turns
//! its borrowed events into owned [`Token`]s. End-name checking is switched
//! off: a stream opened mid-container closes ancestors it never saw open.

use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use crate::namespace::split_qname;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::io::BufRead;

/// A start (or empty-element) tag. Attribute values are unescaped; namespace
/// declarations are kept among the attributes in document order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StartTag {
    pub qname: String,
    pub attributes: Vec<(String, String)>,
}

impl StartTag {
    pub fn prefix(&self) -> &str {
        split_qname(&self.qname).0
    }

    pub fn local(&self) -> &str {
        split_qname(&self.qname).1
    }

    /// `(prefix, uri)` for every `xmlns` / `xmlns:p` attribute.
    pub fn namespace_decls(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|(k, v)| {
            if k == "xmlns" {
                Some(("", v.as_str()))
            } else {
                k.strip_prefix("xmlns:").map(|p| (p, v.as_str()))
            }
        })
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Token {
    Start(StartTag),
    Empty(StartTag),
    End(String),
    /// Unescaped character data.
    Text(String),
    CData(String),
    Comment(String),
    /// Processing instruction body: target and data.
    Pi(String),
    /// XML declaration. Only legal as the first token of an origin stream.
    Decl,
    DocType(String),
    Eof,
}

/// Pull tokenizer over one stream.
pub struct Tokenizer<B: BufRead> {
    reader: Reader<B>,
    buf: Vec<u8>,
    /// Absolute offset of the first byte the reader sees.
    base: u64,
    origin: bool,
    seen_token: bool,
    location: SourceLocation,
}

impl<B: BufRead> Tokenizer<B> {
    /// `base` is the absolute offset of the reader's first byte; `origin` is
    /// whether that byte is the true start of the stream.
    pub fn new(inner: B, base: u64, origin: bool, location: SourceLocation) -> Self {
        let mut reader = Reader::from_reader(inner);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
        config.expand_empty_elements = false;
        Self {
            reader,
            buf: Vec::with_capacity(4096),
            base,
            origin,
            seen_token: false,
            location,
        }
    }

    pub fn location(&self) -> &SourceLocation {
        &self.location
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.base + self.reader.buffer_position() as u64
    }

    /// Next token and the absolute offset at which it starts.
    pub fn next_token(&mut self) -> LoadResult<(u64, Token)> {
        self.buf.clear();
        let before = self.base + self.reader.buffer_position() as u64;
        let event = match self.reader.read_event_into(&mut self.buf) {
            Ok(ev) => ev,
            Err(source) => {
                return Err(LoadError::Xml {
                    location: self.location.clone().at_offset(before),
                    source,
                });
            }
        };
        let after = self.base + self.reader.buffer_position() as u64;
        let first = !self.seen_token;
        self.seen_token = true;
        // Tags are located from their end so the offset is exact whatever
        // the reader consumed ahead of them.
        let (offset, token) = match event {
            Event::Start(e) => {
                let at = after.saturating_sub(e.len() as u64 + 2);
                (at, Token::Start(start_tag(&e, &self.location, at)))
            }
            Event::Empty(e) => {
                let at = after.saturating_sub(e.len() as u64 + 3);
                (at, Token::Empty(start_tag(&e, &self.location, at)))
            }
            Event::End(e) => (
                before,
                Token::End(String::from_utf8_lossy(e.name().as_ref()).into_owned()),
            ),
            Event::Text(e) => {
                let text = e.unescape().map_err(|source| LoadError::Xml {
                    location: self.location.clone().at_offset(before),
                    source,
                })?;
                (before, Token::Text(text.into_owned()))
            }
            Event::CData(e) => (before, Token::CData(String::from_utf8_lossy(&e).into_owned())),
            Event::Comment(e) => (before, Token::Comment(String::from_utf8_lossy(&e).into_owned())),
            Event::PI(e) => (before, Token::Pi(String::from_utf8_lossy(&e).into_owned())),
            Event::DocType(e) => (before, Token::DocType(String::from_utf8_lossy(&e).into_owned())),
            Event::Decl(_) => {
                if !(self.origin && first) {
                    return Err(LoadError::malformed(
                        self.location.clone().at_offset(before),
                        "XML declaration in the middle of a stream; the split was opened at the wrong offset or the container is corrupt",
                    ));
                }
                (before, Token::Decl)
            }
            Event::Eof => (before, Token::Eof),
        };
        Ok((offset, token))
    }
}

/// Copy a start tag out of the reader's buffer. Malformed attributes are
/// logged and dropped; the rest of the tag is kept.
fn start_tag(e: &BytesStart<'_>, location: &SourceLocation, offset: u64) -> StartTag {
    let qname = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();
    // Bounded: a damaged tag must not spin the attribute iterator.
    let limit = e.len() + 1;
    for attr in e.attributes().with_checks(true).take(limit) {
        match attr {
            Ok(a) => {
                let key = String::from_utf8_lossy(a.key.as_ref()).into_owned();
                match a.unescape_value() {
                    Ok(v) => attributes.push((key, v.into_owned())),
                    Err(err) => tracing::warn!(
                        location = %location.clone().at_offset(offset),
                        element = %qname,
                        attribute = %key,
                        error = %err,
                        "dropping attribute with undecodable value"
                    ),
                }
            }
            Err(err) => tracing::warn!(
                location = %location.clone().at_offset(offset),
                element = %qname,
                error = %err,
                "dropping malformed attribute"
            ),
        }
    }
    StartTag { qname, attributes }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(xml: &str) -> Vec<(u64, Token)> {
        let mut t = Tokenizer::new(xml.as_bytes(), 0, true, SourceLocation::new("t.xml"));
        let mut out = Vec::new();
        loop {
            let (off, tok) = t.next_token().unwrap();
            let eof = tok == Token::Eof;
            out.push((off, tok));
            if eof {
                return out;
            }
        }
    }

    #[test]
    fn offsets_point_at_markup_starts() {
        let toks = tokens("<a>\n  <b x=\"1\"/>\n</a>");
        assert_eq!(toks[0].0, 0);
        assert!(matches!(&toks[2], (6, Token::Empty(t)) if t.attribute("x") == Some("1")));
        assert!(matches!(&toks[4], (_, Token::End(n)) if n == "a"));
    }

    #[test]
    fn text_is_unescaped() {
        let toks = tokens("<a>x &amp; y &lt; z</a>");
        assert_eq!(toks[1].1, Token::Text("x & y < z".into()));
    }

    #[test]
    fn declaration_mid_stream_is_fatal() {
        let mut t = Tokenizer::new(
            &b"<a/><?xml version=\"1.0\"?>"[..],
            0,
            true,
            SourceLocation::new("t.xml"),
        );
        t.next_token().unwrap();
        assert!(matches!(t.next_token(), Err(LoadError::MalformedContainer { .. })));
    }

    #[test]
    fn declaration_on_seeked_stream_is_fatal() {
        let mut t = Tokenizer::new(
            &b"<?xml version=\"1.0\"?><a/>"[..],
            100,
            false,
            SourceLocation::new("t.xml"),
        );
        let err = t.next_token().unwrap_err();
        assert_eq!(err.location().and_then(|l| l.offset), Some(100));
    }

    #[test]
    fn malformed_attribute_is_dropped() {
        let toks = tokens("<a good=\"1\" bad=2/>");
        match &toks[0].1 {
            Token::Empty(t) => {
                assert_eq!(t.qname, "a");
                assert_eq!(t.attribute("good"), Some("1"));
                assert_eq!(t.attribute("bad"), None);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unmatched_end_tags_are_tolerated() {
        let toks = tokens("<b/></a></root>");
        assert!(matches!(&toks[1].1, Token::End(n) if n == "a"));
        assert!(matches!(&toks[2].1, Token::End(n) if n == "root"));
    }

    #[test]
    fn namespace_decls_are_listed() {
        let toks = tokens("<p:a xmlns:p=\"urn:p\" xmlns=\"urn:d\" k=\"v\"/>");
        let Token::Empty(t) = &toks[0].1 else {
            panic!("expected empty tag");
        };
        let decls: Vec<_> = t.namespace_decls().collect();
        assert_eq!(decls, vec![("p", "urn:p"), ("", "urn:d")]);
        assert_eq!((t.prefix(), t.local()), ("p", "a"));
    }
}
