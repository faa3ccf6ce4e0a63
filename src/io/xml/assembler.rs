//! The record assembler: tokens in, complete records out.
//!
//! States are `AwaitingRecordStart` and `AccumulatingRecord`; an emitted record
//! returns the assembler to `AwaitingRecordStart`. While awaiting, a start tag
//! whose local name and namespace match the record identity opens a record,
//! wherever it sits in the tree. The root element of an origin stream is a
//! wrapper and never a record. While accumulating, every token is written back
//! into the record buffer and depth is tracked until the record element
//! closes.
//!
//! The record root gets `xmlns` declarations for every binding inherited from
//! outside the record that it does not redeclare, so each record parses on its
//! own with the same namespace URIs it had in the container.

use crate::config::IdSource;
use crate::document::SourceLocation;
use crate::error::{LoadError, LoadResult};
use crate::io::xml::escape::{escape_attr, escape_text};
use crate::io::xml::token::{StartTag, Token};
use crate::namespace::{NamespaceScopes, split_qname};
use crate::split::RecordElement;

/// A record as the assembler produced it, before naming.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AssembledRecord {
    /// Identifier read from the record; `None` when identifiers are generated.
    pub id: Option<String>,
    /// The identifier was present but empty.
    pub skip: bool,
    pub content: String,
    /// Offset of the record's start tag.
    pub offset: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum IdRule {
    Generated,
    Attribute(String),
    Element(String),
}

impl IdRule {
    fn name(&self) -> &str {
        match self {
            IdRule::Generated => "",
            IdRule::Attribute(n) | IdRule::Element(n) => n,
        }
    }
}

/// Progress through the identifier element: its start tag, exactly one text
/// node, then its end tag.
#[derive(Clone, Debug, PartialEq, Eq)]
enum IdElement {
    Idle,
    AwaitText(String),
    AwaitEnd(String, String),
    Done,
}

pub struct Assembler {
    record: Option<RecordElement>,
    rule: IdRule,
    origin: bool,
    scopes: NamespaceScopes,
    depth: usize,
    record_depth: Option<usize>,
    record_qname: String,
    record_offset: u64,
    buf: String,
    id: Option<String>,
    skip: bool,
    id_element: IdElement,
    capture: bool,
    location: SourceLocation,
}

impl Assembler {
    /// `record` may be `None` on origin streams: the first element below the
    /// root then defines the record identity.
    pub fn new(
        record: Option<RecordElement>,
        id_source: &IdSource,
        origin: bool,
        scopes: NamespaceScopes,
        location: SourceLocation,
    ) -> Self {
        let rule = match id_source {
            IdSource::Attribute(n) => IdRule::Attribute(n.clone()),
            IdSource::Element(n) => IdRule::Element(n.clone()),
            _ => IdRule::Generated,
        };
        Self {
            record,
            rule,
            origin,
            scopes,
            depth: 0,
            record_depth: None,
            record_qname: String::new(),
            record_offset: 0,
            buf: String::new(),
            id: None,
            skip: false,
            id_element: IdElement::Idle,
            capture: true,
            location,
        }
    }

    /// Track structure and identifiers without building record text.
    #[must_use]
    pub fn scan_only(mut self) -> Self {
        self.capture = false;
        self
    }

    pub fn is_awaiting(&self) -> bool {
        self.record_depth.is_none()
    }

    pub fn record_element(&self) -> Option<&RecordElement> {
        self.record.as_ref()
    }

    pub fn scopes(&self) -> &NamespaceScopes {
        &self.scopes
    }

    /// Namespace of `tag`, taking its own declarations into account.
    fn tag_namespace(&self, tag: &StartTag) -> Option<String> {
        self.resolve_at(tag, tag.prefix())
    }

    /// URI bound to `prefix` where `tag` stands.
    fn resolve_at(&self, tag: &StartTag, prefix: &str) -> Option<String> {
        match tag.namespace_decls().filter(|(p, _)| *p == prefix).last() {
            Some((_, uri)) if uri.is_empty() => None,
            Some((_, uri)) => Some(uri.to_string()),
            None => self.scopes.resolve(prefix).map(str::to_string),
        }
    }

    /// Whether `tag` is the identifier element: a direct child of the record
    /// root whose local name and namespace match `name`. `name` is either
    /// `{uri}local` or a qualified name resolved in the document's scopes.
    fn is_id_element(&self, tag: &StartTag, name: &str) -> bool {
        if self.record_depth.map(|d| d + 1) != Some(self.depth) {
            return false;
        }
        let (namespace, local) = match name.strip_prefix('{').and_then(|n| n.split_once('}')) {
            Some((uri, local)) => ((!uri.is_empty()).then(|| uri.to_string()), local),
            None => {
                let (prefix, local) = split_qname(name);
                let namespace = self.resolve_at(tag, prefix);
                if !prefix.is_empty() && namespace.is_none() {
                    return false;
                }
                (namespace, local)
            }
        };
        tag.local() == local && self.tag_namespace(tag) == namespace
    }

    /// Whether `tag`, seen next, would open a record.
    pub fn is_record_start(&self, tag: &StartTag) -> bool {
        if !self.is_awaiting() || (self.origin && self.depth == 0) {
            return false;
        }
        match &self.record {
            Some(r) => r.matches(tag.local(), self.tag_namespace(tag).as_deref()),
            None => self.origin && self.depth == 1,
        }
    }

    /// Feed one token. Returns a record when this token completes one.
    pub fn feed(&mut self, offset: u64, token: Token) -> LoadResult<Option<AssembledRecord>> {
        match token {
            Token::Start(tag) => self.on_start(offset, tag, false),
            Token::Empty(tag) => self.on_start(offset, tag, true),
            Token::End(qname) => self.on_end(offset, &qname),
            Token::Text(text) => {
                if self.is_awaiting() {
                    return Ok(None);
                }
                match std::mem::replace(&mut self.id_element, IdElement::Done) {
                    IdElement::AwaitText(name) => {
                        self.id_element = IdElement::AwaitEnd(name, text.clone());
                    }
                    IdElement::AwaitEnd(name, _) => return Err(self.bad_id_element(offset, &name)),
                    other => self.id_element = other,
                }
                if self.capture {
                    self.buf.push_str(&escape_text(&text));
                }
                Ok(None)
            }
            Token::CData(data) => self.markup(offset, |buf| {
                buf.push_str("<![CDATA[");
                buf.push_str(&data);
                buf.push_str("]]>");
            }),
            Token::Comment(body) => self.markup(offset, |buf| {
                buf.push_str("<!--");
                buf.push_str(&body);
                buf.push_str("-->");
            }),
            Token::Pi(body) => self.markup(offset, |buf| {
                buf.push_str("<?");
                buf.push_str(&body);
                buf.push_str("?>");
            }),
            Token::Decl | Token::DocType(_) => Ok(None),
            Token::Eof => {
                self.finish(offset)?;
                Ok(None)
            }
        }
    }

    /// End of stream: fails when a record is still open.
    pub fn finish(&self, offset: u64) -> LoadResult<()> {
        if self.is_awaiting() {
            return Ok(());
        }
        Err(LoadError::TruncatedRecord {
            location: self.location.clone().at_offset(offset),
            element: self.record_qname.clone(),
        })
    }

    /// Drop any half-built record.
    pub fn discard(&mut self) {
        self.buf.clear();
        self.record_depth = None;
        self.id = None;
        self.skip = false;
        self.id_element = IdElement::Idle;
    }

    fn markup(
        &mut self,
        offset: u64,
        write: impl FnOnce(&mut String),
    ) -> LoadResult<Option<AssembledRecord>> {
        if self.is_awaiting() {
            return Ok(None);
        }
        if let IdElement::AwaitText(name) | IdElement::AwaitEnd(name, _) = &self.id_element {
            return Err(self.bad_id_element(offset, name));
        }
        if self.capture {
            write(&mut self.buf);
        }
        Ok(None)
    }

    fn on_start(
        &mut self,
        offset: u64,
        tag: StartTag,
        empty: bool,
    ) -> LoadResult<Option<AssembledRecord>> {
        let opens_record = self.is_record_start(&tag);
        if opens_record {
            if self.record.is_none() {
                let discovered = RecordElement::new(tag.local(), self.tag_namespace(&tag));
                tracing::debug!(
                    location = %self.location,
                    record = %discovered,
                    "discovered record element"
                );
                self.record = Some(discovered);
            }
            let inherited = if self.capture {
                self.inherited_bindings(&tag)
            } else {
                Vec::new()
            };
            self.record_depth = Some(self.depth);
            self.record_offset = offset;
            self.record_qname.clone_from(&tag.qname);
            self.id = None;
            self.skip = false;
            self.id_element = IdElement::Idle;
            if self.capture {
                self.buf.clear();
                write_start(&mut self.buf, &tag, &inherited, empty);
            }
            self.capture_id_attribute(&tag);
        } else if !self.is_awaiting() {
            if let IdElement::AwaitText(name) | IdElement::AwaitEnd(name, _) = &self.id_element {
                return Err(self.bad_id_element(offset, name));
            }
            if self.capture {
                write_start(&mut self.buf, &tag, &[], empty);
            }
            self.capture_id_attribute(&tag);
            if let IdRule::Element(name) = &self.rule
                && self.id.is_none()
                && self.id_element == IdElement::Idle
                && self.is_id_element(&tag, name)
            {
                if empty {
                    return Err(self.bad_id_element(offset, name));
                }
                self.id_element = IdElement::AwaitText(name.clone());
            }
        }

        self.scopes.enter(tag.namespace_decls());
        if empty {
            self.scopes.leave();
            if opens_record {
                return self.complete().map(Some);
            }
        } else {
            self.depth += 1;
        }
        Ok(None)
    }

    fn on_end(&mut self, offset: u64, qname: &str) -> LoadResult<Option<AssembledRecord>> {
        self.depth = self.depth.saturating_sub(1);
        self.scopes.leave();
        let Some(record_depth) = self.record_depth else {
            return Ok(None);
        };
        match std::mem::replace(&mut self.id_element, IdElement::Done) {
            IdElement::AwaitEnd(_, text) => {
                let id = text.trim().to_string();
                self.skip = id.is_empty();
                self.id = Some(id);
            }
            IdElement::AwaitText(name) => return Err(self.bad_id_element(offset, &name)),
            other => self.id_element = other,
        }
        if self.capture {
            self.buf.push_str("</");
            self.buf.push_str(qname);
            self.buf.push('>');
        }
        if self.depth == record_depth {
            return self.complete().map(Some);
        }
        Ok(None)
    }

    fn complete(&mut self) -> LoadResult<AssembledRecord> {
        let id = self.id.take();
        if id.is_none() && self.rule != IdRule::Generated {
            let err = LoadError::MissingIdentifier {
                location: self.location.clone().at_offset(self.record_offset),
                element: self.record_qname.clone(),
                id_name: self.rule.name().to_string(),
            };
            self.discard();
            return Err(err);
        }
        let record = AssembledRecord {
            id,
            skip: self.skip,
            content: std::mem::take(&mut self.buf),
            offset: self.record_offset,
        };
        self.discard();
        Ok(record)
    }

    fn capture_id_attribute(&mut self, tag: &StartTag) {
        if let IdRule::Attribute(name) = &self.rule
            && self.id.is_none()
            && let Some(value) = tag.attribute(name)
        {
            self.skip = value.trim().is_empty();
            self.id = Some(value.to_string());
        }
    }

    /// In-scope bindings the record root must redeclare.
    fn inherited_bindings(&self, tag: &StartTag) -> Vec<(String, String)> {
        let own: Vec<&str> = tag.namespace_decls().map(|(p, _)| p).collect();
        self.scopes
            .in_scope()
            .filter(|(p, u)| !own.contains(p) && !(p.is_empty() && u.is_empty()))
            .map(|(p, u)| (p.to_string(), u.to_string()))
            .collect()
    }

    fn bad_id_element(&self, offset: u64, name: &str) -> LoadError {
        LoadError::MalformedIdentifierElement {
            location: self.location.clone().at_offset(offset),
            element: name.to_string(),
        }
    }
}

fn write_start(buf: &mut String, tag: &StartTag, inherited: &[(String, String)], empty: bool) {
    buf.push('<');
    buf.push_str(&tag.qname);
    for (k, v) in &tag.attributes {
        buf.push(' ');
        buf.push_str(k);
        buf.push_str("=\"");
        buf.push_str(&escape_attr(v));
        buf.push('"');
    }
    for (prefix, uri) in inherited {
        if prefix.is_empty() {
            buf.push_str(" xmlns=\"");
        } else {
            buf.push_str(" xmlns:");
            buf.push_str(prefix);
            buf.push_str("=\"");
        }
        buf.push_str(&escape_attr(uri));
        buf.push('"');
    }
    buf.push_str(if empty { "/>" } else { ">" });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::xml::token::Tokenizer;

    fn run(xml: &str, record: Option<&str>, id: IdSource) -> LoadResult<Vec<AssembledRecord>> {
        let loc = SourceLocation::new("t.xml");
        let mut tok = Tokenizer::new(xml.as_bytes(), 0, true, loc.clone());
        let mut asm = Assembler::new(
            record.map(|r| RecordElement::new(r, None)),
            &id,
            true,
            NamespaceScopes::new(),
            loc,
        );
        let mut out = Vec::new();
        loop {
            let (off, t) = tok.next_token()?;
            let eof = t == Token::Eof;
            if let Some(r) = asm.feed(off, t)? {
                out.push(r);
            }
            if eof {
                return Ok(out);
            }
        }
    }

    #[test]
    fn records_from_attribute_ids() {
        let xml = r#"<?xml version="1.0"?><people><person id="1"><n>A &amp; B</n></person><person id="2"/></people>"#;
        let recs = run(xml, Some("person"), IdSource::Attribute("id".into())).unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].id.as_deref(), Some("1"));
        assert_eq!(recs[0].content, r#"<person id="1"><n>A &amp; B</n></person>"#);
        assert_eq!(recs[1].content, r#"<person id="2"/>"#);
    }

    #[test]
    fn root_is_never_a_record() {
        let recs = run("<item><item>x</item></item>", Some("item"), IdSource::Generated).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].content, "<item>x</item>");
    }

    #[test]
    fn nested_same_name_stays_inside_the_record() {
        let recs = run(
            "<r><p><p>in</p></p><p>two</p></r>",
            Some("p"),
            IdSource::Generated,
        )
        .unwrap();
        assert_eq!(recs.len(), 2);
        assert_eq!(recs[0].content, "<p><p>in</p></p>");
    }

    #[test]
    fn record_element_is_discovered() {
        let recs = run("<root><a>1</a><b>2</b></root>", None, IdSource::Generated).unwrap();
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].content, "<a>1</a>");
    }

    #[test]
    fn element_identifier_keeps_content() {
        let xml = "<r><doc><uri> /a.xml </uri><body>x</body></doc></r>";
        let recs = run(xml, Some("doc"), IdSource::Element("uri".into())).unwrap();
        assert_eq!(recs[0].id.as_deref(), Some("/a.xml"));
        assert_eq!(recs[0].content, "<doc><uri> /a.xml </uri><body>x</body></doc>");
    }

    #[test]
    fn identifier_element_is_a_direct_child() {
        let xml = "<r><doc><meta><uri>/deep</uri></meta><uri>/top</uri></doc></r>";
        let recs = run(xml, Some("doc"), IdSource::Element("uri".into())).unwrap();
        assert_eq!(recs[0].id.as_deref(), Some("/top"));

        let err = run("<r><doc><meta><uri>/deep</uri></meta></doc></r>", Some("doc"), IdSource::Element("uri".into()))
            .unwrap_err();
        assert!(matches!(err, LoadError::MissingIdentifier { .. }));
    }

    #[test]
    fn identifier_element_matches_by_namespace() {
        let xml = r#"<r xmlns:a="urn:x" xmlns:b="urn:x"><doc><c:uri xmlns:c="urn:other">/no</c:uri><b:uri>/yes</b:uri></doc></r>"#;
        for name in ["a:uri", "{urn:x}uri"] {
            let recs = run(xml, Some("doc"), IdSource::Element(name.into())).unwrap();
            assert_eq!(recs[0].id.as_deref(), Some("/yes"), "{name}");
        }
        // An unprefixed name means the default namespace, which is unbound here.
        let err = run(xml, Some("doc"), IdSource::Element("uri".into())).unwrap_err();
        assert!(matches!(err, LoadError::MissingIdentifier { .. }));
    }

    #[test]
    fn identifier_element_with_markup_is_malformed() {
        let xml = "<r><doc><uri><b>x</b></uri></doc></r>";
        let err = run(xml, Some("doc"), IdSource::Element("uri".into())).unwrap_err();
        assert!(matches!(err, LoadError::MalformedIdentifierElement { .. }));
    }

    #[test]
    fn empty_identifier_marks_skip() {
        let recs = run(
            r#"<r><p id="">x</p><p id="  "/></r>"#,
            Some("p"),
            IdSource::Attribute("id".into()),
        )
        .unwrap();
        assert!(recs.iter().all(|r| r.skip));
    }

    #[test]
    fn missing_identifier_is_fatal() {
        let err = run("<r><p>x</p></r>", Some("p"), IdSource::Attribute("id".into())).unwrap_err();
        assert!(matches!(err, LoadError::MissingIdentifier { ref id_name, .. } if id_name == "id"));
    }

    #[test]
    fn truncated_record_is_fatal() {
        let err = run("<r><p>x", Some("p"), IdSource::Generated).unwrap_err();
        assert!(matches!(err, LoadError::TruncatedRecord { .. }));
    }

    #[test]
    fn inherited_namespaces_are_declared_on_the_record() {
        let xml = r#"<r xmlns="urn:d" xmlns:a="urn:a"><a:p xmlns:b="urn:b">x</a:p></r>"#;
        let recs = run(xml, Some("p"), IdSource::Generated).unwrap();
        assert_eq!(
            recs[0].content,
            r#"<a:p xmlns:b="urn:b" xmlns="urn:d" xmlns:a="urn:a">x</a:p>"#
        );
    }

    #[test]
    fn text_is_escaped_once_and_markup_verbatim() {
        let xml = "<r><p>1 &lt; 2 &amp;&amp; 3 &gt; 2<![CDATA[<raw>&]]><!-- c&d --><?pi x?></p></r>";
        let recs = run(xml, Some("p"), IdSource::Generated).unwrap();
        assert_eq!(
            recs[0].content,
            "<p>1 &lt; 2 &amp;&amp; 3 &gt; 2<![CDATA[<raw>&]]><!-- c&d --><?pi x?></p>"
        );
    }
}
