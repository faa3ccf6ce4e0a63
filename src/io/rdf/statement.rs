//! N-Triples / N-Quads statements and their line parser.

use std::fmt;

pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
pub const RDF_LANG_STRING: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#langString";

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Term {
    Iri(String),
    Blank(String),
    Literal {
        value: String,
        datatype: Option<String>,
        lang: Option<String>,
    },
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Iri(iri) => write!(f, "<{iri}>"),
            Term::Blank(label) => write!(f, "_:{label}"),
            Term::Literal { value, datatype, lang } => {
                write!(f, "{value:?}")?;
                if let Some(lang) = lang {
                    write!(f, "@{lang}")?;
                } else if let Some(dt) = datatype {
                    write!(f, "^^<{dt}>")?;
                }
                Ok(())
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Statement {
    pub subject: Term,
    pub predicate: Term,
    pub object: Term,
    /// Graph name; `None` for triples.
    pub graph: Option<Term>,
}

/// Parse one line. `Ok(None)` for blank and comment lines.
pub fn parse_line(line: &str) -> Result<Option<Statement>, String> {
    let mut p = Parser { s: line, i: 0 };
    p.ws();
    if p.done() || p.peek() == Some('#') {
        return Ok(None);
    }
    let subject = p.subject()?;
    p.ws();
    let predicate = Term::Iri(p.iri()?);
    p.ws();
    let object = p.object()?;
    p.ws();
    let graph = match p.peek() {
        Some('<') => Some(Term::Iri(p.iri()?)),
        Some('_') => Some(Term::Blank(p.blank()?)),
        _ => None,
    };
    p.ws();
    p.expect('.')?;
    p.ws();
    if !p.done() && p.peek() != Some('#') {
        return Err(format!("unexpected trailing text at column {}", p.i + 1));
    }
    Ok(Some(Statement {
        subject,
        predicate,
        object,
        graph,
    }))
}

struct Parser<'a> {
    s: &'a str,
    i: usize,
}

impl Parser<'_> {
    fn rest(&self) -> &str {
        &self.s[self.i..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn done(&self) -> bool {
        self.i >= self.s.len()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.i += c.len_utf8();
        Some(c)
    }

    fn ws(&mut self) {
        while matches!(self.peek(), Some(' ' | '\t')) {
            self.i += 1;
        }
    }

    fn expect(&mut self, c: char) -> Result<(), String> {
        match self.bump() {
            Some(got) if got == c => Ok(()),
            Some(got) => Err(format!("expected '{c}' but found '{got}' at column {}", self.i)),
            None => Err(format!("expected '{c}' at end of line")),
        }
    }

    fn subject(&mut self) -> Result<Term, String> {
        match self.peek() {
            Some('<') => Ok(Term::Iri(self.iri()?)),
            Some('_') => Ok(Term::Blank(self.blank()?)),
            _ => Err(format!("expected IRI or blank node at column {}", self.i + 1)),
        }
    }

    fn object(&mut self) -> Result<Term, String> {
        match self.peek() {
            Some('"') => self.literal(),
            _ => self.subject(),
        }
    }

    fn iri(&mut self) -> Result<String, String> {
        self.expect('<')?;
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('>') => return Ok(out),
                Some('\\') => out.push(self.escape(false)?),
                Some(c) if c.is_whitespace() => return Err("whitespace inside IRI".into()),
                Some(c) => out.push(c),
                None => return Err("unterminated IRI".into()),
            }
        }
    }

    fn blank(&mut self) -> Result<String, String> {
        self.expect('_')?;
        self.expect(':')?;
        let start = self.i;
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || matches!(c, '_' | '-' | '.') {
                self.i += c.len_utf8();
            } else {
                break;
            }
        }
        // A trailing '.' ends the statement, not the label.
        while self.i > start && self.s[..self.i].ends_with('.') {
            self.i -= 1;
        }
        if self.i == start {
            return Err("empty blank node label".into());
        }
        Ok(self.s[start..self.i].to_string())
    }

    fn literal(&mut self) -> Result<Term, String> {
        self.expect('"')?;
        let mut value = String::new();
        loop {
            match self.bump() {
                Some('"') => break,
                Some('\\') => value.push(self.escape(true)?),
                Some(c) => value.push(c),
                None => return Err("unterminated literal".into()),
            }
        }
        let (mut datatype, mut lang) = (None, None);
        match self.peek() {
            Some('@') => {
                self.i += 1;
                let start = self.i;
                while matches!(self.peek(), Some(c) if c.is_ascii_alphanumeric() || c == '-') {
                    self.i += 1;
                }
                if self.i == start {
                    return Err("empty language tag".into());
                }
                lang = Some(self.s[start..self.i].to_string());
            }
            Some('^') => {
                self.expect('^')?;
                self.expect('^')?;
                datatype = Some(self.iri()?);
            }
            _ => {}
        }
        Ok(Term::Literal { value, datatype, lang })
    }

    fn escape(&mut self, in_literal: bool) -> Result<char, String> {
        let c = self.bump().ok_or("dangling escape")?;
        let simple = match c {
            'u' => return self.hex(4),
            'U' => return self.hex(8),
            _ if !in_literal => return Err(format!("invalid IRI escape \\{c}")),
            't' => '\t',
            'b' => '\u{8}',
            'n' => '\n',
            'r' => '\r',
            'f' => '\u{c}',
            '"' => '"',
            '\'' => '\'',
            '\\' => '\\',
            other => return Err(format!("invalid escape \\{other}")),
        };
        Ok(simple)
    }

    fn hex(&mut self, digits: usize) -> Result<char, String> {
        let hex = self
            .rest()
            .get(..digits)
            .ok_or("truncated unicode escape")?;
        // `from_str_radix` alone would accept a leading sign.
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(format!("bad unicode escape {hex}"));
        }
        let code = u32::from_str_radix(hex, 16).map_err(|_| format!("bad unicode escape {hex}"))?;
        self.i += digits;
        char::from_u32(code).ok_or_else(|| format!("invalid code point {code:#x}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn iri(s: &str) -> Term {
        Term::Iri(s.into())
    }

    #[test]
    fn parses_triple_with_typed_literal() {
        let st = parse_line(r#"<http://a> <http://p> "42"^^<http://www.w3.org/2001/XMLSchema#int> ."#)
            .unwrap()
            .unwrap();
        assert_eq!(st.subject, iri("http://a"));
        assert_eq!(
            st.object,
            Term::Literal {
                value: "42".into(),
                datatype: Some("http://www.w3.org/2001/XMLSchema#int".into()),
                lang: None
            }
        );
        assert_eq!(st.graph, None);
    }

    #[test]
    fn parses_quad_with_blank_nodes_and_language() {
        let st = parse_line(r#"_:b1 <http://p> "chat \"noir\""@fr-CA <http://g> . # trailing"#)
            .unwrap()
            .unwrap();
        assert_eq!(st.subject, Term::Blank("b1".into()));
        assert_eq!(
            st.object,
            Term::Literal {
                value: "chat \"noir\"".into(),
                datatype: None,
                lang: Some("fr-CA".into())
            }
        );
        assert_eq!(st.graph, Some(iri("http://g")));
    }

    #[test]
    fn blank_object_before_dot() {
        let st = parse_line("<http://a> <http://p> _:x.").unwrap().unwrap();
        assert_eq!(st.object, Term::Blank("x".into()));
    }

    fn literal_value(line: &str) -> String {
        match parse_line(line).unwrap().unwrap().object {
            Term::Literal { value, .. } => value,
            other => panic!("expected a literal, got {other:?}"),
        }
    }

    #[test]
    fn unicode_escapes() {
        assert_eq!(literal_value(r#"<http://a> <http://p> "caf\u00E9" ."#), "café");
        assert_eq!(literal_value(r#"<http://a> <http://p> "\U0001F600!" ."#), "\u{1F600}!");
        assert_eq!(literal_value(r#"<http://a> <http://p> "café" ."#), "café");

        let st = parse_line(r"<http://a/\u00E9> <http://p> <http://o> .").unwrap().unwrap();
        assert_eq!(st.subject, iri("http://a/é"));
    }

    #[test]
    fn bad_unicode_escapes_are_rejected() {
        for line in [
            r#"<http://a> <http://p> "\u+0E9" ."#,
            r#"<http://a> <http://p> "\U+001F600" ."#,
            r#"<http://a> <http://p> "\uD800" ."#,
            r#"<http://a> <http://p> "\u00G9" ."#,
            r#"<http://a> <http://p> "\u00E" ."#,
        ] {
            assert!(parse_line(line).is_err(), "{line} was accepted");
        }
    }

    #[test]
    fn comments_and_blank_lines() {
        assert_eq!(parse_line("   ").unwrap(), None);
        assert_eq!(parse_line("# hello").unwrap(), None);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_line("<http://a> <http://p> .").is_err());
        assert!(parse_line("<http://a> <http://p> <http://o>").is_err());
        assert!(parse_line("<http://a> \"p\" <http://o> .").is_err());
    }
}
