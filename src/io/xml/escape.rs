//! Re-escaping of character data and attribute values.
//!
//! Tokens arrive unescaped; serializing them escapes exactly once, so parsing
//! the output and serializing again reproduces it byte for byte. Markup
//! (CDATA sections, comments, processing instructions) is never escaped.

use quick_xml::escape::partial_escape;
use std::borrow::Cow;

/// Escape `&`, `<` and `>` in character data.
pub fn escape_text(raw: &str) -> Cow<'_, str> {
    partial_escape(raw)
}

/// Escape `&`, `<`, `>` and `"` in a double-quoted attribute value.
pub fn escape_attr(raw: &str) -> Cow<'_, str> {
    let escaped = partial_escape(raw);
    if escaped.contains('"') {
        Cow::Owned(escaped.replace('"', "&quot;"))
    } else {
        escaped
    }
}

/// Turn an arbitrary label (e.g. a column header) into a valid XML name.
pub fn xml_name(label: &str) -> String {
    let mut out = String::with_capacity(label.len() + 1);
    for (i, c) in label.trim().chars().enumerate() {
        let ok = c.is_alphanumeric() || matches!(c, '_' | '-' | '.');
        if i == 0 && !(c.is_alphabetic() || c == '_') {
            out.push('_');
            if ok {
                out.push(c);
                continue;
            }
        }
        out.push(if ok { c } else { '_' });
    }
    if out.is_empty() {
        out.push('_');
    }
    out
}
