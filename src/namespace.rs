//! XML namespace scopes.
//!
//! [`NamespaceSnapshot`] is the immutable value a split descriptor carries:
//! one frame per element still open at the split's first record, outermost
//! first, each holding the declarations that element made. Readers seed a
//! mutable [`NamespaceScopes`] from it by replaying the frames, so closing an
//! ancestor that opened before the split drops its bindings exactly as a
//! whole-container pass would. Once every inherited frame is closed, leaving
//! is a no-op.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

/// The `xml` prefix is bound by definition and never declared.
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

type Frame = Vec<(String, String)>;

/// Immutable stack of open-element frames shared between descriptors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceSnapshot(Arc<Vec<Frame>>);

impl NamespaceSnapshot {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from one `(prefix, uri)` list per open element, outermost first.
    pub fn from_frames<F, I, P, U>(frames: F) -> Self
    where
        F: IntoIterator<Item = I>,
        I: IntoIterator<Item = (P, U)>,
        P: Into<String>,
        U: Into<String>,
    {
        let frames = frames
            .into_iter()
            .map(|frame| frame.into_iter().map(|(p, u)| (p.into(), u.into())).collect())
            .collect();
        Self(Arc::new(frames))
    }

    /// No bindings in any frame.
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Vec::is_empty)
    }

    /// Number of open ancestor elements.
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    /// Currently active URI for `prefix` (`""` is the default namespace).
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.bindings(prefix).last()
    }

    /// Every URI bound to `prefix`, outermost first.
    pub fn stack(&self, prefix: &str) -> Vec<&str> {
        self.bindings(prefix).collect()
    }

    pub fn prefixes(&self) -> impl Iterator<Item = &str> {
        self.0
            .iter()
            .flatten()
            .map(|(p, _)| p.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
    }

    fn bindings<'a>(&'a self, prefix: &str) -> impl Iterator<Item = &'a str> {
        self.0
            .iter()
            .flatten()
            .filter(move |(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    }
}

/// Mutable per-reader namespace scopes.
#[derive(Clone, Debug, Default)]
pub struct NamespaceScopes {
    bindings: BTreeMap<String, Vec<String>>,
    /// Declarations made by each open element, outermost first.
    frames: Vec<Frame>,
}

impl NamespaceScopes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed from a snapshot by re-entering each of its frames.
    pub fn from_snapshot(snapshot: &NamespaceSnapshot) -> Self {
        let mut scopes = Self::new();
        for frame in snapshot.0.iter() {
            scopes.enter(frame.iter().map(|(p, u)| (p.as_str(), u.as_str())));
        }
        scopes
    }

    /// Enter an element declaring `decls`.
    pub fn enter<'a, I>(&mut self, decls: I)
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut frame = Vec::new();
        for (prefix, uri) in decls {
            self.bindings
                .entry(prefix.to_string())
                .or_default()
                .push(uri.to_string());
            frame.push((prefix.to_string(), uri.to_string()));
        }
        self.frames.push(frame);
    }

    /// Leave the innermost open element. A no-op when none is open.
    pub fn leave(&mut self) {
        let Some(frame) = self.frames.pop() else {
            return;
        };
        for (prefix, _) in frame {
            if let Some(stack) = self.bindings.get_mut(&prefix) {
                stack.pop();
                if stack.is_empty() {
                    self.bindings.remove(&prefix);
                }
            }
        }
    }

    /// Number of open elements, inherited ones included.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        if prefix == "xml" {
            return Some(XML_NAMESPACE);
        }
        self.bindings
            .get(prefix)
            .and_then(|s| s.last())
            .map(String::as_str)
            .filter(|uri| !(prefix.is_empty() && uri.is_empty()))
    }

    /// Active `(prefix, uri)` bindings, ordered by prefix.
    pub fn in_scope(&self) -> impl Iterator<Item = (&str, &str)> {
        self.bindings
            .iter()
            .filter_map(|(p, s)| s.last().map(|u| (p.as_str(), u.as_str())))
    }

    pub fn snapshot(&self) -> NamespaceSnapshot {
        NamespaceSnapshot(Arc::new(self.frames.clone()))
    }
}

/// Split a qualified name into `(prefix, local)`; prefix is `""` when absent.
pub fn split_qname(qname: &str) -> (&str, &str) {
    match qname.split_once(':') {
        Some((p, l)) => (p, l),
        None => ("", qname),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NONE: [(&str, &str); 0] = [];

    #[test]
    fn nested_redeclaration_restores_outer_binding() {
        let mut scopes = NamespaceScopes::new();
        scopes.enter([("a", "urn:outer")]);
        scopes.enter([("a", "urn:inner")]);
        assert_eq!(scopes.resolve("a"), Some("urn:inner"));
        scopes.leave();
        assert_eq!(scopes.resolve("a"), Some("urn:outer"));
        scopes.leave();
        assert_eq!(scopes.resolve("a"), None);
    }

    #[test]
    fn closing_inherited_ancestors_drops_their_bindings() {
        let snap = NamespaceSnapshot::from_frames([
            vec![("x", "urn:x1")],
            vec![],
            vec![("x", "urn:x2"), ("", "urn:g")],
        ]);
        let mut scopes = NamespaceScopes::from_snapshot(&snap);
        assert_eq!(scopes.depth(), 3);
        assert_eq!(scopes.resolve(""), Some("urn:g"));

        scopes.leave();
        assert_eq!(scopes.resolve("x"), Some("urn:x1"));
        assert_eq!(scopes.resolve(""), None);
        scopes.leave();
        scopes.leave();
        assert_eq!(scopes.resolve("x"), None);

        // Nothing left to close.
        scopes.leave();
        assert_eq!(scopes.depth(), 0);
        assert_eq!(snap.stack("x"), ["urn:x1", "urn:x2"]);
    }

    #[test]
    fn snapshot_round_trips_frames() {
        let mut scopes = NamespaceScopes::new();
        scopes.enter(NONE);
        scopes.enter([("p", "urn:p")]);
        let snap = scopes.snapshot();
        assert_eq!(snap.depth(), 2);
        assert!(!snap.is_empty());
        assert_eq!(snap.prefixes().collect::<Vec<_>>(), ["p"]);
        assert_eq!(NamespaceScopes::from_snapshot(&snap).snapshot(), snap);
    }

    #[test]
    fn empty_default_namespace_undeclares() {
        let mut scopes = NamespaceScopes::new();
        scopes.enter([("", "urn:d")]);
        scopes.enter([("", "")]);
        assert_eq!(scopes.resolve(""), None);
        scopes.leave();
        assert_eq!(scopes.resolve(""), Some("urn:d"));
    }

    #[test]
    fn snapshot_is_independent_of_later_changes() {
        let mut scopes = NamespaceScopes::new();
        scopes.enter([("p", "urn:p")]);
        let snap = scopes.snapshot();
        scopes.leave();
        assert_eq!(snap.resolve("p"), Some("urn:p"));
        assert_eq!(scopes.resolve("p"), None);
    }

    #[test]
    fn xml_prefix_is_always_bound() {
        assert_eq!(NamespaceScopes::new().resolve("xml"), Some(XML_NAMESPACE));
    }
}
