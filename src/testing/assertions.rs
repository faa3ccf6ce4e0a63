//! Assertions over the records a job produced.

use crate::document::DocumentRecord;
use std::collections::{BTreeMap, HashSet};

/// Assert that no two records share an identifier.
///
/// # Panics
///
/// Panics listing the first duplicated identifier.
pub fn assert_unique_ids(records: &[DocumentRecord]) {
    let mut seen = HashSet::new();
    for r in records {
        assert!(
            seen.insert(r.id.as_str()),
            "duplicate record id {:?} (at {})",
            r.id,
            r.location
        );
    }
}

fn multiset(records: &[DocumentRecord], with_ids: bool) -> BTreeMap<(String, Vec<u8>), usize> {
    let mut m = BTreeMap::new();
    for r in records {
        let id = if with_ids { r.id.clone() } else { String::new() };
        *m.entry((id, r.content.as_bytes().to_vec())).or_insert(0) += 1;
    }
    m
}

fn assert_same(actual: &[DocumentRecord], expected: &[DocumentRecord], with_ids: bool) {
    assert_eq!(
        actual.len(),
        expected.len(),
        "record count mismatch:\n  expected: {}\n  actual: {}",
        expected.len(),
        actual.len()
    );
    let (a, e) = (multiset(actual, with_ids), multiset(expected, with_ids));
    if a != e {
        let missing: Vec<_> = e.keys().filter(|k| a.get(*k) != e.get(*k)).take(5).collect();
        let extra: Vec<_> = a.keys().filter(|k| a.get(*k) != e.get(*k)).take(5).collect();
        panic!("record sets differ:\n  missing or miscounted: {missing:?}\n  extra or miscounted: {extra:?}");
    }
}

/// Assert that both runs produced the same records, by identifier and
/// content, ignoring order.
///
/// # Panics
///
/// Panics if the counts or the record multisets differ.
pub fn assert_same_records(actual: &[DocumentRecord], expected: &[DocumentRecord]) {
    assert_same(actual, expected, true);
}

/// Like [`assert_same_records`] but compares content only, for generated
/// identifiers that depend on the split layout.
///
/// # Panics
///
/// Panics if the counts or the content multisets differ.
pub fn assert_same_contents(actual: &[DocumentRecord], expected: &[DocumentRecord]) {
    assert_same(actual, expected, false);
}

/// Identifiers of `records`, in order.
#[must_use]
pub fn ids(records: &[DocumentRecord]) -> Vec<&str> {
    records.iter().map(|r| r.id.as_str()).collect()
}
