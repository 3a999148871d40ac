//! Helpers for reading HAL+JSON resource envelopes.
//!
//! Remote entities stay loosely typed (`serde_json::Value`); these
//! functions cover the handful of access patterns every operation needs:
//! embedded collection elements, the cross-page `total`, and typed links
//! under `_links`.

use serde_json::Value;

/// Extract the elements of a collection envelope (`_embedded.elements`).
///
/// Returns an empty vector when the envelope has no embedded elements.
#[must_use]
pub fn elements(envelope: &Value) -> Vec<Value> {
    envelope
        .get("_embedded")
        .and_then(|e| e.get("elements"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Total element count across all pages, as reported by the envelope.
#[must_use]
pub fn total(envelope: &Value) -> u64 {
    envelope.get("total").and_then(Value::as_u64).unwrap_or(0)
}

/// The `href` of a named link, if present.
#[must_use]
pub fn link_href<'a>(entity: &'a Value, name: &str) -> Option<&'a str> {
    entity
        .get("_links")
        .and_then(|l| l.get(name))
        .and_then(|l| l.get("href"))
        .and_then(Value::as_str)
}

/// The human-readable `title` of a named link, if present.
#[must_use]
pub fn link_title<'a>(entity: &'a Value, name: &str) -> Option<&'a str> {
    entity
        .get("_links")
        .and_then(|l| l.get(name))
        .and_then(|l| l.get("title"))
        .and_then(Value::as_str)
}

/// Parse the entity ID out of an href's trailing path segment.
#[must_use]
pub fn id_from_href(href: &str) -> Option<i64> {
    href.trim_end_matches('/')
        .rsplit('/')
        .next()
        .and_then(|segment| segment.parse().ok())
}
