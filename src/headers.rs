//! Arbitrary `(name, value)` pairs exchanged during the header phase,
//! per spec.md §3/§6. Two reserved names are recognized case-insensitively
//! but never interpreted — no auth check, no deadline enforcement — per
//! the Non-goals in spec.md §1 and SPEC_FULL.md.

use conduit_marsh::Value;
use conduit_wire::packet::Header as WireHeader;

/// An ordered collection of headers. Kept as a `Vec` rather than a map:
/// the wire protocol allows repeated headers with the same name
/// (`vow/rpc/wire.py` never rejects a duplicate `Header` packet) and
/// order doesn't matter for lookups but is worth preserving for replay.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Headers(Vec<(String, Value)>);

impl Headers {
    pub fn new() -> Self {
        Headers(Vec::new())
    }

    pub fn push(&mut self, name: impl Into<String>, value: Value) {
        self.0.push((name.into(), value));
    }

    pub fn with(mut self, name: impl Into<String>, value: Value) -> Self {
        self.push(name, value);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Case-insensitive lookup of the first header by that name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// The `authorization` header, recognized but not interpreted.
    pub fn authorization(&self) -> Option<&Value> {
        self.get("authorization")
    }

    /// The `deadline` header, recognized but not interpreted.
    pub fn deadline(&self) -> Option<&Value> {
        self.get("deadline")
    }

    pub(crate) fn push_wire(&mut self, h: WireHeader) {
        self.push(h.name, h.value);
    }

    pub(crate) fn to_wire(&self) -> Vec<WireHeader> {
        self.0
            .iter()
            .map(|(name, value)| WireHeader {
                name: name.clone(),
                value: value.clone(),
            })
            .collect()
    }
}
