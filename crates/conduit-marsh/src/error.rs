use crate::value::Value;
use std::fmt;

/// Reason tags carried by [`MarshError`], ported verbatim from
/// `vow/marsh/error.py` and the leaf mappers in `vow/marsh/impl/*.py`,
/// except `BufferNeeded` which spec.md renames from the original's
/// `buffer_overrun`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reason {
    /// Not a terminal error — signals the frame reader to refill and retry.
    BufferNeeded,
    NotBytes,
    NotInt,
    AttrMissing,
    KeyMissing,
    Unmappable,
    InvalidEnumKey,
    NotInstance,
    Json,
    EnumNotEnum,
    InvalidObj,
    UnsupportedFieldDefn,
}

impl Reason {
    pub fn as_str(self) -> &'static str {
        match self {
            Reason::BufferNeeded => "buffer_needed",
            Reason::NotBytes => "not_bytes",
            Reason::NotInt => "not_int",
            Reason::AttrMissing => "attr_missing",
            Reason::KeyMissing => "key_missing",
            Reason::Unmappable => "unmappable",
            Reason::InvalidEnumKey => "invalid_enum_key",
            Reason::NotInstance => "not_instance",
            Reason::Json => "json",
            Reason::EnumNotEnum => "enum_not_enum",
            Reason::InvalidObj => "invalid_obj",
            Reason::UnsupportedFieldDefn => "unsupported_field_defn",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A serialization error: reason tag, hierarchical path, the offending
/// value, and an optional cause. Mirrors `vow/marsh/error.py::SerializationError`.
///
/// `path` accumulates from the innermost failing mapper outward: each
/// enclosing mapper prepends its own segment via [`MarshError::with_path`]
/// as the error unwinds, so the final path reads left-to-right from the
/// root (`struct.field.$attr`), matching the original's
/// `replace(self, path=list(path) + self.path)`.
#[derive(Debug, thiserror::Error)]
#[error("{reason}: {message}")]
pub struct MarshError {
    pub reason: Reason,
    pub path: Vec<String>,
    pub value: Option<Value>,
    pub message: String,
    #[source]
    pub cause: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl MarshError {
    pub fn new(reason: Reason, message: impl Into<String>) -> Self {
        MarshError {
            reason,
            path: Vec::new(),
            value: None,
            message: message.into(),
            cause: None,
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn with_cause(mut self, cause: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Prepends `segment` to the error's path. Called by each enclosing
    /// mapper on the way out, so the deepest failure contributes the
    /// rightmost path element.
    pub fn with_path(mut self, segment: impl Into<String>) -> Self {
        self.path.insert(0, segment.into());
        self
    }

    pub fn is_buffer_needed(&self) -> bool {
        self.reason == Reason::BufferNeeded
    }

    pub fn buffer_needed() -> Self {
        MarshError::new(Reason::BufferNeeded, "not enough bytes buffered")
    }
}
