use std::collections::BTreeMap;
use std::fmt;

/// The uniform value representation every mapper reads and writes.
///
/// Domain types never flow through the engine directly — they are lowered
/// to and raised from `Value` at the edges (either by hand, for plain
/// structs, or through [`crate::descriptor::Described`] for types whose
/// shape is walked at runtime). This plays the role the original's bare
/// `Any` + `getattr`/`__getitem__` access played, without relying on
/// reflection Rust doesn't have.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    List(Vec<Value>),
    /// A struct's field order matters for composition, so this is a plain
    /// ordered sequence, not a map.
    NamedValues(Vec<NamedValue>),
    /// String-keyed map, used by the `Map` mapper and by decoded JSON
    /// objects. `BTreeMap` gives deterministic iteration for tests.
    Map(BTreeMap<String, Value>),
}

/// A `(name, value)` pair produced by a struct-field mapper. A field may
/// elect to be absent by simply not appearing in the containing
/// `NamedValues` — there is no explicit "missing" variant; the Rust
/// `Option` at the call site already expresses that.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedValue {
    pub name: String,
    pub value: Value,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Kind name used in error messages (`unmappable`, `not_instance`, ...).
    pub fn kind_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bytes(_) => "bytes",
            Value::List(_) => "list",
            Value::NamedValues(_) => "struct",
            Value::Map(_) => "map",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(n) => write!(f, "{n}"),
            Value::Float(n) => write!(f, "{n}"),
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::List(_) => write!(f, "<list>"),
            Value::NamedValues(_) => write!(f, "<struct>"),
            Value::Map(_) => write!(f, "<map>"),
        }
    }
}

/// Converts a `Value` tree to and from `serde_json::Value`, the boundary
/// the JSON-encode/decode flavors actually speak at (the frame payload is
/// UTF-8 JSON text, not our internal tree).
impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(b),
            Value::Int(n) => serde_json::Value::Number(n.into()),
            Value::Float(n) => serde_json::Number::from_f64(n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Str(s) => serde_json::Value::String(s),
            Value::Bytes(b) => {
                serde_json::Value::Array(b.into_iter().map(|x| (x as i64).into()).collect())
            }
            Value::List(items) => {
                serde_json::Value::Array(items.into_iter().map(Into::into).collect())
            }
            Value::NamedValues(fields) => serde_json::Value::Object(
                fields
                    .into_iter()
                    .map(|nv| (nv.name, nv.value.into()))
                    .collect(),
            ),
            Value::Map(m) => {
                serde_json::Value::Object(m.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => Value::Str(s),
            serde_json::Value::Array(items) => {
                Value::List(items.into_iter().map(Into::into).collect())
            }
            serde_json::Value::Object(map) => {
                Value::Map(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}
