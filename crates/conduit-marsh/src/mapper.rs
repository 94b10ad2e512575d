use std::collections::BTreeMap;

use crate::datetime;
use crate::descriptor::Primitive;
use crate::error::{MarshError, Reason};
use crate::linker::{Graph, NodeId, NodeKind};
use crate::value::{NamedValue, Value};

/// Applies the mapper at `node` to `value`. Mappers are referentially
/// transparent (spec.md §3) so this is a plain recursive function over the
/// graph rather than a method on a stateful object; the graph supplies all
/// the structure, `apply` supplies the behavior from spec.md §4.2's table.
///
/// Errors accumulate their path on the way back out: each recursive call
/// site wraps a child failure with [`MarshError::with_path`] naming the
/// edge it took, so the final path reads root-to-leaf.
pub fn apply(graph: &Graph, node: NodeId, value: Value) -> Result<Value, MarshError> {
    match graph.kind(node) {
        NodeKind::Identity(primitive) => coerce_identity(*primitive, value),

        NodeKind::Optional(child) => {
            if value.is_null() {
                Ok(Value::Null)
            } else {
                apply(graph, *child, value).map_err(|e| e.with_path("$item"))
            }
        }

        NodeKind::List(child) => {
            let items = value
                .as_list()
                .ok_or_else(|| unmappable(&value, "list"))?
                .to_vec();
            let mut out = Vec::with_capacity(items.len());
            for (i, item) in items.into_iter().enumerate() {
                out.push(apply(graph, *child, item).map_err(|e| e.with_path(format!("[{i}]")))?);
            }
            Ok(Value::List(out))
        }

        NodeKind::Map { key, value: vchild } => {
            let entries = value
                .as_map()
                .ok_or_else(|| unmappable(&value, "map"))?
                .clone();
            let mut out = BTreeMap::new();
            for (k, v) in entries {
                let mapped_key = apply(graph, *key, Value::Str(k.clone()))
                    .map_err(|e| e.with_path(k.clone()))?;
                let key_str = mapped_key
                    .as_str()
                    .ok_or_else(|| {
                        MarshError::new(Reason::Unmappable, "map key did not stringify")
                    })?
                    .to_string();
                let mapped_val =
                    apply(graph, *vchild, v).map_err(|e| e.with_path(k.clone()))?;
                out.insert(key_str, mapped_val);
            }
            Ok(Value::Map(out))
        }

        NodeKind::EnumEncode { variants } => {
            let name = value
                .as_str()
                .ok_or_else(|| unmappable(&value, "enum variant name"))?;
            variants
                .iter()
                .find(|(variant, _)| variant == name)
                .map(|(_, scalar)| Value::Str(scalar.clone()))
                .ok_or_else(|| {
                    MarshError::new(Reason::Unmappable, format!("no such variant {name:?}"))
                })
        }

        NodeKind::EnumDecode { variants } => {
            let scalar = value
                .as_str()
                .ok_or_else(|| MarshError::new(Reason::NotInstance, "enum scalar was not a string"))?;
            variants
                .iter()
                .find(|(_, s)| s == scalar)
                .map(|(name, _)| Value::Str(name.clone()))
                .ok_or_else(|| {
                    MarshError::new(
                        Reason::InvalidEnumKey,
                        format!("unknown enum value {scalar:?}"),
                    )
                    .with_path("$enum")
                })
        }

        NodeKind::StructCompose { fields } => {
            let Value::NamedValues(input_fields) = &value else {
                return Err(unmappable(&value, "struct"));
            };
            let mut out = Vec::with_capacity(fields.len());
            for f in fields {
                let found = input_fields.iter().find(|nv| nv.name == f.name);
                match found {
                    Some(nv) => {
                        let mapped = apply(graph, f.node, nv.value.clone())
                            .map_err(|e| e.with_path(f.name.clone()))?;
                        out.push(NamedValue {
                            name: f.name.clone(),
                            value: mapped,
                        });
                    }
                    None if f.optional => {}
                    None => {
                        return Err(MarshError::new(
                            Reason::AttrMissing,
                            format!("missing attribute {:?}", f.name),
                        )
                        .with_path(f.name.clone()))
                    }
                }
            }
            Ok(Value::NamedValues(out))
        }

        NodeKind::StructDecompose { name, fields } => {
            let Value::Map(m) = &value else {
                return Err(
                    MarshError::new(Reason::NotInstance, format!("{name} expects a JSON object"))
                        .with_value(value.clone()),
                );
            };
            let mut out = Vec::with_capacity(fields.len());
            for f in fields {
                match m.get(&f.name) {
                    Some(v) => {
                        let mapped = apply(graph, f.node, v.clone())
                            .map_err(|e| e.with_path(f.name.clone()))?;
                        out.push(NamedValue {
                            name: f.name.clone(),
                            value: mapped,
                        });
                    }
                    None if f.optional => out.push(NamedValue {
                        name: f.name.clone(),
                        value: Value::Null,
                    }),
                    None => {
                        return Err(MarshError::new(
                            Reason::KeyMissing,
                            format!("missing field {:?}", f.name),
                        )
                        .with_path(f.name.clone()))
                    }
                }
            }
            Ok(Value::NamedValues(out))
        }

        NodeKind::Discriminant { key_field, branches } => {
            let Value::Map(m) = &value else {
                return Err(unmappable(&value, "discriminated object"));
            };
            let tag = m
                .get(key_field)
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    MarshError::new(Reason::KeyMissing, format!("missing {key_field:?}"))
                        .with_path(key_field.clone())
                })?
                .to_string();
            let body = m.get("$body").cloned().unwrap_or(Value::Null);
            let (_, branch) = branches
                .iter()
                .find(|(t, _)| t == &tag)
                .ok_or_else(|| {
                    MarshError::new(Reason::KeyMissing, format!("unknown discriminant {tag:?}"))
                        .with_path(key_field.clone())
                })?;
            apply(graph, *branch, body).map_err(|e| e.with_path(tag.clone()))
        }

        NodeKind::Concat(items) => {
            let mut bytes = Vec::new();
            for id in items {
                match apply(graph, *id, value.clone())? {
                    Value::Bytes(b) => bytes.extend(b),
                    other => return Err(unmappable(&other, "bytes")),
                }
            }
            Ok(Value::Bytes(bytes))
        }

        NodeKind::Timestamp { encode } => {
            if *encode {
                let s = value
                    .as_str()
                    .ok_or_else(|| unmappable(&value, "ISO-8601 timestamp string"))?;
                let ts = datetime::decode_timestamp(s)?;
                Ok(Value::Str(datetime::encode_timestamp(&ts)))
            } else {
                let s = value
                    .as_str()
                    .ok_or_else(|| unmappable(&value, "ISO-8601 timestamp string"))?;
                datetime::decode_timestamp(s)?;
                Ok(Value::Str(s.to_string()))
            }
        }

        NodeKind::Duration { .. } => {
            let seconds = match &value {
                Value::Int(n) => *n as f64,
                Value::Float(n) => *n,
                _ => return Err(unmappable(&value, "duration seconds")),
            };
            let d = datetime::decode_duration(seconds);
            Ok(Value::Float(datetime::encode_duration(&d)))
        }

        NodeKind::Varint { encode } => {
            if *encode {
                let n = value
                    .as_int()
                    .ok_or_else(|| MarshError::new(Reason::NotInt, "varint expects an integer"))?;
                if n < 0 {
                    return Err(MarshError::new(Reason::NotInt, "varint is non-negative"));
                }
                Ok(Value::Bytes(crate::varint::varint_encode(n as u64)))
            } else {
                let bytes = value
                    .as_bytes()
                    .ok_or_else(|| MarshError::new(Reason::NotBytes, "varint decode expects bytes"))?;
                let (n, consumed) = crate::varint::varint_decode(bytes)?;
                Ok(Value::List(vec![
                    Value::Int(n as i64),
                    Value::Bytes(bytes[consumed..].to_vec()),
                ]))
            }
        }

        NodeKind::LengthPrefixedBytes => {
            let items = value
                .as_list()
                .ok_or_else(|| unmappable(&value, "(size, bytes) pair"))?;
            let size = items
                .first()
                .and_then(Value::as_int)
                .ok_or_else(|| MarshError::new(Reason::NotInt, "expected size"))? as usize;
            let body = items
                .get(1)
                .and_then(Value::as_bytes)
                .ok_or_else(|| MarshError::new(Reason::NotBytes, "expected bytes"))?;
            if body.len() < size {
                return Err(MarshError::buffer_needed());
            }
            Ok(Value::List(vec![
                Value::Bytes(body[..size].to_vec()),
                Value::Bytes(body[size..].to_vec()),
            ]))
        }

        NodeKind::JsonEncodeBytes => {
            let json: serde_json::Value = value.into();
            let bytes = serde_json::to_vec(&json)
                .map_err(|e| MarshError::new(Reason::Json, "failed to encode JSON").with_cause(e))?;
            Ok(Value::Bytes(bytes))
        }

        NodeKind::AttrLookup { name, child } => {
            let Value::NamedValues(fields) = &value else {
                return Err(unmappable(&value, "object"));
            };
            let found = fields
                .iter()
                .find(|nv| &nv.name == name)
                .ok_or_else(|| {
                    MarshError::new(Reason::AttrMissing, format!("missing attribute {name:?}"))
                        .with_path(name.clone())
                })?;
            apply(graph, *child, found.value.clone()).map_err(|e| e.with_path(name.clone()))
        }

        NodeKind::ItemLookup { name, child } => {
            let m = value
                .as_map()
                .ok_or_else(|| unmappable(&value, "mapping"))?;
            let found = m.get(name).ok_or_else(|| {
                MarshError::new(Reason::KeyMissing, format!("missing key {name:?}"))
                    .with_path(name.clone())
            })?;
            apply(graph, *child, found.clone()).map_err(|e| e.with_path(name.clone()))
        }

        NodeKind::Length(child) => {
            let out = apply(graph, *child, value)?;
            let len = match &out {
                Value::Str(s) => s.chars().count(),
                Value::Bytes(b) => b.len(),
                Value::List(l) => l.len(),
                _ => return Err(unmappable(&out, "string, bytes, or list")),
            };
            Ok(Value::Int(len as i64))
        }

        NodeKind::With(a, b) => {
            let intermediate = apply(graph, *a, value)?;
            apply(graph, *b, intermediate)
        }

        NodeKind::Lookup(table) => {
            let key = match &value {
                Value::Str(s) => s.clone(),
                Value::Int(n) => n.to_string(),
                _ => return Err(unmappable(&value, "string or int lookup key")),
            };
            table
                .iter()
                .find(|(k, _)| k == &key)
                .map(|(_, v)| v.clone())
                .ok_or_else(|| {
                    MarshError::new(Reason::KeyMissing, format!("no such key {key:?}"))
                })
        }

        NodeKind::Trace { child, label } => {
            let result = apply(graph, *child, value);
            match &result {
                Ok(v) => tracing::trace!(label = %label, value = %v, "mapper trace"),
                Err(e) => tracing::trace!(label = %label, error = %e, "mapper trace"),
            }
            result
        }

        NodeKind::JsonDecodeBytes => {
            let bytes = value
                .as_bytes()
                .ok_or_else(|| MarshError::new(Reason::NotBytes, "expected bytes"))?;
            let json: serde_json::Value = serde_json::from_slice(bytes)
                .map_err(|e| MarshError::new(Reason::Json, "failed to decode JSON").with_cause(e))?;
            Ok(json.into())
        }
    }
}

/// `self.type(obj)` in `ThisMapper.serialize`: `None` passes the value
/// through untouched; `Some(p)` validates or coerces it to `p`, failing
/// `unmappable` the way a rejected Python cast would raise.
fn coerce_identity(primitive: Option<Primitive>, value: Value) -> Result<Value, MarshError> {
    let Some(primitive) = primitive else {
        return Ok(value);
    };
    match primitive {
        Primitive::Bool => match &value {
            Value::Bool(_) => Ok(value),
            Value::Int(n) => Ok(Value::Bool(*n != 0)),
            Value::Float(f) => Ok(Value::Bool(*f != 0.0)),
            Value::Str(s) => Ok(Value::Bool(!s.is_empty())),
            Value::Null => Ok(Value::Bool(false)),
            _ => Err(unmappable(&value, "bool")),
        },
        Primitive::Int => match &value {
            Value::Int(_) => Ok(value),
            Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
            Value::Float(f) => Ok(Value::Int(*f as i64)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| unmappable(&value, "int")),
            _ => Err(unmappable(&value, "int")),
        },
        Primitive::Float => match &value {
            Value::Float(_) => Ok(value),
            Value::Int(n) => Ok(Value::Float(*n as f64)),
            Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| unmappable(&value, "float")),
            _ => Err(unmappable(&value, "float")),
        },
        Primitive::Str => match &value {
            Value::Str(_) => Ok(value),
            Value::Bool(b) => Ok(Value::Str(if *b { "true" } else { "false" }.to_string())),
            Value::Int(n) => Ok(Value::Str(n.to_string())),
            Value::Float(f) => Ok(Value::Str(f.to_string())),
            Value::Null => Ok(Value::Str(String::new())),
            _ => Err(unmappable(&value, "str")),
        },
    }
}

fn unmappable(value: &Value, expected: &str) -> MarshError {
    MarshError::new(
        Reason::Unmappable,
        format!("expected {expected}, got {}", value.kind_name()),
    )
    .with_value(value.clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::Descriptor;
    use crate::linker::{Linker, RefRegistry};
    use std::collections::BTreeMap;

    struct NoRefs;
    impl RefRegistry for NoRefs {
        fn resolve(&self, _name: &str) -> Option<Descriptor> {
            None
        }
    }

    fn link(desc: Descriptor) -> (Graph, NodeId) {
        let graph = Linker::new(&NoRefs).link(vec![("root".into(), desc)]).unwrap();
        let root = graph.root("root").unwrap();
        (graph, root)
    }

    #[test]
    fn attr_lookup_applies_child_to_named_field() {
        let (graph, root) = link(Descriptor::AttrLookup {
            name: "x".into(),
            child: Box::new(Descriptor::Identity(None)),
        });
        let input = Value::NamedValues(vec![NamedValue { name: "x".into(), value: Value::Int(5) }]);
        assert_eq!(apply(&graph, root, input).unwrap(), Value::Int(5));
    }

    #[test]
    fn attr_lookup_missing_field_is_attr_missing() {
        let (graph, root) = link(Descriptor::AttrLookup {
            name: "x".into(),
            child: Box::new(Descriptor::Identity(None)),
        });
        let err = apply(&graph, root, Value::NamedValues(vec![])).unwrap_err();
        assert_eq!(err.reason, Reason::AttrMissing);
        assert_eq!(err.path, vec!["x".to_string()]);
    }

    #[test]
    fn item_lookup_missing_key_is_key_missing() {
        let (graph, root) = link(Descriptor::ItemLookup {
            name: "k".into(),
            child: Box::new(Descriptor::Identity(None)),
        });
        let err = apply(&graph, root, Value::Map(BTreeMap::new())).unwrap_err();
        assert_eq!(err.reason, Reason::KeyMissing);
        assert_eq!(err.path, vec!["k".to_string()]);
    }

    #[test]
    fn length_counts_list_and_string_items() {
        let (graph, root) = link(Descriptor::Length(Box::new(Descriptor::Identity(None))));
        assert_eq!(
            apply(&graph, root, Value::List(vec![Value::Int(1), Value::Int(2)])).unwrap(),
            Value::Int(2)
        );
        assert_eq!(
            apply(&graph, root, Value::Str("hello".into())).unwrap(),
            Value::Int(5)
        );
    }

    #[test]
    fn with_sequences_two_mappers() {
        let (graph, root) = link(Descriptor::With(
            Box::new(Descriptor::Identity(None)),
            Box::new(Descriptor::Length(Box::new(Descriptor::Identity(None)))),
        ));
        assert_eq!(
            apply(&graph, root, Value::Str("abc".into())).unwrap(),
            Value::Int(3)
        );
    }

    #[test]
    fn lookup_resolves_table_entries_and_fails_on_miss() {
        let (graph, root) = link(Descriptor::Lookup(vec![
            ("red".into(), Value::Int(1)),
            ("blue".into(), Value::Int(2)),
        ]));
        assert_eq!(apply(&graph, root, Value::Str("red".into())).unwrap(), Value::Int(1));
        let err = apply(&graph, root, Value::Str("green".into())).unwrap_err();
        assert_eq!(err.reason, Reason::KeyMissing);
    }

    #[test]
    fn trace_is_a_semantic_no_op() {
        let (graph, root) = link(Descriptor::Trace {
            child: Box::new(Descriptor::Identity(None)),
            label: "probe".into(),
        });
        assert_eq!(apply(&graph, root, Value::Int(42)).unwrap(), Value::Int(42));
    }

    #[test]
    fn identity_none_is_an_unvalidated_passthrough() {
        let (graph, root) = link(Descriptor::Identity(None));
        assert_eq!(
            apply(&graph, root, Value::Map(BTreeMap::new())).unwrap(),
            Value::Map(BTreeMap::new())
        );
    }

    #[test]
    fn identity_int_coerces_float_and_bool_and_rejects_bad_strings() {
        let (graph, root) = link(Descriptor::Identity(Some(crate::descriptor::Primitive::Int)));
        assert_eq!(apply(&graph, root, Value::Float(3.9)).unwrap(), Value::Int(3));
        assert_eq!(apply(&graph, root, Value::Bool(true)).unwrap(), Value::Int(1));
        assert_eq!(apply(&graph, root, Value::Str(" 42 ".into())).unwrap(), Value::Int(42));
        let err = apply(&graph, root, Value::Str("nope".into())).unwrap_err();
        assert_eq!(err.reason, Reason::Unmappable);
    }

    #[test]
    fn identity_bool_treats_empty_string_and_null_as_false() {
        let (graph, root) = link(Descriptor::Identity(Some(crate::descriptor::Primitive::Bool)));
        assert_eq!(apply(&graph, root, Value::Str(String::new())).unwrap(), Value::Bool(false));
        assert_eq!(apply(&graph, root, Value::Str("x".into())).unwrap(), Value::Bool(true));
        assert_eq!(apply(&graph, root, Value::Null).unwrap(), Value::Bool(false));
    }

    #[test]
    fn identity_str_rejects_list_and_map() {
        let (graph, root) = link(Descriptor::Identity(Some(crate::descriptor::Primitive::Str)));
        assert_eq!(apply(&graph, root, Value::Int(7)).unwrap(), Value::Str("7".into()));
        let err = apply(&graph, root, Value::List(vec![])).unwrap_err();
        assert_eq!(err.reason, Reason::Unmappable);
    }
}
