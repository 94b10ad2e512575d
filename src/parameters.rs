//! Decodes one HTTP-style parameter from its raw string form(s) into a
//! [`Value`], per spec.md §6: "the core provides only the envelope's type
//! and the mapper factory to decode parameters from strings per an
//! OpenAPI-style style/explode table." The HTTP-binding adapter itself —
//! pulling the raw string(s) out of the URL/query/headers/cookies and
//! picking which `(placement, style, explode)` applies to a given
//! parameter — stays an external collaborator (spec.md §6 Non-goals);
//! this module only covers the "decode from strings" half.
//!
//! Grounded on `vow/oas/serializer.py::SERIALIZER` (keyed by
//! `(Placement, Style, explode)`, dispatching to a `(ser, des)` pair per
//! schema class) and `vow/api/bottle.py::bottle_envelope`'s per-parameter
//! loop. Scalar decoding is handed straight to
//! [`conduit_marsh::Walker`]/[`conduit_marsh::apply`] rather than
//! duplicated here, so a query parameter widens to the same `Value` a
//! JSON body field of the same [`TypeShape`] would.

use std::collections::BTreeMap;

use conduit_marsh::{apply, Flavor, Linker, MarshError, Reason, RefRegistry, TypeShape, Value, Walker};

/// The two `(Style, explode)` families `vow/oas/serializer.py`'s table
/// actually fills in (the others are `None` placeholders there too).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterStyle {
    /// Path/header parameters: scalars as-is, arrays comma-joined.
    Simple,
    /// Query parameters: scalars as-is; arrays/objects comma-joined when
    /// `explode` is `false`, one value per occurrence when `true`.
    Form,
}

/// What the HTTP-binding adapter already extracted for one parameter
/// before handing it to [`decode_parameter`]: either the one string a
/// request carried for it, or — for an exploded array/object, where the
/// same name appears once per element — every occurrence in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawParameter {
    Single(String),
    Multi(Vec<String>),
}

/// Decodes one parameter's raw string(s) against `shape`, honoring
/// `style`/`explode` for containers and deferring scalar coercion to the
/// mapping engine's own `Identity` cast.
pub fn decode_parameter(
    style: ParameterStyle,
    explode: bool,
    shape: &TypeShape,
    raw: RawParameter,
) -> Result<Value, MarshError> {
    let value = assemble(style, explode, shape, raw)?;
    let no_shapes = |_: &str| None;
    let desc = Walker::new(Flavor::JsonDecode, &no_shapes).walk(shape)?;
    let no_refs = |_: &str| None;
    let registry: &dyn RefRegistry = &no_refs;
    let graph = Linker::new(registry).link(vec![("param".into(), desc)])?;
    let root = graph.root("param").expect("just linked under this name");
    apply(&graph, root, value)
}

/// Builds the `Value` a container-aware parameter's declared shape
/// expects, splitting/joining per `style`/`explode`; scalar shapes pass
/// their one string through for the engine to coerce.
fn assemble(
    style: ParameterStyle,
    explode: bool,
    shape: &TypeShape,
    raw: RawParameter,
) -> Result<Value, MarshError> {
    match shape {
        TypeShape::List(_) => {
            let items = match (explode, raw) {
                (true, RawParameter::Multi(values)) => values,
                (true, RawParameter::Single(s)) => vec![s],
                (false, RawParameter::Single(s)) => csv_split(&s),
                (false, RawParameter::Multi(values)) => values,
            };
            Ok(Value::List(items.into_iter().map(Value::Str).collect()))
        }
        TypeShape::Map(_, _) => {
            // `simple_any_dict_ser`'s inverse: a flat `k,v,k,v,...` list.
            // Form/explode=true key=value expansion and Simple-style
            // objects are left unimplemented upstream too.
            let _ = style;
            let _ = explode;
            let joined = match raw {
                RawParameter::Single(s) => s,
                RawParameter::Multi(values) => values.join(","),
            };
            let parts: Vec<&str> = if joined.is_empty() {
                Vec::new()
            } else {
                joined.split(',').collect()
            };
            if parts.len() % 2 != 0 {
                return Err(MarshError::new(
                    Reason::Unmappable,
                    format!("object parameter {joined:?} has an odd number of comma-separated parts"),
                ));
            }
            let mut out = BTreeMap::new();
            for pair in parts.chunks(2) {
                out.insert(pair[0].to_string(), Value::Str(pair[1].to_string()));
            }
            Ok(Value::Map(out))
        }
        _ => {
            let s = match raw {
                RawParameter::Single(s) => s,
                RawParameter::Multi(mut values) => values.pop().unwrap_or_default(),
            };
            Ok(Value::Str(s))
        }
    }
}

fn csv_split(s: &str) -> Vec<String> {
    if s.is_empty() {
        Vec::new()
    } else {
        s.split(',').map(str::to_string).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_int_coerces_through_the_engine() {
        let v = decode_parameter(
            ParameterStyle::Simple,
            false,
            &TypeShape::Int,
            RawParameter::Single("42".into()),
        )
        .unwrap();
        assert_eq!(v, Value::Int(42));
    }

    #[test]
    fn scalar_int_rejects_non_numeric_string() {
        let err = decode_parameter(
            ParameterStyle::Simple,
            false,
            &TypeShape::Int,
            RawParameter::Single("nope".into()),
        )
        .unwrap_err();
        assert_eq!(err.reason, Reason::Unmappable);
    }

    #[test]
    fn form_array_non_exploded_is_comma_split() {
        let v = decode_parameter(
            ParameterStyle::Form,
            false,
            &TypeShape::List(Box::new(TypeShape::Int)),
            RawParameter::Single("1,2,3".into()),
        )
        .unwrap();
        assert_eq!(v, Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]));
    }

    #[test]
    fn form_array_exploded_takes_one_value_per_occurrence() {
        let v = decode_parameter(
            ParameterStyle::Form,
            true,
            &TypeShape::List(Box::new(TypeShape::Str)),
            RawParameter::Multi(vec!["a".into(), "b".into()]),
        )
        .unwrap();
        assert_eq!(v, Value::List(vec![Value::Str("a".into()), Value::Str("b".into())]));
    }

    #[test]
    fn simple_array_is_comma_split_regardless_of_explode() {
        let v = decode_parameter(
            ParameterStyle::Simple,
            false,
            &TypeShape::List(Box::new(TypeShape::Str)),
            RawParameter::Single("red,green,blue".into()),
        )
        .unwrap();
        assert_eq!(
            v,
            Value::List(vec![
                Value::Str("red".into()),
                Value::Str("green".into()),
                Value::Str("blue".into())
            ])
        );
    }

    #[test]
    fn object_parameter_pairs_up_flat_comma_list() {
        let v = decode_parameter(
            ParameterStyle::Form,
            false,
            &TypeShape::Map(Box::new(TypeShape::Str), Box::new(TypeShape::Str)),
            RawParameter::Single("R,100,G,200,B,150".into()),
        )
        .unwrap();
        let mut expected = BTreeMap::new();
        expected.insert("R".to_string(), Value::Str("100".into()));
        expected.insert("G".to_string(), Value::Str("200".into()));
        expected.insert("B".to_string(), Value::Str("150".into()));
        assert_eq!(v, Value::Map(expected));
    }

    #[test]
    fn optional_shape_passes_empty_string_through_as_empty_not_null() {
        // An absent parameter never reaches this factory at all (the
        // adapter's own `required`/`EMPTY` check per `bottle_envelope`
        // happens before calling in); a present-but-empty string still
        // decodes as an empty string, not `Value::Null`.
        let v = decode_parameter(
            ParameterStyle::Simple,
            false,
            &TypeShape::Str,
            RawParameter::Single(String::new()),
        )
        .unwrap();
        assert_eq!(v, Value::Str(String::new()));
    }
}
