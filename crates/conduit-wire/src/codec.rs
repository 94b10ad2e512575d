//! Layers the [`Packet`] discriminated union on top of raw JSON values.
//! The body's branch is genuinely data-dependent (the wire `type` tag
//! selects which struct shape `body` must decode as), so — per the
//! reflective-serialization design note — this is the one place a small
//! runtime-assembled descriptor graph is used instead of hand-written
//! field access: the graph is built once, lazily, per flavor, and reused
//! for every packet.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use conduit_marsh::{apply, Descriptor, Flavor, Graph, Linker, RefRegistry, Value, Walker};

use crate::error::PacketError;
use crate::packet::{body_shape, Body, Packet, Type, ALL_TAGS};

struct NoRefs;

impl RefRegistry for NoRefs {
    fn resolve(&self, _qualified_name: &str) -> Option<Descriptor> {
        None
    }
}

/// Builds the `Descriptor::Discriminant` over all twelve body shapes and
/// links it into a `Graph`. None of the branches reference each other, so
/// the registry never needs to resolve anything — but the call still goes
/// through `Linker`, not a hand-rolled match, to keep the "JSON codec
/// built from the engine" contract real rather than nominal.
fn build_graph(flavor: Flavor) -> Graph {
    let walker = Walker::new(flavor, &|_: &str| None);
    let branches = ALL_TAGS
        .iter()
        .map(|tag| {
            let desc = walker
                .inline(&body_shape(*tag))
                .expect("body shapes are hand-written and always resolvable");
            (tag.as_str().to_string(), desc)
        })
        .collect();
    let root = Descriptor::Discriminant {
        key_field: "type".to_string(),
        branches,
    };
    Linker::new(&NoRefs)
        .link(vec![("Packet".to_string(), root)])
        .expect("the packet discriminant graph always links")
}

fn encode_graph() -> &'static Graph {
    static GRAPH: OnceLock<Graph> = OnceLock::new();
    GRAPH.get_or_init(|| build_graph(Flavor::JsonEncode))
}

fn decode_graph() -> &'static Graph {
    static GRAPH: OnceLock<Graph> = OnceLock::new();
    GRAPH.get_or_init(|| build_graph(Flavor::JsonDecode))
}

/// Encodes a [`Packet`] to the wire JSON object `{type, stream, body}`,
/// per spec.md §4.5. `type` is derived from the body variant, never
/// stored redundantly alongside it.
pub fn encode_packet(packet: &Packet) -> Result<serde_json::Value, PacketError> {
    let tag = packet.body.tag();
    let graph = encode_graph();
    let root = graph
        .root("Packet")
        .expect("Packet root is always registered");
    let input = Value::Map(BTreeMap::from([
        ("type".to_string(), Value::Str(tag.as_str().to_string())),
        ("$body".to_string(), packet.body.to_named_values()),
    ]));
    let body_value = apply(graph, root, input)?;

    let mut obj = BTreeMap::new();
    obj.insert("type".to_string(), Value::Str(tag.as_str().to_string()));
    obj.insert(
        "stream".to_string(),
        packet
            .stream
            .clone()
            .map(Value::Str)
            .unwrap_or(Value::Null),
    );
    obj.insert("body".to_string(), body_value);
    Ok(Value::Map(obj).into())
}

/// Decodes a wire JSON object into a [`Packet`]. Rejects unknown
/// top-level keys and unknown `type` tags as protocol errors, per
/// spec.md §4.5/§6.
pub fn decode_packet(json: serde_json::Value) -> Result<Packet, PacketError> {
    let Value::Map(mut obj) = Value::from(json) else {
        return Err(PacketError::NotObject);
    };
    for key in obj.keys() {
        if !matches!(key.as_str(), "type" | "stream" | "body") {
            return Err(PacketError::UnknownKey(key.clone()));
        }
    }

    let type_str = obj
        .remove("type")
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or(PacketError::MissingType)?;
    let tag = Type::from_str(&type_str).ok_or_else(|| PacketError::UnknownType(type_str.clone()))?;

    let stream = match obj.remove("stream") {
        None | Some(Value::Null) => None,
        Some(Value::Str(s)) => Some(s),
        Some(_) => return Err(PacketError::InvalidStream),
    };

    let body_json = obj.remove("body").ok_or(PacketError::MissingBody)?;

    let graph = decode_graph();
    let root = graph
        .root("Packet")
        .expect("Packet root is always registered");
    let input = Value::Map(BTreeMap::from([
        ("type".to_string(), Value::Str(type_str)),
        ("$body".to_string(), body_json),
    ]));
    let decoded = apply(graph, root, input)?;
    let body = Body::from_named_values(tag, decoded).map_err(PacketError::BodyShape)?;

    Ok(Packet { stream, body })
}
