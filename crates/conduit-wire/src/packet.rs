//! The wire envelope: a tag, an optional stream identifier, and a body
//! variant. Fields and defaults are taken directly from
//! `vow/rpc/wire.py`'s `Type` enum and dataclasses; `spec.md` §3/§6 is
//! authoritative where the two disagree (notably `StepAck` carrying a
//! `body` field here, which the original omits).

use conduit_marsh::{Described, FieldShape, NamedValue, TypeShape, Value};

/// Exact wire tags, per spec.md §6. `Stepa` is `step` acknowledgment —
/// the whimsical-looking shortening is the protocol's, not a typo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Type {
    Service,
    Header,
    Begin,
    Accepted,
    Denied,
    Request,
    Error,
    Cancel,
    Start,
    Step,
    StepAck,
    End,
}

pub const ALL_TAGS: [Type; 12] = [
    Type::Service,
    Type::Header,
    Type::Begin,
    Type::Accepted,
    Type::Denied,
    Type::Request,
    Type::Error,
    Type::Cancel,
    Type::Start,
    Type::Step,
    Type::StepAck,
    Type::End,
];

impl Type {
    pub fn as_str(self) -> &'static str {
        match self {
            Type::Service => "service",
            Type::Header => "header",
            Type::Begin => "begin",
            Type::Accepted => "accepted",
            Type::Denied => "denied",
            Type::Request => "request",
            Type::Error => "error",
            Type::Cancel => "cancel",
            Type::Start => "start",
            Type::Step => "step",
            Type::StepAck => "stepa",
            Type::End => "end",
        }
    }

    pub fn from_str(s: &str) -> Option<Type> {
        ALL_TAGS.iter().copied().find(|t| t.as_str() == s)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Service {
    pub name: String,
    pub version: String,
    pub proto: String,
}

impl Service {
    /// `version`/`proto` default to `"0.1.0"`, the original's dataclass
    /// defaults — applied here rather than by the engine, since the
    /// engine's optional-field mechanism only understands a null default.
    pub fn offer(name: impl Into<String>) -> Self {
        Service {
            name: name.into(),
            version: "0.1.0".into(),
            proto: "0.1.0".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub name: String,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Begin;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Accepted;

#[derive(Debug, Clone, PartialEq)]
pub struct Denied {
    pub reason: String,
    pub value: Option<Value>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorBody {
    pub kind: String,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cancel {
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Start {
    pub buffer: u32,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Step {
    pub index: u64,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepAck {
    pub index: u64,
    pub buffer: Option<u32>,
    pub body: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct End {
    pub cancelled: bool,
    pub body: Value,
}

/// The Packet body's discriminated union. `Body::tag` is the lookup
/// table `vow/rpc/wire.py::PACKET_TYPE_MAP` collapses into a `match` in a
/// systems language — no need to carry a parallel runtime table.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Service(Service),
    Header(Header),
    Begin(Begin),
    Accepted(Accepted),
    Denied(Denied),
    Request(Request),
    Error(ErrorBody),
    Cancel(Cancel),
    Start(Start),
    Step(Step),
    StepAck(StepAck),
    End(End),
}

impl Body {
    pub fn tag(&self) -> Type {
        match self {
            Body::Service(_) => Type::Service,
            Body::Header(_) => Type::Header,
            Body::Begin(_) => Type::Begin,
            Body::Accepted(_) => Type::Accepted,
            Body::Denied(_) => Type::Denied,
            Body::Request(_) => Type::Request,
            Body::Error(_) => Type::Error,
            Body::Cancel(_) => Type::Cancel,
            Body::Start(_) => Type::Start,
            Body::Step(_) => Type::Step,
            Body::StepAck(_) => Type::StepAck,
            Body::End(_) => Type::End,
        }
    }

    /// Lowers this variant to the engine's `Value` tree, as
    /// `Value::NamedValues` in field-declaration order — the input shape
    /// `StructCompose` expects.
    pub fn to_named_values(&self) -> Value {
        let fields: Vec<NamedValue> = match self {
            Body::Service(s) => vec![
                nv("name", Value::Str(s.name.clone())),
                nv("version", Value::Str(s.version.clone())),
                nv("proto", Value::Str(s.proto.clone())),
            ],
            Body::Header(h) => vec![nv("name", Value::Str(h.name.clone())), nv("value", h.value.clone())],
            Body::Begin(_) => vec![],
            Body::Accepted(_) => vec![],
            Body::Denied(d) => vec![
                nv("reason", Value::Str(d.reason.clone())),
                nv("value", d.value.clone().unwrap_or(Value::Null)),
            ],
            Body::Request(r) => vec![nv("method", Value::Str(r.method.clone())), nv("body", r.body.clone())],
            Body::Error(e) => vec![nv("type", Value::Str(e.kind.clone())), nv("body", e.body.clone())],
            Body::Cancel(c) => vec![nv(
                "reason",
                c.reason.clone().map(Value::Str).unwrap_or(Value::Null),
            )],
            Body::Start(s) => vec![
                nv("buffer", Value::Int(i64::from(s.buffer))),
                nv("body", s.body.clone()),
            ],
            Body::Step(s) => vec![
                nv("index", Value::Int(s.index as i64)),
                nv("body", s.body.clone()),
            ],
            Body::StepAck(s) => vec![
                nv("index", Value::Int(s.index as i64)),
                nv(
                    "buffer",
                    s.buffer.map(|b| Value::Int(i64::from(b))).unwrap_or(Value::Null),
                ),
                nv("body", s.body.clone()),
            ],
            Body::End(e) => vec![
                nv("cancelled", Value::Bool(e.cancelled)),
                nv("body", e.body.clone()),
            ],
        };
        Value::NamedValues(fields)
    }

    /// The inverse of [`Body::to_named_values`]: reconstructs the typed
    /// variant from the engine's decoded `NamedValues`, for the tag the
    /// caller has already selected via the discriminant.
    pub fn from_named_values(tag: Type, value: Value) -> Result<Body, String> {
        let Value::NamedValues(fields) = value else {
            return Err(format!("{tag} body did not decode to a struct"));
        };
        let get = |name: &str| fields.iter().find(|f| f.name == name).map(|f| f.value.clone());
        let get_str = |name: &str| -> Result<String, String> {
            get(name)
                .and_then(|v| v.as_str().map(str::to_string))
                .ok_or_else(|| format!("{tag}.{name} missing or not a string"))
        };
        Ok(match tag {
            Type::Service => Body::Service(Service {
                name: get_str("name")?,
                version: get_str("version")?,
                proto: get_str("proto")?,
            }),
            Type::Header => Body::Header(Header {
                name: get_str("name")?,
                value: get("value").unwrap_or(Value::Null),
            }),
            Type::Begin => Body::Begin(Begin),
            Type::Accepted => Body::Accepted(Accepted),
            Type::Denied => Body::Denied(Denied {
                reason: get_str("reason")?,
                value: get("value").filter(|v| !v.is_null()),
            }),
            Type::Request => Body::Request(Request {
                method: get_str("method")?,
                body: get("body").unwrap_or(Value::Null),
            }),
            Type::Error => Body::Error(ErrorBody {
                kind: get_str("type")?,
                body: get("body").unwrap_or(Value::Null),
            }),
            Type::Cancel => Body::Cancel(Cancel {
                reason: get("reason").and_then(|v| v.as_str().map(str::to_string)),
            }),
            Type::Start => Body::Start(Start {
                buffer: get("buffer")
                    .and_then(|v| v.as_int())
                    .ok_or_else(|| "start.buffer missing".to_string())? as u32,
                body: get("body").unwrap_or(Value::Null),
            }),
            Type::Step => Body::Step(Step {
                index: get("index")
                    .and_then(|v| v.as_int())
                    .ok_or_else(|| "step.index missing".to_string())? as u64,
                body: get("body").unwrap_or(Value::Null),
            }),
            Type::StepAck => Body::StepAck(StepAck {
                index: get("index")
                    .and_then(|v| v.as_int())
                    .ok_or_else(|| "stepa.index missing".to_string())? as u64,
                buffer: get("buffer").and_then(|v| v.as_int()).map(|n| n as u32),
                body: get("body").unwrap_or(Value::Null),
            }),
            Type::End => Body::End(End {
                cancelled: matches!(get("cancelled"), Some(Value::Bool(true))),
                body: get("body").unwrap_or(Value::Null),
            }),
        })
    }
}

fn nv(name: &str, value: Value) -> NamedValue {
    NamedValue {
        name: name.to_string(),
        value,
    }
}

/// The shape of each body variant, consumed by [`crate::codec`] to build
/// the engine graph. Header-phase variants (`Begin`/`Accepted`) carry no
/// fields; data-phase variants carry the free-form `body`/`value` payload
/// as `TypeShape::Any`.
pub fn body_shape(tag: Type) -> TypeShape {
    let field = |name: &str, shape: TypeShape, optional: bool| FieldShape {
        name: name.to_string(),
        shape,
        optional,
    };
    let name = tag.as_str();
    TypeShape::Struct {
        name: name.to_string(),
        fields: match tag {
            Type::Service => vec![
                field("name", TypeShape::Str, false),
                field("version", TypeShape::Str, false),
                field("proto", TypeShape::Str, false),
            ],
            Type::Header => vec![
                field("name", TypeShape::Str, false),
                field("value", TypeShape::Any, true),
            ],
            Type::Begin | Type::Accepted => vec![],
            Type::Denied => vec![
                field("reason", TypeShape::Str, false),
                field("value", TypeShape::Any, true),
            ],
            Type::Request => vec![
                field("method", TypeShape::Str, false),
                field("body", TypeShape::Any, true),
            ],
            Type::Error => vec![
                field("type", TypeShape::Str, false),
                field("body", TypeShape::Any, true),
            ],
            Type::Cancel => vec![field("reason", TypeShape::Optional(Box::new(TypeShape::Str)), true)],
            Type::Start => vec![
                field("buffer", TypeShape::Int, false),
                field("body", TypeShape::Any, true),
            ],
            Type::Step => vec![
                field("index", TypeShape::Int, false),
                field("body", TypeShape::Any, true),
            ],
            Type::StepAck => vec![
                field("index", TypeShape::Int, false),
                field("buffer", TypeShape::Optional(Box::new(TypeShape::Int)), true),
                field("body", TypeShape::Any, true),
            ],
            Type::End => vec![
                field("cancelled", TypeShape::Bool, false),
                field("body", TypeShape::Any, true),
            ],
        },
    }
}

/// The envelope itself. `stream` is `None` for session-control packets
/// (`Service`/`Header`/`Begin`/`Accepted`/`Denied`) and `Some` for
/// data-phase packets, enforced by the session state machine rather than
/// by this type (spec.md §3's invariant spans both the envelope and the
/// state machine that produces it).
#[derive(Debug, Clone, PartialEq)]
pub struct Packet {
    pub stream: Option<String>,
    pub body: Body,
}

impl Packet {
    pub fn control(body: Body) -> Self {
        Packet { stream: None, body }
    }

    pub fn data(stream: impl Into<String>, body: Body) -> Self {
        Packet {
            stream: Some(stream.into()),
            body,
        }
    }
}

/// A marker type so the crate can offer a [`Described`] impl for tooling
/// that wants to walk the whole `Packet` shape generically (e.g. a future
/// schema generator) without needing one-off code — the codec itself
/// uses [`body_shape`] directly since its per-tag branch structure isn't
/// expressible as a single struct.
pub struct PacketMarker;

impl Described for PacketMarker {
    fn type_name() -> &'static str {
        "Packet"
    }

    fn shape() -> TypeShape {
        TypeShape::Struct {
            name: "Packet".into(),
            fields: vec![
                FieldShape {
                    name: "stream".into(),
                    shape: TypeShape::Optional(Box::new(TypeShape::Str)),
                    optional: true,
                },
                FieldShape {
                    name: "body".into(),
                    shape: TypeShape::Any,
                    optional: false,
                },
            ],
        }
    }
}
