use crate::flavor::Flavor;

/// Build-time type information a [`Walker`](crate::walker::Walker) pulls
/// from a domain type — the Rust stand-in for what `Walker.resolve()`
/// pulled from `dataclasses.fields()`/`typing` introspection in the
/// original. Declared types normally derive their shape at compile time;
/// `TypeShape` only needs to be constructed by hand for the data-dependent
/// wire `Packet` discriminated union, per the reflective-serialization
/// design note.
#[derive(Debug, Clone)]
pub enum TypeShape {
    Bool,
    Int,
    Float,
    Str,
    /// Arbitrary JSON, passed through unvalidated — used for the wire
    /// Packet's free-form payload fields (`Header.value`, `Request.body`,
    /// and the like).
    Any,
    Timestamp,
    Duration,
    Optional(Box<TypeShape>),
    List(Box<TypeShape>),
    Map(Box<TypeShape>, Box<TypeShape>),
    Enum {
        name: String,
        /// variant name -> wire scalar
        variants: Vec<(String, String)>,
    },
    Struct {
        name: String,
        fields: Vec<FieldShape>,
    },
    /// A forward or recursive reference, closed by the Linker.
    Ref(String),
}

#[derive(Debug, Clone)]
pub struct FieldShape {
    pub name: String,
    pub shape: TypeShape,
    /// `true` if the field carries a default and may be absent on decode
    /// / dropped on encode when it equals that default.
    pub optional: bool,
}

/// Implemented by types whose shape is walked at runtime rather than
/// derived by hand. Only the wire `Packet` body union implements this in
/// this crate's own code; application types built on top are free to
/// implement it for the same reason.
pub trait Described {
    fn type_name() -> &'static str;
    fn shape() -> TypeShape;
}

/// A build-time node describing one transform and its children. Mirrors
/// `vow/marsh/base.py::Fac` plus the concrete leaf/composite descriptors
/// in `vow/marsh/impl/*.py`. `Descriptor` trees are owned (not shared) —
/// sharing and cycle-closing happen only through [`Descriptor::Ref`],
/// resolved by the [`Linker`](crate::linker::Linker).
/// Target type for an [`Descriptor::Identity`] cast. `None` means pass
/// through unvalidated (`TypeShape::Any`); `Some` validates/coerces the
/// incoming value, mirroring `vow/marsh/impl/any.py::ThisMapper` calling
/// `self.type(obj)` when a concrete type is given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Bool,
    Int,
    Float,
    Str,
}

#[derive(Debug, Clone)]
pub enum Descriptor {
    /// Passthrough (`None`) or coerce to a primitive (`Some`). Fails
    /// `unmappable` on cast rejection.
    Identity(Option<Primitive>),
    Timestamp { encode: bool },
    Duration { encode: bool },
    /// Non-negative integer <-> base-128 little-endian bytes.
    Varint { encode: bool },
    /// `(size, bytes) -> (bytes[..size], bytes[size..])`.
    LengthPrefixedBytes,
    JsonEncodeBytes,
    JsonDecodeBytes,
    Optional(Box<Descriptor>),
    List(Box<Descriptor>),
    Map {
        key: Box<Descriptor>,
        value: Box<Descriptor>,
    },
    /// Enum variant -> scalar(value). Fails `unmappable` if the variant
    /// isn't in the table.
    EnumEncode { variants: Vec<(String, String)> },
    /// Scalar -> enum variant. Fails `invalid_enum_key` on an unknown
    /// scalar.
    EnumDecode { variants: Vec<(String, String)> },
    /// Object -> ordered `NamedValues` (absent fields dropped), in
    /// declaration order.
    StructCompose { fields: Vec<FieldDescriptor> },
    /// Mapping -> constructed object. Missing + non-optional is
    /// `key_missing`.
    StructDecompose {
        name: String,
        fields: Vec<FieldDescriptor>,
    },
    /// Value -> subtree selected by the discriminant's mapped key.
    /// Unknown key is a `key_missing` error.
    Discriminant {
        key_field: String,
        branches: Vec<(String, Descriptor)>,
    },
    /// `value -> concatenated bytes from each child applied to value`,
    /// in declared order.
    Concat(Vec<Descriptor>),
    /// `object -> named attribute value, then child`. Fails `attr_missing`.
    AttrLookup { name: String, child: Box<Descriptor> },
    /// `mapping -> keyed value, then child`. Fails `key_missing`.
    ItemLookup { name: String, child: Box<Descriptor> },
    /// `any -> length of child's output` (string/bytes/list size).
    Length(Box<Descriptor>),
    /// `value -> b(a(value))`. Sequences two mappers.
    With(Box<Descriptor>, Box<Descriptor>),
    /// `value -> table[value]`, keyed by the stringified input. Fails
    /// `key_missing` on miss.
    Lookup(Vec<(String, crate::value::Value)>),
    /// Passthrough with an observability label; no semantic effect.
    Trace { child: Box<Descriptor>, label: String },
    Ref(String),
}

#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    pub name: String,
    pub desc: Descriptor,
    pub optional: bool,
}

impl Descriptor {
    /// Names of this descriptor's direct children, as spec.md §3 requires
    /// every descriptor to enumerate.
    pub fn dependencies(&self) -> Vec<String> {
        match self {
            Descriptor::Identity(_)
            | Descriptor::Timestamp { .. }
            | Descriptor::Duration { .. }
            | Descriptor::Varint { .. }
            | Descriptor::LengthPrefixedBytes
            | Descriptor::JsonEncodeBytes
            | Descriptor::JsonDecodeBytes
            | Descriptor::Ref(_) => Vec::new(),
            Descriptor::Optional(_) | Descriptor::List(_) => vec!["item".into()],
            Descriptor::Map { .. } => vec!["key".into(), "value".into()],
            Descriptor::EnumEncode { .. } | Descriptor::EnumDecode { .. } => Vec::new(),
            Descriptor::StructCompose { fields } | Descriptor::StructDecompose { fields, .. } => {
                fields.iter().map(|f| f.name.clone()).collect()
            }
            Descriptor::Discriminant { branches, .. } => {
                branches.iter().map(|(tag, _)| tag.clone()).collect()
            }
            Descriptor::Concat(items) => (0..items.len()).map(|i| i.to_string()).collect(),
            Descriptor::AttrLookup { .. } | Descriptor::ItemLookup { .. } | Descriptor::Length(_) => {
                vec!["item".into()]
            }
            Descriptor::With(..) => vec!["a".into(), "b".into()],
            Descriptor::Lookup(_) => Vec::new(),
            Descriptor::Trace { .. } => vec!["item".into()],
        }
    }

    pub fn named_ref(flavor: Flavor, name: &str) -> Descriptor {
        Descriptor::Ref(flavor.qualify(name))
    }
}
