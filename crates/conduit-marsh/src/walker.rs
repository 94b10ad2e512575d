use crate::descriptor::{Descriptor, FieldDescriptor, Primitive, TypeShape};
use crate::error::MarshError;
use crate::flavor::Flavor;
use crate::linker::RefRegistry;

impl Flavor {
    fn is_encode(self) -> bool {
        matches!(self, Flavor::JsonEncode | Flavor::BinaryEncode)
    }
}

/// Builds descriptor trees for one flavor by walking [`TypeShape`]s, per
/// spec.md §4.3. Mirrors `vow/marsh/walker.py::Walker.resolve` — primitives
/// map to `Identity`, containers recurse, named struct/enum types other
/// than the one currently being inlined become [`Descriptor::Ref`]s for
/// the [`crate::linker::Linker`] to close.
pub struct Walker<'a> {
    flavor: Flavor,
    shapes: &'a dyn Fn(&str) -> Option<TypeShape>,
}

impl<'a> Walker<'a> {
    pub fn new(flavor: Flavor, shapes: &'a dyn Fn(&str) -> Option<TypeShape>) -> Self {
        Walker { flavor, shapes }
    }

    /// Resolves a named root type, inlining its top-level struct/enum body
    /// rather than emitting a `Ref` to itself.
    pub fn resolve_root(&self, name: &str) -> Result<Descriptor, MarshError> {
        let shape = (self.shapes)(name).ok_or_else(|| {
            MarshError::new(
                crate::error::Reason::Unmappable,
                format!("no declared shape for {name:?}"),
            )
        })?;
        self.walk_inline(&shape)
    }

    /// Inlines an arbitrary shape's top-level struct/enum body (public
    /// entry point for callers — such as a discriminated union's branch
    /// list — that already have the `TypeShape` in hand rather than a
    /// name to look up).
    pub fn inline(&self, shape: &TypeShape) -> Result<Descriptor, MarshError> {
        self.walk_inline(shape)
    }

    fn walk_inline(&self, shape: &TypeShape) -> Result<Descriptor, MarshError> {
        match shape {
            TypeShape::Struct { name, fields } => {
                let fields = fields
                    .iter()
                    .map(|f| {
                        Ok(FieldDescriptor {
                            name: f.name.clone(),
                            desc: self.walk(&f.shape)?,
                            optional: f.optional,
                        })
                    })
                    .collect::<Result<Vec<_>, MarshError>>()?;
                Ok(if self.flavor.is_encode() {
                    Descriptor::StructCompose { fields }
                } else {
                    Descriptor::StructDecompose {
                        name: name.clone(),
                        fields,
                    }
                })
            }
            TypeShape::Enum { variants, .. } => Ok(if self.flavor.is_encode() {
                Descriptor::EnumEncode {
                    variants: variants.clone(),
                }
            } else {
                Descriptor::EnumDecode {
                    variants: variants.clone(),
                }
            }),
            other => self.walk(other),
        }
    }

    /// Converts a (possibly nested) shape. Named struct/enum types other
    /// than the current root become `Ref`s; primitives fall straight
    /// through to `Identity`; `Timestamp`/`Duration` pick up the flavor's
    /// direction; container shapes recurse.
    pub fn walk(&self, shape: &TypeShape) -> Result<Descriptor, MarshError> {
        Ok(match shape {
            TypeShape::Bool => Descriptor::Identity(Some(Primitive::Bool)),
            TypeShape::Int => Descriptor::Identity(Some(Primitive::Int)),
            TypeShape::Float => Descriptor::Identity(Some(Primitive::Float)),
            TypeShape::Str => Descriptor::Identity(Some(Primitive::Str)),
            TypeShape::Any => Descriptor::Identity(None),
            TypeShape::Timestamp => Descriptor::Timestamp {
                encode: self.flavor.is_encode(),
            },
            TypeShape::Duration => Descriptor::Duration {
                encode: self.flavor.is_encode(),
            },
            TypeShape::Optional(inner) => Descriptor::Optional(Box::new(self.walk(inner)?)),
            TypeShape::List(inner) => Descriptor::List(Box::new(self.walk(inner)?)),
            TypeShape::Map(k, v) => Descriptor::Map {
                key: Box::new(self.walk(k)?),
                value: Box::new(self.walk(v)?),
            },
            TypeShape::Enum { name, .. } | TypeShape::Struct { name, .. } => {
                Descriptor::named_ref(self.flavor, name)
            }
            TypeShape::Ref(name) => Descriptor::named_ref(self.flavor, name),
        })
    }
}

/// A [`RefRegistry`] backed by a flavor and a lookup of named shapes —
/// what a [`crate::linker::Linker`] needs to close `Ref`s the Walker
/// emitted for named types other than the root it was called for.
pub struct FlavorRegistry<'a> {
    flavor: Flavor,
    shapes: &'a dyn Fn(&str) -> Option<TypeShape>,
}

impl<'a> FlavorRegistry<'a> {
    pub fn new(flavor: Flavor, shapes: &'a dyn Fn(&str) -> Option<TypeShape>) -> Self {
        FlavorRegistry { flavor, shapes }
    }
}

impl<'a> RefRegistry for FlavorRegistry<'a> {
    fn resolve(&self, qualified_name: &str) -> Option<Descriptor> {
        let prefix = format!("{}:", self.flavor.as_str());
        let name = qualified_name.strip_prefix(&prefix)?;
        let shape = (self.shapes)(name)?;
        Walker::new(self.flavor, self.shapes).walk_inline(&shape).ok()
    }
}
