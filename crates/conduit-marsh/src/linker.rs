use std::collections::{HashMap, VecDeque};

use crate::descriptor::{Descriptor, Primitive};
use crate::error::{MarshError, Reason};

pub type NodeId = usize;

/// A compiled node: the same shape as [`Descriptor`] but with every child
/// resolved to a [`NodeId`] into the owning [`Graph`]'s arena, rather than
/// an owned sub-tree. Cycles are plain index references, so closing a
/// back-edge needs no patch step once the arena slot has been reserved.
#[derive(Debug, Clone)]
pub enum NodeKind {
    Identity(Option<Primitive>),
    Timestamp { encode: bool },
    Duration { encode: bool },
    Varint { encode: bool },
    LengthPrefixedBytes,
    JsonEncodeBytes,
    JsonDecodeBytes,
    Optional(NodeId),
    List(NodeId),
    Map { key: NodeId, value: NodeId },
    EnumEncode { variants: Vec<(String, String)> },
    EnumDecode { variants: Vec<(String, String)> },
    StructCompose { fields: Vec<CompiledField> },
    StructDecompose { name: String, fields: Vec<CompiledField> },
    Discriminant { key_field: String, branches: Vec<(String, NodeId)> },
    Concat(Vec<NodeId>),
    AttrLookup { name: String, child: NodeId },
    ItemLookup { name: String, child: NodeId },
    Length(NodeId),
    With(NodeId, NodeId),
    Lookup(Vec<(String, crate::value::Value)>),
    Trace { child: NodeId, label: String },
}

#[derive(Debug, Clone)]
pub struct CompiledField {
    pub name: String,
    pub node: NodeId,
    pub optional: bool,
}

/// The Linker's output: an owning graph of mappers in which every child
/// reference is resolved. Shared named references appear once; cycles are
/// preserved as index back-edges.
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<NodeKind>,
    roots: HashMap<String, NodeId>,
}

impl Graph {
    pub fn kind(&self, id: NodeId) -> &NodeKind {
        &self.nodes[id]
    }

    pub fn root(&self, name: &str) -> Option<NodeId> {
        self.roots.get(name).copied()
    }
}

/// Resolves a [`Descriptor::Ref`]'s fully-qualified name to its underlying
/// descriptor. Supplied by whatever built the `Descriptor` tree (normally
/// a [`crate::walker::Walker`]).
pub trait RefRegistry {
    fn resolve(&self, qualified_name: &str) -> Option<Descriptor>;
}

impl<F> RefRegistry for F
where
    F: Fn(&str) -> Option<Descriptor>,
{
    fn resolve(&self, qualified_name: &str) -> Option<Descriptor> {
        self(qualified_name)
    }
}

/// Converts a set of descriptor roots into a [`Graph`], per spec.md §4.1:
/// breadth-first walk assigning a fresh node-id to each distinct node,
/// de-duplicating `Ref`s by fully-qualified name, then compiling each
/// node's children once all have reserved slots.
pub struct Linker<'a> {
    registry: &'a dyn RefRegistry,
    nodes: Vec<Option<NodeKind>>,
    name_node: HashMap<String, NodeId>,
    queue: VecDeque<(NodeId, Descriptor)>,
}

impl<'a> Linker<'a> {
    pub fn new(registry: &'a dyn RefRegistry) -> Self {
        Linker {
            registry,
            nodes: Vec::new(),
            name_node: HashMap::new(),
            queue: VecDeque::new(),
        }
    }

    pub fn link(mut self, roots: Vec<(String, Descriptor)>) -> Result<Graph, MarshError> {
        let mut root_ids = HashMap::new();
        for (name, desc) in roots {
            let id = self.alloc(desc)?;
            root_ids.insert(name, id);
        }
        while let Some((id, desc)) = self.queue.pop_front() {
            let kind = self.compile(desc)?;
            self.nodes[id] = Some(kind);
        }
        let nodes = self
            .nodes
            .into_iter()
            .enumerate()
            .map(|(i, slot)| {
                slot.ok_or_else(|| {
                    MarshError::new(
                        Reason::Unmappable,
                        format!("internal: node {i} never compiled"),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Graph {
            nodes,
            roots: root_ids,
        })
    }

    /// Reserves a slot for `desc`, reusing an existing node by qualified
    /// name if `desc` is a [`Descriptor::Ref`] already registered.
    fn alloc(&mut self, desc: Descriptor) -> Result<NodeId, MarshError> {
        if let Descriptor::Ref(name) = &desc {
            if let Some(&id) = self.name_node.get(name) {
                return Ok(id);
            }
            let id = self.reserve();
            self.name_node.insert(name.clone(), id);
            let resolved = self.registry.resolve(name).ok_or_else(|| {
                MarshError::new(
                    Reason::Unmappable,
                    format!("unresolvable reference {name:?}"),
                )
            })?;
            self.queue.push_back((id, resolved));
            return Ok(id);
        }
        let id = self.reserve();
        self.queue.push_back((id, desc));
        Ok(id)
    }

    fn reserve(&mut self) -> NodeId {
        self.nodes.push(None);
        self.nodes.len() - 1
    }

    fn compile(&mut self, desc: Descriptor) -> Result<NodeKind, MarshError> {
        Ok(match desc {
            Descriptor::Identity(p) => NodeKind::Identity(p),
            Descriptor::Timestamp { encode } => NodeKind::Timestamp { encode },
            Descriptor::Duration { encode } => NodeKind::Duration { encode },
            Descriptor::Varint { encode } => NodeKind::Varint { encode },
            Descriptor::LengthPrefixedBytes => NodeKind::LengthPrefixedBytes,
            Descriptor::JsonEncodeBytes => NodeKind::JsonEncodeBytes,
            Descriptor::JsonDecodeBytes => NodeKind::JsonDecodeBytes,
            Descriptor::Optional(inner) => NodeKind::Optional(self.alloc(*inner)?),
            Descriptor::List(inner) => NodeKind::List(self.alloc(*inner)?),
            Descriptor::Map { key, value } => NodeKind::Map {
                key: self.alloc(*key)?,
                value: self.alloc(*value)?,
            },
            Descriptor::EnumEncode { variants } => NodeKind::EnumEncode { variants },
            Descriptor::EnumDecode { variants } => NodeKind::EnumDecode { variants },
            Descriptor::StructCompose { fields } => NodeKind::StructCompose {
                fields: self.compile_fields(fields)?,
            },
            Descriptor::StructDecompose { name, fields } => NodeKind::StructDecompose {
                name,
                fields: self.compile_fields(fields)?,
            },
            Descriptor::Discriminant { key_field, branches } => {
                let mut compiled = Vec::with_capacity(branches.len());
                for (tag, branch) in branches {
                    compiled.push((tag, self.alloc(branch)?));
                }
                NodeKind::Discriminant {
                    key_field,
                    branches: compiled,
                }
            }
            Descriptor::Concat(items) => {
                let mut ids = Vec::with_capacity(items.len());
                for item in items {
                    ids.push(self.alloc(item)?);
                }
                NodeKind::Concat(ids)
            }
            Descriptor::AttrLookup { name, child } => NodeKind::AttrLookup {
                name,
                child: self.alloc(*child)?,
            },
            Descriptor::ItemLookup { name, child } => NodeKind::ItemLookup {
                name,
                child: self.alloc(*child)?,
            },
            Descriptor::Length(child) => NodeKind::Length(self.alloc(*child)?),
            Descriptor::With(a, b) => NodeKind::With(self.alloc(*a)?, self.alloc(*b)?),
            Descriptor::Lookup(table) => NodeKind::Lookup(table),
            Descriptor::Trace { child, label } => NodeKind::Trace {
                child: self.alloc(*child)?,
                label,
            },
            Descriptor::Ref(name) => {
                // A root or child that is itself directly a Ref never reaches
                // `compile` — `alloc` resolves it before enqueueing. Reaching
                // here means a Ref was pushed onto the queue unresolved,
                // which is an internal bug, not a user-facing error.
                unreachable!("unresolved Ref {name:?} reached compile()")
            }
        })
    }

    fn compile_fields(
        &mut self,
        fields: Vec<crate::descriptor::FieldDescriptor>,
    ) -> Result<Vec<CompiledField>, MarshError> {
        fields
            .into_iter()
            .map(|f| {
                Ok(CompiledField {
                    name: f.name,
                    node: self.alloc(f.desc)?,
                    optional: f.optional,
                })
            })
            .collect()
    }
}
