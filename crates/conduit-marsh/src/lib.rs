//! A reflective mapping engine: build a graph of composable transform
//! nodes from type descriptions, execute it to convert values between an
//! internal tree representation and both JSON and length-prefixed binary
//! wire forms, and report precise, path-tagged errors.
//!
//! The pieces, leaves first: [`value::Value`] is the uniform tree every
//! mapper reads and writes; [`descriptor::Descriptor`] is a build-time
//! node with named children; [`linker::Linker`] turns a set of descriptor
//! roots into a [`linker::Graph`] of resolved nodes, de-duplicating shared
//! `Ref`s and closing cycles; [`mapper::apply`] executes a graph node
//! against a value; [`walker::Walker`] builds descriptors from
//! [`descriptor::TypeShape`] the way `vow/marsh/walker.py::Walker.resolve`
//! does for declared types.

pub mod datetime;
pub mod descriptor;
pub mod error;
pub mod flavor;
pub mod linker;
pub mod mapper;
pub mod value;
pub mod varint;

pub use descriptor::{Descriptor, Described, FieldDescriptor, FieldShape, TypeShape};
pub use error::{MarshError, Reason};
pub use flavor::Flavor;
pub use linker::{Graph, Linker, NodeId, NodeKind, RefRegistry};
pub use mapper::apply;
pub use value::{NamedValue, Value};
pub use walker::{FlavorRegistry, Walker};

pub mod walker;
