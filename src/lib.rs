//! `conduit`: a framed, multiplexed request/response and streaming RPC
//! transport with a reflective data-binding engine, per `spec.md`/
//! `SPEC_FULL.md`.
//!
//! Layering, bottom to top:
//! - [`conduit_marsh`] — the mapping engine (Descriptor/Mapper/Linker/
//!   Walker) that converts values to and from a JSON tree and a
//!   length-prefixed binary wire form.
//! - [`conduit_wire`] — the byte-level Frame Codec and the Packet Codec
//!   built on top of it.
//! - this crate — the [`session`] handshake state machine, the
//!   [`stream`] multiplexer, and [`connection::Connection`], the public
//!   entry point that ties them together with the background
//!   reader/writer tasks.
//!
//! Out of scope (spec.md §1): TLS, an OpenAPI/schema generator, an
//! HTTP-binding adapter, a CLI front end, and YAML emission. This crate
//! defines [`RequestEnvelope`], the narrow type an HTTP-binding adapter
//! would convert requests into, and [`parameters::decode_parameter`], the
//! style/explode-aware mapper factory spec.md §6 says the core owns —
//! but it does not implement the adapter itself.

pub mod config;
pub mod connection;
pub mod error;
pub mod headers;
pub mod parameters;
pub mod session;
pub mod stream;

pub use conduit_marsh::{MarshError, Reason, Value};
pub use conduit_wire::packet::{Body, Service, Type};
pub use conduit_wire::Packet;

pub use config::SessionConfig;
pub use connection::{CallError, Connection, StepItem, StreamHandler, StreamingCall, StreamingResponder};
pub use error::{ConnectionError, ErrorCode, ProtocolError};
pub use headers::Headers;
pub use parameters::{decode_parameter, ParameterStyle, RawParameter};
pub use session::ServiceTable;
pub use stream::{FlowControl, IncomingStream, OpenKind, StreamEvent, StreamHandle, StreamTable};

/// A single decoded HTTP-style parameter, as the HTTP-binding adapter
/// (external collaborator, spec.md §6) would extract it from a request,
/// turning its raw string(s) into a [`Value`] via [`decode_parameter`]
/// before handing the whole envelope to the engine's mapper factory.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestParameter {
    pub name: String,
    pub placement: ParameterPlacement,
    pub value: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterPlacement {
    Path,
    Query,
    Header,
    Cookie,
}

/// The narrow contract between an HTTP-binding adapter and the core: a
/// translated HTTP request, ready for the mapper graph to decode its
/// parameters and body. spec.md §6 scopes the adapter itself out of this
/// crate — only the envelope's shape and the fact that the core supplies
/// a mapper factory for decoding `parameters` from strings live here.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestEnvelope {
    pub url: String,
    pub method: String,
    pub parameters: Vec<RequestParameter>,
    pub body: Value,
    pub errors: Vec<String>,
}

impl RequestEnvelope {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        RequestEnvelope {
            url: url.into(),
            method: method.into(),
            parameters: Vec::new(),
            body: Value::Null,
            errors: Vec::new(),
        }
    }
}
