//! The byte-level frame format and the Packet codec layered on top of it,
//! per spec.md §4.4/§4.5. Built on [`conduit_marsh`] for the Packet body's
//! discriminated union; the frame layer itself is a thin, direct use of
//! the engine's varint primitives.

pub mod codec;
pub mod error;
pub mod frame;
pub mod packet;

pub use codec::{decode_packet, encode_packet};
pub use error::{FrameError, PacketError};
pub use frame::{encode_frame, FrameDecoder};
pub use packet::{Body, Packet, Type};
