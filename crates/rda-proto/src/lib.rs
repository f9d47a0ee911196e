//! Wire codec for the BrainVision Remote Data Access (RDA) binary protocol.
//!
//! RDA frames a stream of messages over a plain TCP socket: a fixed 24-byte
//! header followed by a type-specific, variable-length body. This crate
//! knows how to read a header, dispatch on its message type, and decode (or
//! skip) the body that follows — see [`read_frame`].
//!
//! All multi-byte integers on the wire are little-endian; floats are
//! IEEE-754 little-endian `f32`/`f64`. Every read fully drains `n_size`
//! bytes or returns [`ProtoError`] — a single `AsyncReadExt::read` is never
//! assumed to return the whole frame, since `n_size` can exceed one kernel
//! buffer.

mod error;
mod frame;
mod header;
mod message;

pub use error::ProtoError;
pub use frame::{discard_body, read_frame, Frame};
pub use header::{FrameHeader, RDA_GUID};
pub use message::{encode_stop, write_frame, FloatDataMessage, MessageType, StartMessage};

/// Size of the fixed frame header, in bytes.
pub const HEADER_SIZE: usize = 24;
