use thiserror::Error;

/// Errors produced while decoding or encoding an RDA frame.
#[derive(Error, Debug)]
pub enum ProtoError {
    /// The underlying transport returned an I/O error.
    #[error("RDA transport error: {0}")]
    Io(#[from] std::io::Error),

    /// The socket closed before `nSize` bytes of a frame body were received.
    #[error("unexpected EOF reading {field} (wanted {expected} bytes)")]
    UnexpectedEof {
        /// Name of the field being read when the stream ended.
        field: &'static str,
        /// Number of bytes that were still expected.
        expected: usize,
    },

    /// A length field in the frame would require reading a negative or
    /// otherwise nonsensical number of bytes (e.g. `nSize` smaller than the
    /// fixed part of the message it claims to be).
    #[error("malformed frame length: {field} implies {detail}")]
    MalformedLength {
        /// Name of the length field that failed validation.
        field: &'static str,
        /// Human-readable detail of what was wrong.
        detail: String,
    },
}
