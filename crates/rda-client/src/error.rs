use thiserror::Error;

use rda_proto::ProtoError;
use rda_ring::RingError;

/// Result type alias using [`ClientError`].
pub type Result<T> = std::result::Result<T, ClientError>;

/// Errors produced by the RDA controller and ingest worker.
#[derive(Error, Debug)]
pub enum ClientError {
    /// `start_streaming` was called while already streaming.
    #[error("already streaming; call stop_streaming first")]
    AlreadyStreaming,

    /// `stop_streaming`/`get`/`poll` were called before a session started.
    #[error("not streaming; call start_streaming first")]
    NotStreaming,

    /// No start frame (or resumed float-data frame) arrived within the
    /// handshake deadline.
    #[error("handshake timed out after {0:?} waiting for a start frame")]
    HandshakeTimeout(std::time::Duration),

    /// The ingest worker terminated unexpectedly; `alive()` returned false
    /// where the caller expected the stream still running.
    #[error("ingest worker is no longer running")]
    WorkerDead,

    /// Underlying wire codec error.
    #[error("RDA protocol error: {0}")]
    Proto(#[from] ProtoError),

    /// Underlying ring buffer error.
    #[error("ring buffer error: {0}")]
    Ring(#[from] RingError),

    /// Socket connect/configure failure.
    #[error("transport error: {0}")]
    Io(#[from] std::io::Error),
}
