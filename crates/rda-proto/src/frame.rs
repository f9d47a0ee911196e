use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::debug;

use crate::error::ProtoError;
use crate::header::FrameHeader;
use crate::message::{FloatDataMessage, MessageType, StartMessage};

/// A fully decoded (or, for uninteresting types, fully skipped) RDA frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// Decoded start message.
    Start(StartMessage),
    /// Int16 data message: recognized but not decoded, body discarded.
    IntData,
    /// Stop message.
    Stop,
    /// Decoded float-data message.
    FloatData(FloatDataMessage),
    /// Any other type code; body discarded by length.
    Unknown(u32),
}

/// Read one complete RDA frame from `reader`.
///
/// `n_channels` is required to decode float-data bodies and is `None` until
/// a start message has been read (matching the protocol: float data cannot
/// be interpreted before a start message has announced the channel count).
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    n_channels: Option<u32>,
) -> Result<(FrameHeader, Frame), ProtoError> {
    let header = FrameHeader::read_from(reader).await?;

    let frame = match MessageType::from_u32(header.n_type) {
        MessageType::Start => Frame::Start(StartMessage::read(reader, &header).await?),
        MessageType::Stop => Frame::Stop,
        MessageType::FloatData => {
            let n_channels = n_channels.ok_or_else(|| ProtoError::MalformedLength {
                field: "nType",
                detail: "float data frame received before a start message".to_string(),
            })?;
            Frame::FloatData(FloatDataMessage::read(reader, &header, n_channels).await?)
        }
        MessageType::IntData => {
            discard_body(reader, &header).await?;
            Frame::IntData
        }
        MessageType::Unknown(t) => {
            discard_body(reader, &header).await?;
            Frame::Unknown(t)
        }
    };

    Ok(frame)
}

/// Consume and discard a frame's body (`nSize - 24` bytes) without
/// interpreting it. Used for message types this crate does not decode.
pub async fn discard_body<R: AsyncRead + Unpin>(
    reader: &mut R,
    header: &FrameHeader,
) -> Result<(), ProtoError> {
    let body_len = header.body_len().ok_or_else(|| ProtoError::MalformedLength {
        field: "nSize",
        detail: "smaller than header".to_string(),
    })? as usize;

    let mut remaining = body_len;
    let mut scratch = [0u8; 4096];
    while remaining > 0 {
        let n = remaining.min(scratch.len());
        reader.read_exact(&mut scratch[..n]).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtoError::UnexpectedEof {
                    field: "discarded body",
                    expected: remaining,
                }
            } else {
                ProtoError::Io(e)
            }
        })?;
        remaining -= n;
    }

    debug!(n_type = header.n_type, body_len, "discarded frame body");
    Ok(())
}
