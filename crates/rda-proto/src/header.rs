use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::error::ProtoError;

/// 16-byte GUID every RDA frame header must carry.
///
/// A mismatch is logged and otherwise ignored (see [`FrameHeader::guid_valid`]):
/// the frame is still consumed by its declared length so the stream stays in
/// sync.
pub const RDA_GUID: [u8; 16] = [
    0x8E, 0x45, 0x58, 0x43, 0x96, 0xC9, 0x86, 0x4C, 0xAF, 0x4A, 0x98, 0xBB, 0xF6, 0xC9, 0x14, 0x50,
];

/// The fixed 24-byte frame header every RDA message begins with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Protocol GUID, expected to equal [`RDA_GUID`].
    pub guid: [u8; 16],
    /// Total frame size in bytes, including this header.
    pub n_size: u32,
    /// Message type code (1 = start, 2 = int data, 3 = stop, 4 = float data).
    pub n_type: u32,
}

impl FrameHeader {
    /// Number of body bytes following the header (`nSize - 24`).
    ///
    /// Returns `None` if `nSize` is smaller than the header itself, which
    /// indicates a malformed frame rather than a short body.
    #[must_use]
    pub fn body_len(&self) -> Option<u32> {
        self.n_size.checked_sub(crate::HEADER_SIZE as u32)
    }

    /// Whether the header's GUID matches the RDA constant.
    #[must_use]
    pub fn guid_valid(&self) -> bool {
        self.guid == RDA_GUID
    }

    /// Read a header from an async byte source, fully draining all 24 bytes
    /// or failing with [`ProtoError::Io`]/[`ProtoError::UnexpectedEof`].
    ///
    /// A GUID mismatch is logged at `warn` level but does not stop reading —
    /// per the protocol, the frame is still consumed by length.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, ProtoError> {
        let mut buf = [0u8; crate::HEADER_SIZE];
        reader.read_exact(&mut buf).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                ProtoError::UnexpectedEof {
                    field: "header",
                    expected: crate::HEADER_SIZE,
                }
            } else {
                ProtoError::Io(e)
            }
        })?;

        let mut guid = [0u8; 16];
        guid.copy_from_slice(&buf[0..16]);
        let n_size = u32::from_le_bytes(buf[16..20].try_into().expect("4-byte slice"));
        let n_type = u32::from_le_bytes(buf[20..24].try_into().expect("4-byte slice"));

        let header = FrameHeader {
            guid,
            n_size,
            n_type,
        };

        if !header.guid_valid() {
            warn!(n_type, n_size, "RDA frame with unknown GUID received");
        }

        Ok(header)
    }

    /// Serialize the header to its 24-byte wire form.
    #[must_use]
    pub fn to_bytes(self) -> [u8; crate::HEADER_SIZE] {
        let mut buf = [0u8; crate::HEADER_SIZE];
        buf[0..16].copy_from_slice(&self.guid);
        buf[16..20].copy_from_slice(&self.n_size.to_le_bytes());
        buf[20..24].copy_from_slice(&self.n_type.to_le_bytes());
        buf
    }

    /// Write the header to an async byte sink.
    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), ProtoError> {
        writer.write_all(&self.to_bytes()).await?;
        Ok(())
    }
}
