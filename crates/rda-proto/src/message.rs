use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::ProtoError;
use crate::header::{FrameHeader, RDA_GUID};
use crate::HEADER_SIZE;

/// RDA message type, decoded from a header's `nType` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageType {
    /// Start message (`nType == 1`): channel count, sampling interval,
    /// per-channel resolutions and channel names.
    Start,
    /// Int16 data message (`nType == 2`). Recognized but not decoded by
    /// this crate — the body is consumed by length only.
    IntData,
    /// Stop message (`nType == 3`): header only, no body.
    Stop,
    /// Float32 data message (`nType == 4`): a block of samples plus markers.
    FloatData,
    /// Any other type code, including the undocumented `10000`. The body
    /// is always consumed by length and discarded.
    Unknown(u32),
}

impl MessageType {
    /// Map a raw `nType` wire value to a [`MessageType`].
    #[must_use]
    pub fn from_u32(n_type: u32) -> Self {
        match n_type {
            1 => MessageType::Start,
            2 => MessageType::IntData,
            3 => MessageType::Stop,
            4 => MessageType::FloatData,
            other => MessageType::Unknown(other),
        }
    }

    /// Map a [`MessageType`] back to its wire value.
    #[must_use]
    pub fn to_u32(self) -> u32 {
        match self {
            MessageType::Start => 1,
            MessageType::IntData => 2,
            MessageType::Stop => 3,
            MessageType::FloatData => 4,
            MessageType::Unknown(v) => v,
        }
    }
}

/// A decoded RDA start message (`nType == 1`).
#[derive(Debug, Clone, PartialEq)]
pub struct StartMessage {
    /// Number of channels (columns) in every subsequent data frame.
    pub n_channels: u32,
    /// Sampling interval in milliseconds, as sent by the server.
    pub d_sampling_interval: f64,
    /// Per-channel resolution in microvolts. Carried opaquely — never
    /// interpreted by this crate or its consumers.
    pub d_resolutions: Vec<f64>,
    /// Channel names, in channel order.
    pub channel_names: Vec<String>,
}

impl StartMessage {
    /// Read a start message body given its already-read header.
    ///
    /// `header.n_type` is assumed to be `1`; callers dispatch on
    /// [`MessageType`] before calling this.
    pub async fn read<R: AsyncRead + Unpin>(
        reader: &mut R,
        header: &FrameHeader,
    ) -> Result<Self, ProtoError> {
        let body_len = header.body_len().ok_or_else(|| ProtoError::MalformedLength {
            field: "nSize",
            detail: "smaller than header".to_string(),
        })? as usize;

        const FIXED_LEN: usize = 4 + 8; // nChannels: u32, dSamplingInterval: f64
        if body_len < FIXED_LEN {
            return Err(ProtoError::MalformedLength {
                field: "nSize",
                detail: format!("start message body {body_len} shorter than fixed part {FIXED_LEN}"),
            });
        }

        let mut fixed = [0u8; FIXED_LEN];
        read_exact_field(reader, &mut fixed, "start.fixed").await?;
        let n_channels = u32::from_le_bytes(fixed[0..4].try_into().expect("4 bytes"));
        let d_sampling_interval = f64::from_le_bytes(fixed[4..12].try_into().expect("8 bytes"));

        let resolutions_len = n_channels as usize * 8;
        let remaining = body_len - FIXED_LEN;
        if remaining < resolutions_len {
            return Err(ProtoError::MalformedLength {
                field: "nSize",
                detail: format!(
                    "start message body too short for {n_channels} channel resolutions"
                ),
            });
        }

        let mut res_bytes = vec![0u8; resolutions_len];
        read_exact_field(reader, &mut res_bytes, "start.dResolutions").await?;
        let d_resolutions = res_bytes
            .chunks_exact(8)
            .map(|c| f64::from_le_bytes(c.try_into().expect("8 bytes")))
            .collect();

        let name_len = remaining - resolutions_len;
        let mut name_bytes = vec![0u8; name_len];
        read_exact_field(reader, &mut name_bytes, "start.sChannelNames").await?;
        let channel_names = name_bytes
            .split(|&b| b == 0)
            .map(|s| String::from_utf8_lossy(s).into_owned())
            .filter(|s| !s.is_empty())
            .collect();

        Ok(StartMessage {
            n_channels,
            d_sampling_interval,
            d_resolutions,
            channel_names,
        })
    }

    /// Encode this message to a complete frame (header + body), suitable
    /// for a server (or the reference emulator) to send on the wire.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.n_channels.to_le_bytes());
        body.extend_from_slice(&self.d_sampling_interval.to_le_bytes());
        for r in &self.d_resolutions {
            body.extend_from_slice(&r.to_le_bytes());
        }
        let mut names = self.channel_names.join("\0").into_bytes();
        names.push(0);
        body.extend_from_slice(&names);

        let header = FrameHeader {
            guid: RDA_GUID,
            n_size: (HEADER_SIZE + body.len()) as u32,
            n_type: MessageType::Start.to_u32(),
        };

        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }
}

/// A decoded RDA float-data message (`nType == 4`).
#[derive(Debug, Clone, PartialEq)]
pub struct FloatDataMessage {
    /// Server-assigned block number.
    pub n_block: u32,
    /// Number of sample rows in this block.
    pub n_points: u32,
    /// Sample data, row-major, `n_points * n_channels` values.
    pub samples: Vec<f32>,
    /// Raw marker bytes. Consumed per the wire contract but not
    /// interpreted by this crate.
    pub markers: Vec<u8>,
}

impl FloatDataMessage {
    /// Read a float-data message body given its already-read header and the
    /// channel count established by the preceding start message.
    pub async fn read<R: AsyncRead + Unpin>(
        reader: &mut R,
        header: &FrameHeader,
        n_channels: u32,
    ) -> Result<Self, ProtoError> {
        let body_len = header.body_len().ok_or_else(|| ProtoError::MalformedLength {
            field: "nSize",
            detail: "smaller than header".to_string(),
        })? as usize;

        const FIXED_LEN: usize = 4 + 4 + 4; // nBlock, nPoints, nMarkers
        if body_len < FIXED_LEN {
            return Err(ProtoError::MalformedLength {
                field: "nSize",
                detail: format!("float data body {body_len} shorter than fixed part {FIXED_LEN}"),
            });
        }

        let mut fixed = [0u8; FIXED_LEN];
        read_exact_field(reader, &mut fixed, "float.fixed").await?;
        let n_block = u32::from_le_bytes(fixed[0..4].try_into().expect("4 bytes"));
        let n_points = u32::from_le_bytes(fixed[4..8].try_into().expect("4 bytes"));
        let _n_markers = u32::from_le_bytes(fixed[8..12].try_into().expect("4 bytes"));

        let samples_bytes_len = n_channels as usize * n_points as usize * 4;
        let remaining = body_len - FIXED_LEN;
        if remaining < samples_bytes_len {
            return Err(ProtoError::MalformedLength {
                field: "nSize",
                detail: "float data body too short for declared sample count".to_string(),
            });
        }

        let mut sample_bytes = vec![0u8; samples_bytes_len];
        read_exact_field(reader, &mut sample_bytes, "float.fData").await?;
        let samples = sample_bytes
            .chunks_exact(4)
            .map(|c| f32::from_le_bytes(c.try_into().expect("4 bytes")))
            .collect();

        let markers_len = remaining - samples_bytes_len;
        let mut markers = vec![0u8; markers_len];
        read_exact_field(reader, &mut markers, "float.markers").await?;

        Ok(FloatDataMessage {
            n_block,
            n_points,
            samples,
            markers,
        })
    }

    /// Encode this message to a complete frame (header + body). Markers are
    /// written back verbatim.
    #[must_use]
    pub fn encode(&self, n_channels: u32) -> Vec<u8> {
        let mut body = Vec::new();
        body.extend_from_slice(&self.n_block.to_le_bytes());
        body.extend_from_slice(&self.n_points.to_le_bytes());
        body.extend_from_slice(&(self.markers.len() as u32).to_le_bytes());
        for s in &self.samples {
            body.extend_from_slice(&s.to_le_bytes());
        }
        body.extend_from_slice(&self.markers);

        debug_assert_eq!(self.samples.len() as u32, n_channels * self.n_points);

        let header = FrameHeader {
            guid: RDA_GUID,
            n_size: (HEADER_SIZE + body.len()) as u32,
            n_type: MessageType::FloatData.to_u32(),
        };

        let mut out = header.to_bytes().to_vec();
        out.extend_from_slice(&body);
        out
    }
}

/// Encode a stop message: header only, no body.
#[must_use]
pub fn encode_stop() -> Vec<u8> {
    FrameHeader {
        guid: RDA_GUID,
        n_size: HEADER_SIZE as u32,
        n_type: MessageType::Stop.to_u32(),
    }
    .to_bytes()
    .to_vec()
}

/// Write a frame to an async sink, used by the reference emulator.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    frame: &[u8],
) -> Result<(), ProtoError> {
    writer.write_all(frame).await?;
    writer.flush().await?;
    Ok(())
}

async fn read_exact_field<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut [u8],
    field: &'static str,
) -> Result<(), ProtoError> {
    let expected = buf.len();
    reader.read_exact(buf).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            ProtoError::UnexpectedEof { field, expected }
        } else {
            ProtoError::Io(e)
        }
    })
}
