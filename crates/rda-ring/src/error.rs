use thiserror::Error;

/// Result of [`crate::RingBuffer::check_availability`], matching the
/// reference implementation's integer status codes (`1` is reserved for a
/// buffer that was never initialized and is never produced here).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AvailabilityCode {
    /// The requested span can be read right now.
    Ok = 0,
    /// The requested span's oldest rows have already been overwritten by
    /// the writer; re-request a newer span.
    Overwritten = 2,
    /// The writer has not yet produced enough rows to satisfy the request.
    NotReady = 3,
    /// The requested span starts before sample zero.
    NegativeIndex = 5,
}

/// Errors produced by [`crate::RingBuffer`].
#[derive(Debug, Error)]
pub enum RingError {
    /// The requested rows were already overwritten by the writer.
    #[error("requested span [{start}, {end}) was overwritten; oldest available sample is {oldest}")]
    Overwritten { start: u64, end: u64, oldest: u64 },

    /// The requested rows have not been produced yet.
    #[error("requested span [{start}, {end}) is not ready; {written} samples written so far")]
    NotReady { start: u64, end: u64, written: u64 },

    /// `start` was negative relative to sample zero.
    #[error("requested start index is negative relative to sample zero")]
    NegativeIndex,

    /// `rows.len()` was not an exact multiple of the channel count.
    #[error("row data length {len} is not a multiple of channel count {n_channels}")]
    ShapeMismatch { len: usize, n_channels: u64 },

    /// A typed accessor (`put`/`get`) was used against a buffer initialized
    /// with a different on-disk sample type.
    #[error("buffer holds sample type {actual:?}, not the {expected:?} this accessor requires")]
    WrongSampleType {
        expected: &'static str,
        actual: &'static str,
    },

    /// The backing region is smaller than its own header declares, or its
    /// header fields are internally inconsistent.
    #[error("backing region is not a valid ring buffer: {0}")]
    Corrupt(String),

    /// Underlying file or mmap I/O failure.
    #[error("ring buffer I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RingError {
    /// Map this error to the legacy status code it corresponds to, if any.
    /// Decode/shape/IO errors have no code equivalent and return `None`.
    #[must_use]
    pub fn availability_code(&self) -> Option<AvailabilityCode> {
        match self {
            RingError::Overwritten { .. } => Some(AvailabilityCode::Overwritten),
            RingError::NotReady { .. } => Some(AvailabilityCode::NotReady),
            RingError::NegativeIndex => Some(AvailabilityCode::NegativeIndex),
            _ => None,
        }
    }
}
