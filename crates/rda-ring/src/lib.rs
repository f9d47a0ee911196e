//! A two-dimensional circular buffer, mapped into shared memory, with a
//! "pocket" mirror region that lets a reader whose span wraps past the end
//! of the buffer still get back a single contiguous slice.
//!
//! Exactly one writer calls [`RingBuffer::put`]; any number of readers call
//! [`RingBuffer::get`]. The two sides coordinate through nothing but an
//! atomic write counter — the writer publishes with release ordering after
//! every row is in place, and readers acquire-load it before computing
//! which rows are safe to touch. There is no lock, no polling sleep: a
//! reader either sees the new count or it doesn't, and either way the
//! bytes it reads are consistent.

mod error;
mod header;
mod ring;

#[cfg(test)]
mod tests;

pub use error::{AvailabilityCode, RingError};
pub use header::{DataType, HEADER_SIZE};
pub use ring::{RingBuffer, RowView};
