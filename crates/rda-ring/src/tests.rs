use std::sync::Arc;

use tempfile::tempdir;

use crate::error::{AvailabilityCode, RingError};
use crate::header::DataType;
use crate::ring::RingBuffer;

fn new_ring(n_channels: u64, buf_capacity: u64, pocket_capacity: u64) -> (tempfile::TempDir, RingBuffer) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring.bin");
    let ring = RingBuffer::initialize(&path, n_channels, buf_capacity, pocket_capacity, DataType::F32).unwrap();
    (dir, ring)
}

fn rows(n: u64, n_channels: u64, start_value: f32) -> Vec<f32> {
    (0..n * n_channels)
        .map(|i| start_value + i as f32)
        .collect()
}

#[test]
fn fresh_buffer_is_not_ready() {
    // Invariant: before anything is written, every span is NotReady.
    let (_dir, ring) = new_ring(2, 8, 3);
    assert_eq!(ring.check_availability(0, 1), AvailabilityCode::NotReady);
    assert!(matches!(ring.get(0, 1), Err(RingError::NotReady { .. })));
}

#[test]
fn negative_start_is_rejected() {
    // Invariant: a negative start index is always NegativeIndex, regardless
    // of write state.
    let (_dir, ring) = new_ring(2, 8, 3);
    assert_eq!(ring.check_availability(-1, 2), AvailabilityCode::NegativeIndex);
    assert!(matches!(ring.get(-1, 2), Err(RingError::NegativeIndex)));
}

#[test]
fn non_positive_end_is_rejected() {
    // Invariant 8: check_availability(s, e) returns 5 iff s < 0 || e <= 0,
    // even when start is non-negative. A zero or negative end must not be
    // silently clamped up into a zero-length read.
    let (_dir, ring) = new_ring(2, 8, 3);
    ring.put(&rows(4, 2, 0.0)).unwrap();

    assert_eq!(ring.check_availability(0, 0), AvailabilityCode::NegativeIndex);
    assert!(matches!(ring.get(0, 0), Err(RingError::NegativeIndex)));

    assert_eq!(ring.check_availability(2, -1), AvailabilityCode::NegativeIndex);
    assert!(matches!(ring.get(2, -1), Err(RingError::NegativeIndex)));
}

#[test]
fn contiguous_put_then_get_round_trips() {
    // S1: a write that does not wrap is read back unchanged via a borrow.
    let (_dir, ring) = new_ring(3, 10, 4);
    let data = rows(5, 3, 0.0);
    ring.put(&data).unwrap();
    assert_eq!(ring.samples_written(), 5);

    let view = ring.get(0, 5).unwrap();
    assert_eq!(&*view, data.as_slice());
}

#[test]
fn wrap_within_pocket_is_zero_copy_contiguous() {
    // S2: a write that wraps the ring, followed by a read whose span also
    // wraps but fits inside the pocket, comes back as one contiguous slice
    // without the caller ever seeing two pieces.
    let (_dir, ring) = new_ring(2, 6, 4);
    ring.put(&rows(6, 2, 0.0)).unwrap(); // fills buffer exactly: samples 0..6
    ring.put(&rows(3, 2, 100.0)).unwrap(); // samples 6..9, wraps local idx 0..3

    // Span [5, 9) wraps from local index 5 to local index 3, a chunk of 4
    // rows that fits inside the 4-row pocket.
    let view = ring.get(5, 9).unwrap();
    assert!(matches!(view, crate::ring::RowView::Borrowed(_)));
    assert_eq!(view.len(), 8); // 4 rows * 2 channels

    // Row 5 is the untouched tail of the first put (10, 11); rows 6,7,8 are
    // the second put (100..105), read back through the pocket mirror.
    assert_eq!(
        &*view,
        &[10.0, 11.0, 100.0, 101.0, 102.0, 103.0, 104.0, 105.0][..]
    );
}

#[test]
fn wrap_beyond_pocket_falls_back_to_owned_copy() {
    // S3: a wrapping read longer than the pocket still returns correct
    // data, via an owned copy rather than a borrow.
    let (_dir, ring) = new_ring(1, 6, 2);
    ring.put(&rows(6, 1, 0.0)).unwrap(); // fills the buffer exactly: samples 0..6

    // [3, 6) wraps from local index 3 back to local index 0 (a chunk of 3,
    // bigger than the 2-row pocket).
    let view = ring.get(3, 6).unwrap();
    assert!(matches!(view, crate::ring::RowView::Owned(_)));
    assert_eq!(&*view, &[3.0, 4.0, 5.0][..]);
}

#[tracing_test::traced_test]
#[test]
fn wrap_beyond_pocket_logs_the_slow_mode_warning() {
    // spec.md §9: "slow mode" must be observable, not just correct.
    let (_dir, ring) = new_ring(1, 6, 2);
    ring.put(&rows(6, 1, 0.0)).unwrap();
    let _ = ring.get(3, 6).unwrap();
    assert!(logs_contain("falling back to a copy"));
}

#[test]
fn overwritten_rows_are_reported() {
    // Invariant: once the writer has advanced past bufCapacity rows, the
    // oldest rows are Overwritten, not silently stale data.
    let (_dir, ring) = new_ring(1, 4, 1);
    ring.put(&rows(10, 1, 0.0)).unwrap();
    assert_eq!(ring.samples_written(), 10);
    assert_eq!(ring.check_availability(0, 1), AvailabilityCode::Overwritten);
    assert!(matches!(
        ring.get(0, 1),
        Err(RingError::Overwritten { oldest: 6, .. })
    ));
    // The most recent bufCapacity rows are still available.
    let view = ring.get(9, 10).unwrap();
    assert_eq!(&*view, &[9.0]);
}

#[test]
fn put_larger_than_capacity_retains_only_the_tail() {
    // Invariant: a single put() longer than bufCapacity still advances the
    // write count by the full row count, but only the trailing rows land
    // in the buffer.
    let (_dir, ring) = new_ring(1, 4, 1);
    ring.put(&rows(10, 1, 0.0)).unwrap();
    assert_eq!(ring.samples_written(), 10);
    let view = ring.get(6, 10).unwrap();
    assert_eq!(&*view, &[6.0, 7.0, 8.0, 9.0]);
}

#[test]
fn shape_mismatch_is_rejected() {
    let (_dir, ring) = new_ring(3, 8, 2);
    let bad = vec![1.0f32, 2.0]; // not a multiple of 3 channels
    assert!(matches!(ring.put(&bad), Err(RingError::ShapeMismatch { .. })));
}

#[test]
fn degenerate_sizes_clamp_up_to_one() {
    let (_dir, ring) = new_ring(0, 0, 0);
    assert_eq!(ring.n_channels(), 1);
    assert_eq!(ring.buf_capacity(), 1);
    assert_eq!(ring.pocket_capacity(), 1);
}

#[test]
fn attach_reads_back_the_same_shape() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ring.bin");
    {
        let ring = RingBuffer::initialize(&path, 4, 16, 5, DataType::F32).unwrap();
        ring.put(&rows(3, 4, 0.0)).unwrap();
    }

    let attached = RingBuffer::attach(&path).unwrap();
    assert_eq!(attached.n_channels(), 4);
    assert_eq!(attached.buf_capacity(), 16);
    assert_eq!(attached.pocket_capacity(), 5);
    assert_eq!(attached.samples_written(), 3);
    let view = attached.get(0, 3).unwrap();
    assert_eq!(&*view, rows(3, 4, 0.0).as_slice());
}

#[test]
fn writer_and_reader_threads_observe_a_consistent_count() {
    // Invariant: the release/acquire pair on nSamplesWritten is the only
    // synchronization needed between a writer and a concurrent reader —
    // a reader never observes a write count without the rows it covers.
    let (_dir, ring) = new_ring(2, 64, 8);
    let ring = Arc::new(ring);
    let writer_ring = Arc::clone(&ring);

    let writer = std::thread::spawn(move || {
        for block in 0..50u64 {
            writer_ring.put(&rows(1, 2, block as f32)).unwrap();
        }
    });

    let mut last_seen = 0u64;
    while last_seen < 50 {
        let written = ring.samples_written();
        if written > last_seen {
            let view = ring.get(last_seen as i64, written as i64).unwrap();
            assert_eq!(view.len() as u64, (written - last_seen) * 2);
            last_seen = written;
        }
    }
    writer.join().unwrap();
}

#[test]
fn full_buffer_read_is_zero_copy() {
    // A span whose local start and end both land on zero (a read of exactly
    // bufCapacity rows) is a contiguous borrow of the whole data section,
    // not a wrap-beyond-pocket copy, even though the pocket is far smaller.
    let (_dir, ring) = new_ring(2, 6, 2);
    ring.put(&rows(6, 2, 0.0)).unwrap();
    let view = ring.get(0, 6).unwrap();
    assert!(matches!(view, crate::ring::RowView::Borrowed(_)));
    assert_eq!(&*view, rows(6, 2, 0.0).as_slice());
}

#[test]
fn get_last_sample_returns_the_most_recent_row() {
    let (_dir, ring) = new_ring(2, 4, 2);
    ring.put(&rows(3, 2, 0.0)).unwrap();
    let view = ring.get_last_sample().unwrap();
    assert_eq!(&*view, &[2.0, 3.0]);
}
