use std::fs::OpenOptions;
use std::ops::Deref;
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use memmap2::MmapMut;
use tracing::warn;

use crate::error::{AvailabilityCode, RingError};
use crate::header::{DataType, HeaderView, HEADER_SIZE};

/// A row-major, two-dimensional circular buffer living in a memory-mapped
/// file, shared between exactly one writer and any number of readers.
///
/// Layout of the backing region: a fixed header, then a `bufCapacity`-row
/// data section, then a `pocketCapacity`-row pocket that always mirrors the
/// first `pocketCapacity` rows of the data section. Because the pocket sits
/// immediately after the data section in the same mapping, a read that
/// wraps past the end of the data section — as long as it is no longer
/// than the pocket — can be returned as a single contiguous slice spanning
/// from inside the data section into the pocket, with no copy. Reads that
/// wrap and exceed the pocket's length fall back to an owned copy ("slow
/// mode"), logged once.
///
/// # Safety
///
/// `put` takes `&self`, not `&mut self`, so that a writer and readers can
/// share one `Arc<RingBuffer>` across tasks. Callers must ensure only one
/// task calls `put` at a time — this type serializes concurrent `put`
/// calls with an internal mutex but does not make interleaved writes
/// meaningful, only memory-safe.
pub struct RingBuffer {
    mmap: MmapMut,
    n_channels: u64,
    buf_capacity: u64,
    pocket_capacity: u64,
    dtype: DataType,
    write_lock: Mutex<()>,
    warned_slow_mode: AtomicBool,
}

unsafe impl Send for RingBuffer {}
unsafe impl Sync for RingBuffer {}

/// A view over rows returned by [`RingBuffer::get`].
///
/// Contiguous and pocket-backed reads borrow directly from the mapping and
/// cost nothing to produce; a read that wraps past a pocket too small to
/// cover it is copied into an owned buffer instead.
pub enum RowView<'a> {
    Borrowed(&'a [f32]),
    Owned(Vec<f32>),
}

impl<'a> Deref for RowView<'a> {
    type Target = [f32];

    fn deref(&self) -> &[f32] {
        match self {
            RowView::Borrowed(s) => s,
            RowView::Owned(v) => v,
        }
    }
}

impl RingBuffer {
    /// Create and map a new ring buffer at `path`, sized for `buf_capacity`
    /// rows of `n_channels` samples each, with `pocket_capacity` rows
    /// mirrored for wrap-around reads. Values below `1` are clamped up to
    /// `1` with a warning, matching the reference implementation.
    pub fn initialize(
        path: &Path,
        n_channels: u64,
        buf_capacity: u64,
        pocket_capacity: u64,
        dtype: DataType,
    ) -> Result<Self, RingError> {
        let n_channels = clamp_up(n_channels, "nChannels");
        let buf_capacity = clamp_up(buf_capacity, "bufCapacity");
        let pocket_capacity = clamp_up(pocket_capacity, "pocketCapacity").min(buf_capacity);

        let row_bytes = n_channels * dtype.sample_size() as u64;
        let buf_size_bytes = buf_capacity * row_bytes;
        let pocket_size_bytes = pocket_capacity * row_bytes;
        let total = HEADER_SIZE as u64 + buf_size_bytes + pocket_size_bytes;

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(total)?;
        let mut mmap = unsafe { MmapMut::map_mut(&file)? };

        unsafe {
            HeaderView::write_static(
                mmap.as_mut_ptr(),
                buf_size_bytes,
                pocket_size_bytes,
                n_channels,
                dtype,
            );
        }

        Ok(RingBuffer {
            mmap,
            n_channels,
            buf_capacity,
            pocket_capacity,
            dtype,
            write_lock: Mutex::new(()),
            warned_slow_mode: AtomicBool::new(false),
        })
    }

    /// Attach to an existing ring buffer at `path`, reading its shape from
    /// the header it was created with.
    pub fn attach(path: &Path) -> Result<Self, RingError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(RingError::Corrupt(format!(
                "file is {file_len} bytes, smaller than the {HEADER_SIZE}-byte header"
            )));
        }

        let mmap = unsafe { MmapMut::map_mut(&file)? };
        let base = mmap.as_ptr();

        let buf_size_bytes = unsafe { HeaderView::buf_size_bytes(base) };
        let pocket_size_bytes = unsafe { HeaderView::pocket_size_bytes(base) };
        let n_channels = unsafe { HeaderView::n_channels(base) };
        let dtype_code = unsafe { HeaderView::data_type_code(base) };

        let dtype = DataType::from_code(dtype_code)
            .ok_or_else(|| RingError::Corrupt(format!("unknown dataType code {dtype_code}")))?;
        if n_channels == 0 {
            return Err(RingError::Corrupt("nChannels is zero".to_string()));
        }

        let row_bytes = n_channels * dtype.sample_size() as u64;
        if row_bytes == 0 || buf_size_bytes % row_bytes != 0 || pocket_size_bytes % row_bytes != 0
        {
            return Err(RingError::Corrupt(
                "bufSizeBytes/pocketSizeBytes is not a whole number of rows".to_string(),
            ));
        }
        let buf_capacity = buf_size_bytes / row_bytes;
        let pocket_capacity = pocket_size_bytes / row_bytes;

        let expected_total = HEADER_SIZE as u64 + buf_size_bytes + pocket_size_bytes;
        if file_len != expected_total {
            return Err(RingError::Corrupt(format!(
                "file is {file_len} bytes, header declares {expected_total}"
            )));
        }

        Ok(RingBuffer {
            mmap,
            n_channels,
            buf_capacity,
            pocket_capacity,
            dtype,
            write_lock: Mutex::new(()),
            warned_slow_mode: AtomicBool::new(false),
        })
    }

    /// Number of channels (row width) this buffer was created with.
    #[must_use]
    pub fn n_channels(&self) -> u64 {
        self.n_channels
    }

    /// Number of rows the data section holds.
    #[must_use]
    pub fn buf_capacity(&self) -> u64 {
        self.buf_capacity
    }

    /// Number of rows mirrored in the pocket.
    #[must_use]
    pub fn pocket_capacity(&self) -> u64 {
        self.pocket_capacity
    }

    /// On-disk sample type.
    #[must_use]
    pub fn dtype(&self) -> DataType {
        self.dtype
    }

    /// Total number of rows ever written, published by the writer with
    /// release ordering and observed here with acquire ordering.
    #[must_use]
    pub fn samples_written(&self) -> u64 {
        self.n_samples_written_atomic().load(Ordering::Acquire)
    }

    /// Check whether `[start, end)` can be read right now, without
    /// performing the read.
    #[must_use]
    pub fn check_availability(&self, start: i64, end: i64) -> AvailabilityCode {
        if start < 0 || end <= 0 {
            return AvailabilityCode::NegativeIndex;
        }
        let start = start as u64;
        let end = (end as u64).max(start);
        let written = self.samples_written();
        if end > written {
            return AvailabilityCode::NotReady;
        }
        let oldest = written.saturating_sub(self.buf_capacity);
        if start < oldest {
            return AvailabilityCode::Overwritten;
        }
        AvailabilityCode::Ok
    }

    /// Read rows `[start, end)`, zero-copy when possible.
    ///
    /// Errors with [`RingError::NegativeIndex`] if `start < 0` or `end <= 0`,
    /// [`RingError::NotReady`] if `end` exceeds what has been written, or
    /// [`RingError::Overwritten`] if `start` precedes the oldest row still
    /// retained.
    pub fn get(&self, start: i64, end: i64) -> Result<RowView<'_>, RingError> {
        self.require_f32()?;
        if start < 0 || end <= 0 {
            return Err(RingError::NegativeIndex);
        }
        let start = start as u64;
        let end = (end as u64).max(start);
        let written = self.samples_written();
        if end > written {
            return Err(RingError::NotReady { start, end, written });
        }
        let oldest = written.saturating_sub(self.buf_capacity);
        if start < oldest {
            return Err(RingError::Overwritten { start, end, oldest });
        }

        let chunk = end - start;
        if chunk == 0 {
            return Ok(RowView::Borrowed(&[]));
        }

        let local_start = start % self.buf_capacity;
        let local_end = end % self.buf_capacity;

        if local_start == 0 && local_end == 0 {
            return Ok(RowView::Borrowed(self.data_slice(0, self.buf_capacity)));
        }

        if local_end > local_start {
            return Ok(RowView::Borrowed(self.data_slice(local_start, local_end)));
        }

        if chunk <= self.pocket_capacity {
            let elems = (chunk * self.n_channels) as usize;
            let ptr = unsafe { self.data_ptr().add((local_start * self.n_channels) as usize) };
            return Ok(RowView::Borrowed(unsafe {
                std::slice::from_raw_parts(ptr, elems)
            }));
        }

        if !self.warned_slow_mode.swap(true, Ordering::Relaxed) {
            warn!(
                chunk,
                pocket_capacity = self.pocket_capacity,
                "read wraps past the pocket; falling back to a copy"
            );
        }
        let mut owned = Vec::with_capacity((chunk * self.n_channels) as usize);
        owned.extend_from_slice(self.data_slice(local_start, self.buf_capacity));
        owned.extend_from_slice(self.data_slice(0, local_end));
        Ok(RowView::Owned(owned))
    }

    /// Convenience accessor for the single most recently written row.
    pub fn get_last_sample(&self) -> Result<RowView<'_>, RingError> {
        let written = self.samples_written();
        if written == 0 {
            return Err(RingError::NotReady {
                start: 0,
                end: 1,
                written,
            });
        }
        self.get(written as i64 - 1, written as i64)
    }

    /// Append `rows` (row-major, `rows.len()` must be a multiple of
    /// `n_channels`) to the buffer and publish the new write count.
    ///
    /// If `rows` holds more rows than `buf_capacity`, only the trailing
    /// `buf_capacity` rows are retained — the write count still advances
    /// by the full row count, so older rows are considered overwritten.
    pub fn put(&self, rows: &[f32]) -> Result<(), RingError> {
        self.require_f32()?;
        if self.n_channels == 0 || rows.len() as u64 % self.n_channels != 0 {
            return Err(RingError::ShapeMismatch {
                len: rows.len(),
                n_channels: self.n_channels,
            });
        }
        let n = rows.len() as u64 / self.n_channels;
        if n == 0 {
            return Ok(());
        }

        let _guard = self.write_lock.lock().expect("ring buffer write lock poisoned");
        let current = self.samples_written();
        let sample_end = current + n;

        let (sample_start, effective_rows) = if n > self.buf_capacity {
            let skip = (n - self.buf_capacity) * self.n_channels;
            (sample_end - self.buf_capacity, &rows[skip as usize..])
        } else {
            (current, rows)
        };

        let local_start = sample_start % self.buf_capacity;
        let local_end = sample_end % self.buf_capacity;

        if local_end > local_start {
            self.write_data(local_start, effective_rows);
            self.mirror_pocket(local_start, local_end);
        } else {
            let tail_rows = self.buf_capacity - local_start;
            let split = (tail_rows * self.n_channels) as usize;
            let (tail, head) = effective_rows.split_at(split);
            self.write_data(local_start, tail);
            self.write_data(0, head);
            self.mirror_pocket(local_start, self.buf_capacity);
            self.mirror_pocket(0, local_end);
        }

        self.n_samples_written_atomic()
            .store(sample_end, Ordering::Release);
        Ok(())
    }

    fn require_f32(&self) -> Result<(), RingError> {
        if self.dtype != DataType::F32 {
            return Err(RingError::WrongSampleType {
                expected: "F32",
                actual: self.dtype.name(),
            });
        }
        Ok(())
    }

    fn n_samples_written_atomic(&self) -> &AtomicU64 {
        unsafe { HeaderView::n_samples_written(self.mmap_base_mut()) }
    }

    /// # Safety
    /// Caller must not alias this with another `&mut` into the mapping.
    #[allow(clippy::mut_from_ref)]
    unsafe fn mmap_base_mut(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    unsafe fn data_ptr(&self) -> *mut f32 {
        self.mmap_base_mut().add(HEADER_SIZE).cast::<f32>()
    }

    unsafe fn pocket_ptr(&self) -> *mut f32 {
        let data_bytes = (self.buf_capacity * self.n_channels) as usize * self.dtype.sample_size();
        self.mmap_base_mut()
            .add(HEADER_SIZE + data_bytes)
            .cast::<f32>()
    }

    fn data_slice(&self, lo: u64, hi: u64) -> &[f32] {
        debug_assert!(hi <= self.buf_capacity && lo <= hi);
        let len = ((hi - lo) * self.n_channels) as usize;
        unsafe { std::slice::from_raw_parts(self.data_ptr().add((lo * self.n_channels) as usize), len) }
    }

    fn write_data(&self, lo: u64, rows: &[f32]) {
        unsafe {
            std::ptr::copy_nonoverlapping(
                rows.as_ptr(),
                self.data_ptr().add((lo * self.n_channels) as usize),
                rows.len(),
            );
        }
    }

    /// Mirror data rows `[lo, hi)` into the pocket, clipped to the
    /// pocket's own capacity.
    fn mirror_pocket(&self, lo: u64, hi: u64) {
        let lo = lo.min(self.pocket_capacity);
        let hi = hi.min(self.pocket_capacity);
        if hi <= lo {
            return;
        }
        let len = ((hi - lo) * self.n_channels) as usize;
        unsafe {
            std::ptr::copy_nonoverlapping(
                self.data_ptr().add((lo * self.n_channels) as usize),
                self.pocket_ptr().add((lo * self.n_channels) as usize),
                len,
            );
        }
    }
}

fn clamp_up(value: u64, field: &'static str) -> u64 {
    if value < 1 {
        warn!(field, value, "clamping to 1");
        1
    } else {
        value
    }
}
