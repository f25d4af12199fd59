use std::fmt;

const DEFAULT_MIN_BUFFER_SIZE: usize = 4 * 1024;
const DEFAULT_MAX_BUFFER_SIZE: usize = 64 * 1024;

/// Dynamically allocated byte region, reused across refills.
///
/// The usable region is always fully initialized, so windows into it can be
/// handed out as plain slices.
#[derive(Default)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(min_capacity: usize) -> Self {
        let mut buffer = Self::default();
        buffer.reset(min_capacity);
        buffer
    }

    /// Ensures at least `min_capacity` of usable space. Existing contents are
    /// unspecified afterwards.
    ///
    /// Keeps the current allocation unless it is too small, or so much larger
    /// than `min_capacity` that holding on to it would be wasteful.
    pub fn reset(&mut self, min_capacity: usize) {
        let capacity = self.data.capacity();
        if capacity < min_capacity || wasteful(capacity, min_capacity) {
            self.data = Vec::with_capacity(min_capacity);
        }
        let capacity = self.data.capacity();
        self.data.resize(capacity, 0);
    }

    /// The usable size. It can be greater than what was requested.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

impl From<Vec<u8>> for Buffer {
    /// Wraps already-filled bytes; the usable region is exactly `data`.
    #[inline]
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("capacity", &self.capacity())
            .finish()
    }
}

fn wasteful(capacity: usize, used: usize) -> bool {
    capacity.saturating_sub(used) > used.max(DEFAULT_MIN_BUFFER_SIZE)
}

/// Tuning for how buffered readers and writers size their buffers.
///
/// Buffers start at `min_buffer_size` and double on successive refills up to
/// `max_buffer_size`. Callers that need more at once can say so through
/// `recommended_length` arguments or a size hint.
#[derive(Clone, Copy, Debug)]
pub struct BufferOptions {
    min_buffer_size: usize,
    max_buffer_size: usize,
}

impl Default for BufferOptions {
    #[inline]
    fn default() -> Self {
        Self {
            min_buffer_size: DEFAULT_MIN_BUFFER_SIZE,
            max_buffer_size: DEFAULT_MAX_BUFFER_SIZE,
        }
    }
}

impl BufferOptions {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn with_min_buffer_size(mut self, min_buffer_size: usize) -> Self {
        self.min_buffer_size = min_buffer_size.max(1);
        self.max_buffer_size = self.max_buffer_size.max(self.min_buffer_size);
        self
    }

    #[inline]
    pub fn with_max_buffer_size(mut self, max_buffer_size: usize) -> Self {
        self.max_buffer_size = max_buffer_size.max(1);
        self.min_buffer_size = self.min_buffer_size.min(self.max_buffer_size);
        self
    }

    /// Fixes both bounds, disabling exponential growth.
    #[inline]
    pub fn with_buffer_size(self, buffer_size: usize) -> Self {
        self.with_min_buffer_size(buffer_size)
            .with_max_buffer_size(buffer_size)
    }

    #[inline]
    pub fn min_buffer_size(&self) -> usize {
        self.min_buffer_size
    }

    #[inline]
    pub fn max_buffer_size(&self) -> usize {
        self.max_buffer_size
    }
}
