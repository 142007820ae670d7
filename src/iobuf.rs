//! Growable contiguous byte buffer backing each connection's receive and
//! send sides.
//!
//! Geometric growth bounds the amortized append cost; draining shifts the
//! tail forward so the contents stay contiguous and can be handed to parsers
//! as a single slice.

/// Default geometric growth multiplier applied when a buffer fills up.
pub const DEFAULT_GROWTH_FACTOR: f64 = 2.0;

/// A growable byte buffer with append and prefix-drop operations.
pub struct IoBuf {
    buf: Vec<u8>,
    growth: f64,
}

impl IoBuf {
    /// Create an empty buffer with zero capacity.
    pub fn new() -> Self {
        IoBuf {
            buf: Vec::new(),
            growth: DEFAULT_GROWTH_FACTOR,
        }
    }

    /// Create a buffer with `capacity` bytes pre-allocated.
    ///
    /// Allocation failure degrades silently to zero capacity; the buffer is
    /// still usable and will attempt to grow on the first append.
    pub fn with_capacity(capacity: usize) -> Self {
        let mut buf = Vec::new();
        let _ = buf.try_reserve_exact(capacity);
        IoBuf {
            buf,
            growth: DEFAULT_GROWTH_FACTOR,
        }
    }

    /// Set the growth multiplier. Values `<= 1.0` fall back to the default.
    pub fn with_growth_factor(mut self, growth: f64) -> Self {
        self.growth = if growth > 1.0 {
            growth
        } else {
            DEFAULT_GROWTH_FACTOR
        };
        self
    }

    /// Append bytes, growing capacity to `(len + n) * growth` when full.
    ///
    /// Returns the number of bytes accepted: `data.len()` on success, 0 for
    /// empty input or when the allocation fails (the buffer is left
    /// untouched). A zero return from a non-empty input is the backpressure
    /// signal; the caller retries after the buffer drains.
    pub fn append(&mut self, data: &[u8]) -> usize {
        if data.is_empty() {
            return 0;
        }
        let needed = self.buf.len() + data.len();
        if needed >= self.buf.capacity() {
            let target = (needed as f64 * self.growth) as usize;
            if self.buf.try_reserve_exact(target - self.buf.len()).is_err() {
                return 0;
            }
        }
        self.buf.extend_from_slice(data);
        data.len()
    }

    /// Drop the first `n` bytes, shifting the tail forward.
    ///
    /// A no-op when `n > len`. Capacity is unchanged.
    pub fn consume(&mut self, n: usize) {
        let len = self.buf.len();
        if n > len {
            return;
        }
        self.buf.copy_within(n..len, 0);
        self.buf.truncate(len - n);
    }

    /// Get a reference to the buffered bytes.
    pub fn data(&self) -> &[u8] {
        &self.buf
    }

    /// Number of valid bytes.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Check whether the buffer holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Allocated capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.capacity()
    }

    /// Discard all contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for IoBuf {
    fn default() -> Self {
        Self::new()
    }
}
