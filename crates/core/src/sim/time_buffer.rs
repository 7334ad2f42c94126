//! Delayed inter-stage signal buffer.
//!
//! Backward signals (decode/rename/IEW/commit toward fetch) take a
//! configurable number of cycles to arrive. A `TimeBuffer` holds one entry
//! per cycle of history; writers fill the current entry and readers observe
//! an entry a fixed number of cycles in the past.

/// A ring buffer of per-cycle entries with bounded history.
///
/// `advance` rotates the buffer at every clock edge: the oldest entry is
/// recycled into a fresh default value that becomes the new "now" slot.
pub struct TimeBuffer<T> {
    entries: Vec<T>,
    /// Index of the "now" slot inside `entries`.
    base: usize,
}

impl<T: Default> TimeBuffer<T> {
    /// Creates a buffer able to look `past` cycles back in time.
    pub fn new(past: usize) -> Self {
        let mut entries = Vec::with_capacity(past + 1);
        entries.resize_with(past + 1, T::default);
        Self { entries, base: 0 }
    }

    /// Number of past cycles this buffer retains.
    pub fn depth(&self) -> usize {
        self.entries.len() - 1
    }

    /// Rotates the buffer by one cycle.
    ///
    /// The oldest entry becomes the fresh "now" slot, reset to `T::default`.
    pub fn advance(&mut self) {
        self.base = (self.base + 1) % self.entries.len();
        self.entries[self.base] = T::default();
    }

    /// Mutable access to the entry being produced this cycle.
    pub fn now_mut(&mut self) -> &mut T {
        &mut self.entries[self.base]
    }

    /// Reads the entry produced `delay` cycles ago.
    ///
    /// `delay` must not exceed the buffer depth.
    pub fn read(&self, delay: usize) -> &T {
        assert!(delay <= self.depth(), "time buffer read beyond history");
        let len = self.entries.len();
        &self.entries[(self.base + len - delay) % len]
    }
}
