use crate::composite::Pixel;
use std::ops::Range;
use std::sync::{Condvar, Mutex, MutexGuard, OnceLock, PoisonError};
use std::time::Duration;

/// Column-major grid of packed `0xAARRGGBB` colours written by one producer and
/// read by any number of consumers.
///
/// Cells, the "more available" hint and the publish counter share one mutex, so
/// a reader either sees a column fully written or not at all. Dimensions are
/// set once and can be read without the lock afterwards.
pub struct SharedRaster {
    dims: OnceLock<(usize, usize)>,
    state: Mutex<RasterState>,
    changed: Condvar,
}

#[derive(Default)]
struct RasterState {
    cells: Vec<u32>,
    more_available: bool,
    published: usize,
    closed: bool,
}

impl SharedRaster {
    pub fn new() -> Self {
        Self {
            dims: OnceLock::new(),
            state: Mutex::new(RasterState::default()),
            changed: Condvar::new(),
        }
    }

    /// Allocates a zeroed `width x height` buffer. Only the first call succeeds.
    pub fn allocate(&self, width: usize, height: usize) -> bool {
        let mut st = self.lock();
        if self.dims.get().is_some() {
            return false;
        }
        st.cells = vec![0; width.saturating_mul(height)];
        // Set under the lock so a reader that observes dims also finds the buffer.
        let _ = self.dims.set((width, height));
        drop(st);
        self.changed.notify_all();
        true
    }

    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.dims.get().copied()
    }

    /// Writes all rows of column `x` and raises the "more available" hint in one
    /// critical section. Returns false (and writes nothing) on a size mismatch.
    pub fn publish_column(&self, x: usize, column: &[Pixel]) -> bool {
        let Some((width, height)) = self.dimensions() else {
            return false;
        };
        if x >= width || column.len() != height {
            return false;
        }
        let mut st = self.lock();
        let base = x * height;
        for (dst, px) in st.cells[base..base + height].iter_mut().zip(column) {
            *dst = px.to_argb();
        }
        st.more_available = true;
        st.published += 1;
        drop(st);
        self.changed.notify_all();
        true
    }

    /// Marks the producer as finished and wakes every waiting consumer.
    pub fn close(&self) {
        self.lock().closed = true;
        self.changed.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Returns and clears the coalescing "something changed" hint. It says nothing
    /// about which or how many columns were published.
    pub fn poll_more_available(&self) -> bool {
        std::mem::take(&mut self.lock().more_available)
    }

    /// Blocks until the hint is raised, the producer closes, or `timeout` passes.
    /// Consumes the hint like [`poll_more_available`](Self::poll_more_available).
    pub fn wait_for_update(&self, timeout: Duration) -> bool {
        let st = self.lock();
        let (mut st, _) = self
            .changed
            .wait_timeout_while(st, timeout, |s| !s.more_available && !s.closed)
            .unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut st.more_available)
    }

    pub fn columns_published(&self) -> usize {
        self.lock().published
    }

    pub fn read_cell(&self, x: usize, y: usize) -> Option<u32> {
        let (width, height) = self.dimensions()?;
        if x >= width || y >= height {
            return None;
        }
        Some(self.lock().cells[x * height + y])
    }

    pub fn read_snapshot(&self) -> Option<RasterSnapshot> {
        let (width, _) = self.dimensions()?;
        self.read_columns(0..width)
    }

    /// Copies only `columns` (clamped to the raster width).
    pub fn read_columns(&self, columns: Range<usize>) -> Option<RasterSnapshot> {
        self.dimensions()?;
        let st = self.lock();
        self.copy_columns(&st, columns)
    }

    /// Copies the `count` columns a scrolling view shows: the newest published
    /// column sits last once more than `count` columns exist. The window is
    /// chosen under the same lock as the copy.
    pub fn read_tail(&self, count: usize) -> Option<RasterSnapshot> {
        let (width, _) = self.dimensions()?;
        let st = self.lock();
        let end = st.published.max(count).min(width);
        self.copy_columns(&st, end.saturating_sub(count)..end)
    }

    fn copy_columns(&self, st: &RasterState, columns: Range<usize>) -> Option<RasterSnapshot> {
        let (width, height) = self.dimensions()?;
        let end = columns.end.min(width);
        let start = columns.start.min(end);
        Some(RasterSnapshot {
            width,
            height,
            first_column: start,
            cells: st.cells[start * height..end * height].to_vec(),
            columns_published: st.published,
        })
    }

    // Poisoning only means a holder panicked; the cells are still plain data.
    fn lock(&self) -> MutexGuard<'_, RasterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SharedRaster {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the raster, or of a contiguous range of its columns.
/// Column indices stay those of the full raster.
#[derive(Debug, Clone, PartialEq)]
pub struct RasterSnapshot {
    pub width: usize,
    pub height: usize,
    pub first_column: usize,
    cells: Vec<u32>,
    pub columns_published: usize,
}

impl RasterSnapshot {
    /// The columns this copy holds.
    pub fn columns(&self) -> Range<usize> {
        let held = if self.height == 0 { 0 } else { self.cells.len() / self.height };
        self.first_column..self.first_column + held
    }

    pub fn cell(&self, x: usize, y: usize) -> u32 {
        self.column(x)[y]
    }

    /// Panics if `x` is not held; check [`columns`](Self::columns) first.
    pub fn column(&self, x: usize) -> &[u32] {
        let i = x - self.first_column;
        &self.cells[i * self.height..(i + 1) * self.height]
    }

    /// A never-written column is all zero; written cells always carry alpha.
    pub fn is_column_written(&self, x: usize) -> bool {
        self.column(x).iter().any(|&c| c != 0)
    }

    /// Row-major RGBA bytes of the held columns, the layout the terminal
    /// renderers take.
    pub fn to_rgba(&self) -> Vec<u8> {
        let cols = self.columns();
        let w = cols.len();
        let mut out = vec![0u8; w * self.height * 4];
        for (ox, x) in cols.enumerate() {
            for (y, &argb) in self.column(x).iter().enumerate() {
                let (r, g, b) = crate::composite::argb_channels(argb);
                let i = (y * w + ox) * 4;
                out[i..i + 4].copy_from_slice(&[r, g, b, (argb >> 24) as u8]);
            }
        }
        out
    }
}
