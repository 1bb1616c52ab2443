//! Scroll geometry: which rows a pixel viewport can see, padded with
//! overscan and clamped to the dataset.

/// A half-open row range plus the total scrollable height it was computed
/// against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowWindow {
    pub start: usize,
    /// Exclusive.
    pub end: usize,
    pub total_height_px: u64,
}

impl RowWindow {
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }
}

/// Compute the visible row window for a scroll position.
///
/// The window covers every row any pixel of the viewport touches, widened by
/// `overscan` rows on each side and clamped to `[0, row_count)`. An empty
/// dataset yields an empty window no matter the offset. A zero row height
/// from a bad config value is treated as one pixel.
pub fn compute(
    scroll_offset_px: u64,
    viewport_height_px: u64,
    row_count: usize,
    row_height_px: u64,
    overscan: usize,
) -> RowWindow {
    let row_height = row_height_px.max(1);
    let total_height_px = row_height.saturating_mul(row_count as u64);

    if row_count == 0 {
        return RowWindow {
            start: 0,
            end: 0,
            total_height_px,
        };
    }

    let last_row = row_count - 1;
    let first_visible = ((scroll_offset_px / row_height) as usize).min(last_row);
    let last_pixel = scroll_offset_px.saturating_add(viewport_height_px.max(1)) - 1;
    let last_visible = ((last_pixel / row_height) as usize).min(last_row);

    let start = first_visible.saturating_sub(overscan);
    let end = last_visible.saturating_add(overscan).min(last_row) + 1;

    RowWindow {
        start,
        end,
        total_height_px,
    }
}
