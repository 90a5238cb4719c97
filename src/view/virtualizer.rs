use serde::Serialize;

/// Scroll position and visible extent, in pixels.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Viewport {
    pub scroll_offset: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(scroll_offset: f64, height: f64) -> Self {
        Self {
            scroll_offset,
            height,
        }
    }
}

/// Index range to materialize, plus the strictly visible part of it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WindowRange {
    /// First materialized index (inclusive).
    pub start: usize,
    /// Last materialized index (exclusive).
    pub end: usize,
    pub visible_start: usize,
    pub visible_end: usize,
}

impl WindowRange {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    pub fn contains(&self, index: usize) -> bool {
        (self.start..self.end).contains(&index)
    }
}

/// Fixed-row-height windowing over a sequence of known length.
///
/// Everything is arithmetic on the length and the viewport, so moving the
/// viewport costs O(1) regardless of sequence size.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Virtualizer {
    row_height: f64,
    overscan: usize,
}

impl Virtualizer {
    pub fn new(row_height: f64, overscan: usize) -> Self {
        Self {
            row_height: if row_height > 0.0 { row_height } else { 1.0 },
            overscan,
        }
    }

    pub fn row_height(&self) -> f64 {
        self.row_height
    }

    pub fn overscan(&self) -> usize {
        self.overscan
    }

    /// Height of the full scrollable content.
    pub fn total_height(&self, len: usize) -> f64 {
        len as f64 * self.row_height
    }

    /// Absolute top offset of row `index`.
    pub fn offset_of(&self, index: usize) -> f64 {
        index as f64 * self.row_height
    }

    /// Largest meaningful scroll offset for `len` rows.
    pub fn max_scroll(&self, len: usize, viewport_height: f64) -> f64 {
        (self.total_height(len) - viewport_height.max(0.0)).max(0.0)
    }

    pub fn clamp_offset(&self, len: usize, viewport: Viewport) -> f64 {
        let offset = if viewport.scroll_offset.is_finite() {
            viewport.scroll_offset
        } else {
            0.0
        };
        offset.clamp(0.0, self.max_scroll(len, viewport.height))
    }

    pub fn range(&self, len: usize, viewport: Viewport) -> WindowRange {
        if len == 0 {
            return WindowRange::default();
        }
        let offset = self.clamp_offset(len, viewport);
        let height = viewport.height.max(0.0);

        let visible_start = ((offset / self.row_height).floor() as usize).min(len - 1);
        let visible_end = ((offset + height) / self.row_height).ceil() as usize;
        let visible_end = visible_end.max(visible_start + 1).min(len);

        WindowRange {
            start: visible_start.saturating_sub(self.overscan),
            end: visible_end.saturating_add(self.overscan).min(len),
            visible_start,
            visible_end,
        }
    }

    /// Materialized `(index, offset)` pairs for the viewport.
    pub fn items(&self, len: usize, viewport: Viewport) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.range(len, viewport);
        (range.start..range.end).map(move |index| (index, self.offset_of(index)))
    }

    /// Scroll offset that brings `index` fully into view with minimal
    /// movement from `viewport`.
    pub fn scroll_to_index(&self, index: usize, len: usize, viewport: Viewport) -> f64 {
        if len == 0 {
            return 0.0;
        }
        let index = index.min(len - 1);
        let top = self.offset_of(index);
        let bottom = top + self.row_height;
        let current = self.clamp_offset(len, viewport);

        let target = if top < current {
            top
        } else if bottom > current + viewport.height {
            bottom - viewport.height
        } else {
            current
        };
        target.clamp(0.0, self.max_scroll(len, viewport.height))
    }
}
