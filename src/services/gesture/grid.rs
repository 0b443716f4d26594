//! Calendar grid geometry
//!
//! Week view: one column per day, time flowing downwards in slots. Pointer
//! coordinates are viewport pixels; the grid body starts at `origin` (below
//! the day header, right of the hour gutter) and scrolls vertically.

use crate::infra::config::GridConfig;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridCell {
    pub day_index: u32,
    pub slot_index: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
}

#[derive(Debug, Clone)]
pub struct CalendarGrid {
    first_day: NaiveDate,
    days: u32,
    slot_minutes: u32,
    slot_height_px: f64,
    column_width_px: f64,
    day_start_hour: u32,
    day_end_hour: u32,
    origin_x: f64,
    origin_y: f64,
    viewport_height: f64,
    scroll_top: f64,
}

impl CalendarGrid {
    pub fn new(config: &GridConfig, first_day: NaiveDate, viewport_height: f64) -> Self {
        Self {
            first_day,
            days: config.days,
            slot_minutes: config.slot_minutes,
            slot_height_px: config.slot_height_px,
            column_width_px: config.column_width_px,
            day_start_hour: config.day_start_hour,
            day_end_hour: config.day_end_hour,
            origin_x: 0.0,
            origin_y: 0.0,
            viewport_height,
            scroll_top: 0.0,
        }
    }

    /// Offset of the grid body inside the viewport
    pub fn with_origin(mut self, x: f64, y: f64) -> Self {
        self.origin_x = x;
        self.origin_y = y;
        self
    }

    pub fn first_day(&self) -> NaiveDate {
        self.first_day
    }

    pub fn slot_minutes(&self) -> u32 {
        self.slot_minutes
    }

    pub fn scroll_top(&self) -> f64 {
        self.scroll_top
    }

    fn slots_per_day(&self) -> u32 {
        (self.day_end_hour - self.day_start_hour) * 60 / self.slot_minutes
    }

    pub fn content_height(&self) -> f64 {
        f64::from(self.slots_per_day()) * self.slot_height_px
    }

    pub fn max_scroll(&self) -> f64 {
        (self.content_height() - (self.viewport_height - self.origin_y)).max(0.0)
    }

    /// Viewport y to grid-content y
    #[inline]
    pub fn content_y(&self, y: f64) -> f64 {
        y - self.origin_y + self.scroll_top
    }

    /// Column under x; may be outside `0..days`
    #[inline]
    pub fn column_of(&self, x: f64) -> i64 {
        ((x - self.origin_x) / self.column_width_px).floor() as i64
    }

    /// Cell under a viewport position, `None` outside the grid body
    pub fn cell_at(&self, x: f64, y: f64) -> Option<GridCell> {
        if y < self.origin_y || y >= self.viewport_height {
            return None;
        }
        let column = self.column_of(x);
        if column < 0 || column >= i64::from(self.days) {
            return None;
        }
        let content_y = self.content_y(y);
        if content_y < 0.0 || content_y >= self.content_height() {
            return None;
        }
        let slot = (content_y / self.slot_height_px).floor() as u32;
        Some(GridCell { day_index: column as u32, slot_index: slot })
    }

    /// Wall-clock time at the top of a cell
    pub fn cell_time(&self, cell: GridCell) -> Option<NaiveDateTime> {
        let date = self.first_day.checked_add_days(chrono::Days::new(u64::from(cell.day_index)))?;
        let minutes = self.day_start_hour * 60 + cell.slot_index * self.slot_minutes;
        let time = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)?;
        Some(date.and_time(time))
    }

    /// Vertical pixel offset to minutes, snapped to whole slots
    pub fn snap_minutes(&self, dy_px: f64) -> i64 {
        let slots = (dy_px / self.slot_height_px).round() as i64;
        slots * i64::from(self.slot_minutes)
    }

    /// Scroll direction when y sits within `edge_px` of the visible body edges
    pub fn edge_zone(&self, y: f64, edge_px: f64) -> Option<ScrollDirection> {
        if y < self.origin_y + edge_px {
            Some(ScrollDirection::Up)
        } else if y > self.viewport_height - edge_px {
            Some(ScrollDirection::Down)
        } else {
            None
        }
    }

    /// Scroll by `step_px` clamped to the scrollable range; false when clamped flat
    pub fn scroll(&mut self, direction: ScrollDirection, step_px: f64) -> bool {
        let delta = match direction {
            ScrollDirection::Up => -step_px,
            ScrollDirection::Down => step_px,
        };
        let next = (self.scroll_top + delta).clamp(0.0, self.max_scroll());
        let changed = next != self.scroll_top;
        self.scroll_top = next;
        changed
    }

    pub fn set_scroll_top(&mut self, scroll_top: f64) {
        self.scroll_top = scroll_top.clamp(0.0, self.max_scroll());
    }
}
