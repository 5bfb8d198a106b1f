//! Viewport capability exposed by a bound consumer
//!
//! Tables, lists and forms all drive the controllers through this trait; the
//! controllers never see a concrete widget type.

/// View-level state that must survive a sink mutation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ViewState {
    /// Selected row indices
    pub selected_rows: Vec<usize>,

    /// Vertical scroll offset in pixels
    pub scroll_offset: f32,
}

/// Geometry and visible-range queries answered by the consumer
pub trait Viewport: Send + Sync {
    /// First row index currently on screen
    fn first_visible_row(&self) -> usize;

    /// Last row index currently on screen
    fn last_visible_row(&self) -> usize;

    /// Pixel extent available for rows
    fn available_extent(&self) -> f32;

    /// Pixel extent of a single row
    fn unit_extent(&self) -> f32;

    /// Snapshot selection and scroll position before the sink changes
    fn capture_view_state(&self) -> Option<ViewState> {
        None
    }

    /// Put back what `capture_view_state` returned
    fn restore_view_state(&self, _state: ViewState) {}

    /// Rows that fit into the available extent, `None` when the geometry is unusable
    fn row_capacity(&self) -> Option<usize> {
        let unit = self.unit_extent();
        let available = self.available_extent();
        if unit <= 0.0 || !unit.is_finite() || !available.is_finite() {
            return None;
        }
        Some(((available / unit).floor() as usize).max(1))
    }
}
