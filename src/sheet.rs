//! Drag-to-resize and drag-to-dismiss for a bottom sheet.
//!
//! Pointer and touch input feed the same three calls; coordinates are
//! client y values in pixels, growing downwards.

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SheetRelease {
    /// Released below the close threshold; the owner should close the sheet.
    Close,
    /// The released height is the new default open height.
    Resize(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Drag {
    start_y: f64,
    start_height: f64,
}

#[derive(Debug, Clone)]
pub struct BottomSheet {
    container_height: f64,
    min_height: f64,
    max_fraction: f64,
    close_threshold_fraction: f64,
    default_height: f64,
    height: f64,
    drag: Option<Drag>,
}

impl BottomSheet {
    pub const CLOSE_THRESHOLD_FRACTION: f64 = 0.10;

    pub fn new(container_height: f64, min_height: f64, max_fraction: f64, default_height: f64) -> Self {
        let mut sheet = Self {
            container_height: container_height.max(0.0),
            min_height: min_height.max(0.0),
            max_fraction: max_fraction.clamp(0.0, 1.0),
            close_threshold_fraction: Self::CLOSE_THRESHOLD_FRACTION,
            default_height,
            height: default_height,
            drag: None,
        };
        sheet.default_height = sheet.clamp(default_height);
        sheet.height = sheet.default_height;
        sheet
    }

    pub fn with_close_threshold(mut self, fraction: f64) -> Self {
        self.close_threshold_fraction = fraction.clamp(0.0, 1.0);
        self
    }

    pub fn height(&self) -> f64 {
        self.height
    }

    pub fn default_height(&self) -> f64 {
        self.default_height
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    fn max_height(&self) -> f64 {
        (self.container_height * self.max_fraction).max(self.min_height)
    }

    fn clamp(&self, height: f64) -> f64 {
        height.clamp(self.min_height, self.max_height())
    }

    /// The container was resized (e.g. the window changed).
    pub fn set_container_height(&mut self, container_height: f64) {
        self.container_height = container_height.max(0.0);
        self.default_height = self.clamp(self.default_height);
        if self.drag.is_none() {
            self.height = self.default_height;
        }
    }

    pub fn pointer_down(&mut self, y: f64) {
        self.drag = Some(Drag {
            start_y: y,
            start_height: self.height,
        });
    }

    /// Follow the pointer. Heights below the minimum are kept (down to
    /// zero) while dragging so a dismiss gesture can be recognised.
    pub fn pointer_move(&mut self, y: f64) {
        let Some(drag) = self.drag else {
            return;
        };
        let proposed = drag.start_height + (drag.start_y - y);
        self.height = proposed.clamp(0.0, self.max_height());
    }

    /// End the drag. Returns `None` when no drag was in progress.
    pub fn pointer_up(&mut self) -> Option<SheetRelease> {
        self.drag.take()?;

        if self.height < self.container_height * self.close_threshold_fraction {
            self.height = self.default_height;
            return Some(SheetRelease::Close);
        }

        let height = self.clamp(self.height);
        self.default_height = height;
        self.height = height;
        Some(SheetRelease::Resize(height))
    }

    /// Abandon a drag without changing the default (pointer left the window).
    pub fn pointer_cancel(&mut self) {
        if self.drag.take().is_some() {
            self.height = self.default_height;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet() -> BottomSheet {
        // 1000px container, 200px minimum, up to 90%, opens at 500px
        BottomSheet::new(1000.0, 200.0, 0.9, 500.0)
    }

    #[test]
    fn test_drag_below_threshold_closes() {
        let mut sheet = sheet();
        sheet.pointer_down(500.0);
        sheet.pointer_move(920.0);
        assert_eq!(sheet.height(), 80.0);

        assert_eq!(sheet.pointer_up(), Some(SheetRelease::Close));
        assert_eq!(sheet.default_height(), 500.0);
        assert!(!sheet.is_dragging());
    }

    #[test]
    fn test_drag_above_threshold_persists_height() {
        let mut sheet = sheet();
        sheet.pointer_down(500.0);
        sheet.pointer_move(300.0);

        assert_eq!(sheet.pointer_up(), Some(SheetRelease::Resize(700.0)));
        assert_eq!(sheet.default_height(), 700.0);

        // the next drag starts from the persisted height
        sheet.pointer_down(300.0);
        sheet.pointer_move(350.0);
        assert_eq!(sheet.height(), 650.0);
    }

    #[test]
    fn test_height_is_clamped() {
        let mut sheet = sheet();
        sheet.pointer_down(500.0);
        sheet.pointer_move(-2000.0);
        assert_eq!(sheet.height(), 900.0);

        // between the threshold and the minimum snaps back up to the minimum
        sheet.pointer_move(850.0);
        assert_eq!(sheet.height(), 150.0);
        assert_eq!(sheet.pointer_up(), Some(SheetRelease::Resize(200.0)));

        sheet.pointer_down(0.0);
        sheet.pointer_move(5000.0);
        assert_eq!(sheet.height(), 0.0);
    }

    #[test]
    fn test_moves_without_drag_are_ignored() {
        let mut sheet = sheet();
        sheet.pointer_move(100.0);
        assert_eq!(sheet.height(), 500.0);
        assert_eq!(sheet.pointer_up(), None);

        sheet.pointer_down(500.0);
        sheet.pointer_move(400.0);
        sheet.pointer_cancel();
        assert_eq!(sheet.height(), 500.0);
    }

    #[test]
    fn test_container_resize_clamps_default() {
        let mut sheet = sheet();
        sheet.set_container_height(400.0);
        assert_eq!(sheet.default_height(), 360.0);
        assert_eq!(sheet.height(), 360.0);
    }
}
