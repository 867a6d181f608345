/// Axis-aligned rectangle in screen coordinates, right/bottom exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// Bounds of the host window as reported by the window system.
pub type WindowBounds = Rect;

impl Rect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }

    pub fn from_origin_size(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self {
            left: x,
            top: y,
            right: x.saturating_add(width.min(i32::MAX as u32) as i32),
            bottom: y.saturating_add(height.min(i32::MAX as u32) as i32),
        }
    }

    pub fn width(&self) -> i64 {
        self.right as i64 - self.left as i64
    }

    pub fn height(&self) -> i64 {
        self.bottom as i64 - self.top as i64
    }

    pub fn intersection_area(&self, other: &Rect) -> u64 {
        intersection_area(self, other)
    }
}

/// Overlap area of two rectangles; zero when they do not intersect.
pub fn intersection_area(a: &Rect, b: &Rect) -> u64 {
    let w = (a.right.min(b.right) as i64 - a.left.max(b.left) as i64).max(0);
    let h = (a.bottom.min(b.bottom) as i64 - a.top.max(b.top) as i64).max(0);
    w as u64 * h as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_rects_overlap_fully() {
        let r = Rect::new(0, 0, 1920, 1080);
        assert_eq!(intersection_area(&r, &r), 1920 * 1080);
    }

    #[test]
    fn partial_overlap() {
        let window = Rect::new(1800, 100, 2200, 500);
        let left = Rect::new(0, 0, 1920, 1080);
        let right = Rect::new(1920, 0, 3840, 1080);
        assert_eq!(intersection_area(&window, &left), 120 * 400);
        assert_eq!(intersection_area(&window, &right), 280 * 400);
    }

    #[test]
    fn disjoint_and_touching_are_zero() {
        let a = Rect::new(0, 0, 100, 100);
        assert_eq!(intersection_area(&a, &Rect::new(100, 0, 200, 100)), 0);
        assert_eq!(intersection_area(&a, &Rect::new(500, 500, 600, 600)), 0);
    }

    #[test]
    fn negative_coordinates() {
        let monitor = Rect::new(-2560, -200, 0, 1240);
        let window = Rect::new(-100, 0, 300, 200);
        assert_eq!(monitor.intersection_area(&window), 100 * 200);
    }

    #[test]
    fn extreme_bounds_do_not_overflow() {
        let huge = Rect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX);
        let expected = (u32::MAX as u64) * (u32::MAX as u64);
        assert_eq!(intersection_area(&huge, &huge), expected);
    }

    #[test]
    fn from_origin_size() {
        let r = Rect::from_origin_size(-10, 20, 100, 50);
        assert_eq!(r, Rect::new(-10, 20, 90, 70));
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 50);
    }
}
