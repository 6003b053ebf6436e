use crate::*;

pub const DEFAULT_SIZE: Size = Size {
    width: 200,
    height: 200,
};

const LAYOUT_COUNT: i32 = 5;
const LAYOUT_SPACING: i32 = 250;
const LAYOUT_OFFSET: i32 = 150;

/// A rectangle that follows the cursor while the cursor is inside it.
/// Only the center ever moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragRect {
    center: Point,
    size: Size,
}

impl DragRect {
    pub fn new(center: Point, size: Size) -> Self {
        Self { center, size }
    }

    pub fn with_default_size(center: Point) -> Self {
        Self::new(center, DEFAULT_SIZE)
    }

    pub fn center(&self) -> Point {
        self.center
    }

    pub fn size(&self) -> Size {
        self.size
    }

    pub fn top_left(&self) -> Point {
        Point::new(
            self.center.x - self.size.width / 2,
            self.center.y - self.size.height / 2,
        )
    }

    pub fn bounds(&self) -> Rect {
        Rect::from_point_size(self.top_left(), self.size)
    }

    /// Strict containment, so a cursor on an edge is outside.
    pub fn contains(&self, cursor: Point) -> bool {
        let (half_w, half_h) = (self.size.width / 2, self.size.height / 2);
        self.center.x - half_w < cursor.x
            && cursor.x < self.center.x + half_w
            && self.center.y - half_h < cursor.y
            && cursor.y < self.center.y + half_h
    }

    /// Snaps the center to `cursor` if the cursor is inside. Returns whether it moved.
    pub fn update(&mut self, cursor: Point) -> bool {
        if self.contains(cursor) {
            self.center = cursor;
            true
        } else {
            false
        }
    }
}

/// Five rectangles in a row along the top of the frame.
pub fn initial_layout() -> Vec<DragRect> {
    (0..LAYOUT_COUNT)
        .map(|n| {
            let center = Point::new(n * LAYOUT_SPACING + LAYOUT_OFFSET, LAYOUT_OFFSET);
            DragRect::with_default_size(center)
        })
        .collect()
}
