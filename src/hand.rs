//! Hand landmarks and the pinch gesture built on top of them.
//!
//! Landmarks follow the MediaPipe 21-point hand convention and are expressed
//! in pixel coordinates of the (mirrored) frame they were detected in.

use crate::*;

pub const LANDMARK_COUNT: usize = 21;

pub const INDEX_FINGER_TIP: usize = 8;
pub const MIDDLE_FINGER_TIP: usize = 12;

/// Bones of the hand skeleton, as landmark index pairs.
#[rustfmt::skip]
pub const HAND_CONNECTIONS: [(usize, usize); 21] = [
    (0, 1), (1, 2), (2, 3), (3, 4),
    (0, 5), (5, 6), (6, 7), (7, 8),
    (5, 9), (9, 10), (10, 11), (11, 12),
    (9, 13), (13, 14), (14, 15), (15, 16),
    (13, 17), (17, 18), (18, 19), (19, 20),
    (0, 17),
];

pub const DEFAULT_PINCH_THRESHOLD: f64 = 30.;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Landmark {
    pub x: i32,
    pub y: i32,
    /// Depth relative to the wrist, in model units.
    pub z: f32,
}

impl Landmark {
    pub fn point(&self) -> Point {
        Point::new(self.x, self.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Left,
    Right,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Hand {
    pub landmarks: [Landmark; LANDMARK_COUNT],
    pub score: f32,
    pub handedness: Handedness,
}

impl Hand {
    pub fn index_tip(&self) -> Point {
        self.landmarks[INDEX_FINGER_TIP].point()
    }

    pub fn middle_tip(&self) -> Point {
        self.landmarks[MIDDLE_FINGER_TIP].point()
    }

    pub fn bounds(&self) -> Rect {
        let xs = self.landmarks.iter().map(|l| l.x);
        let ys = self.landmarks.iter().map(|l| l.y);
        let (x0, x1) = (xs.clone().min().unwrap_or(0), xs.max().unwrap_or(0));
        let (y0, y1) = (ys.clone().min().unwrap_or(0), ys.max().unwrap_or(0));
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// Anything that can find at most one hand in a BGR frame.
pub trait LandmarkDetector {
    fn detect(&mut self, frame: &Mat) -> Result<Option<Hand>>;
}

impl<D: LandmarkDetector + ?Sized> LandmarkDetector for Box<D> {
    fn detect(&mut self, frame: &Mat) -> Result<Option<Hand>> {
        (**self).detect(frame)
    }
}

pub fn find_distance(p1: Point, p2: Point) -> f64 {
    ((p2.x - p1.x) as f64).hypot((p2.y - p1.y) as f64)
}

/// Index and middle fingertips measured against each other.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerSpan {
    pub index: Point,
    pub middle: Point,
    pub distance: f64,
}

impl FingerSpan {
    pub fn measure(hand: &Hand) -> Self {
        let (index, middle) = (hand.index_tip(), hand.middle_tip());
        Self {
            index,
            middle,
            distance: find_distance(index, middle),
        }
    }

    pub fn midpoint(&self) -> Point {
        Point::new(
            (self.index.x + self.middle.x) / 2,
            (self.index.y + self.middle.y) / 2,
        )
    }

    pub fn is_pinched(&self, threshold: f64) -> bool {
        self.distance < threshold
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pinch {
    pub cursor: Point,
}

impl Pinch {
    pub fn from_hand(hand: &Hand, threshold: f64) -> Option<Self> {
        let span = FingerSpan::measure(hand);
        span.is_pinched(threshold).then_some(Pinch { cursor: span.index })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub fn hand_with_tips(index: (i32, i32), middle: (i32, i32)) -> Hand {
        let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
        landmarks[INDEX_FINGER_TIP] = Landmark { x: index.0, y: index.1, z: 0. };
        landmarks[MIDDLE_FINGER_TIP] = Landmark { x: middle.0, y: middle.1, z: 0. };
        Hand {
            landmarks,
            score: 0.95,
            handedness: Handedness::Right,
        }
    }

    #[test]
    fn distance_is_euclidean() {
        assert_eq!(find_distance(Point::new(0, 0), Point::new(3, 4)), 5.);
        assert_eq!(find_distance(Point::new(7, 7), Point::new(7, 7)), 0.);
    }

    #[test]
    fn close_fingers_pinch_at_index_tip() {
        let hand = hand_with_tips((200, 180), (210, 190));
        assert_eq!(
            Pinch::from_hand(&hand, DEFAULT_PINCH_THRESHOLD),
            Some(Pinch { cursor: Point::new(200, 180) })
        );
    }

    #[test]
    fn threshold_is_exclusive() {
        let hand = hand_with_tips((0, 0), (18, 24));
        assert_eq!(FingerSpan::measure(&hand).distance, 30.);
        assert_eq!(Pinch::from_hand(&hand, DEFAULT_PINCH_THRESHOLD), None);
    }

    #[test]
    fn spread_fingers_do_not_pinch() {
        let hand = hand_with_tips((100, 100), (160, 100));
        assert_eq!(Pinch::from_hand(&hand, DEFAULT_PINCH_THRESHOLD), None);
    }

    #[test]
    fn span_midpoint() {
        let span = FingerSpan::measure(&hand_with_tips((10, 20), (30, 40)));
        assert_eq!(span.midpoint(), Point::new(20, 30));
    }

    #[test]
    fn connections_stay_in_range() {
        for (a, b) in HAND_CONNECTIONS {
            assert!(a < LANDMARK_COUNT && b < LANDMARK_COUNT);
        }
    }

    #[test]
    fn bounds_cover_landmarks() {
        let hand = hand_with_tips((50, 80), (120, 10));
        assert_eq!(hand.bounds(), Rect::new(0, 0, 120, 80));
    }
}
