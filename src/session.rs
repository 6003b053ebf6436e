use crate::camera::mirror;
use crate::config::Config;
use crate::drag::{initial_layout, DragRect};
use crate::hand::{FingerSpan, Hand, LandmarkDetector, Pinch, DEFAULT_PINCH_THRESHOLD};
use crate::render::{self, Style, DEFAULT_ALPHA};
use crate::*;

/// Everything the frame loop mutates, owned by the loop.
#[derive(Debug, Clone)]
pub struct Session {
    pub rects: Vec<DragRect>,
    pub pinch_threshold: f64,
    pub alpha: f64,
    pub style: Style,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            rects: initial_layout(),
            pinch_threshold: DEFAULT_PINCH_THRESHOLD,
            alpha: DEFAULT_ALPHA,
            style: Style::default(),
        }
    }
}

impl Session {
    pub fn from_config(config: &Config) -> Self {
        Self {
            pinch_threshold: config.pinch_threshold,
            alpha: config.alpha,
            style: Style {
                rect_color: config.rect_color,
                corner_color: config.corner_color,
                ..Style::default()
            },
            ..Self::default()
        }
    }

    /// Drags every rectangle under the cursor when the hand is pinching.
    /// Overlapping rectangles all snap to the same point.
    pub fn apply(&mut self, hand: Option<&Hand>) -> Option<Pinch> {
        let pinch = Pinch::from_hand(hand?, self.pinch_threshold)?;
        let moved = self
            .rects
            .iter_mut()
            .map(|rect| rect.update(pinch.cursor))
            .filter(|&moved| moved)
            .count();
        tracing::trace!(cursor = ?pinch.cursor, moved, "pinch");
        Some(pinch)
    }

    /// Mirrors, detects, updates, and returns the composited frame.
    pub fn step(&mut self, frame: &Mat, detector: &mut impl LandmarkDetector) -> Result<Mat> {
        let mut frame = mirror(frame)?;

        let hand = detector.detect(&frame)?;
        if let Some(hand) = &hand {
            render::draw_hand(&mut frame, hand)?;
            let span = FingerSpan::measure(hand);
            render::draw_distance(&mut frame, &span, span.is_pinched(self.pinch_threshold))?;
        }
        self.apply(hand.as_ref());

        let mut overlay = render::new_overlay(&frame)?;
        render::draw_rects(&mut overlay, &self.rects, &self.style)?;
        render::blend(&frame, &overlay, self.alpha)
    }
}
