use crate::drag::DragRect;
use crate::hand::{FingerSpan, Hand, Handedness, HAND_CONNECTIONS};
use crate::*;

pub const DEFAULT_ALPHA: f64 = 0.5;

const MAGENTA: (f64, f64, f64) = (255., 0., 255.);
const GREEN: (f64, f64, f64) = (0., 255., 0.);
const WHITE: (f64, f64, f64) = (255., 255., 255.);
const RED: (f64, f64, f64) = (0., 0., 255.);

const HAND_BOX_PADDING: i32 = 20;
const TIP_RADIUS: i32 = 15;

fn bgr((b, g, r): (f64, f64, f64)) -> Scalar {
    Scalar::new(b, g, r, 0.)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Style {
    pub rect_color: Scalar,
    pub corner_color: Scalar,
    pub corner_length: i32,
    pub corner_thickness: i32,
}

impl Default for Style {
    fn default() -> Self {
        Self {
            rect_color: bgr(MAGENTA),
            corner_color: bgr(GREEN),
            corner_length: 20,
            corner_thickness: 5,
        }
    }
}

/// A black canvas with the frame's size and type.
pub fn new_overlay(frame: &Mat) -> Result<Mat> {
    Ok(Mat::zeros_size(frame.size()?, frame.typ())?.to_mat()?)
}

pub fn draw_rects(overlay: &mut Mat, rects: &[DragRect], style: &Style) -> Result<()> {
    for rect in rects {
        let (center, size) = (rect.center(), rect.size());
        let top_left = rect.top_left();
        let bottom_right = Point::new(center.x + size.width / 2, center.y + size.height / 2);
        imgproc::rectangle_points(
            overlay,
            top_left,
            bottom_right,
            style.rect_color,
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )?;
        corner_rect(overlay, rect.bounds(), style)?;
    }
    Ok(())
}

/// Short L-shaped markers on the four corners of `bbox`.
pub fn corner_rect(img: &mut Mat, bbox: Rect, style: &Style) -> Result<()> {
    let l = style.corner_length;
    let (x, y) = (bbox.x, bbox.y);
    let (x1, y1) = (bbox.x + bbox.width, bbox.y + bbox.height);
    let corners = [(x, y, l, l), (x1, y, -l, l), (x, y1, l, -l), (x1, y1, -l, -l)];
    for (cx, cy, dx, dy) in corners {
        let corner = Point::new(cx, cy);
        for end in [Point::new(cx + dx, cy), Point::new(cx, cy + dy)] {
            imgproc::line(
                img,
                corner,
                end,
                style.corner_color,
                style.corner_thickness,
                imgproc::LINE_8,
                0,
            )?;
        }
    }
    Ok(())
}

/// Skeleton, landmark dots, a padded bounding box and the handedness label.
pub fn draw_hand(frame: &mut Mat, hand: &Hand) -> Result<()> {
    for (a, b) in HAND_CONNECTIONS {
        let (a, b) = (hand.landmarks[a].point(), hand.landmarks[b].point());
        imgproc::line(frame, a, b, bgr(WHITE), 2, imgproc::LINE_AA, 0)?;
    }
    for landmark in &hand.landmarks {
        imgproc::circle(frame, landmark.point(), 4, bgr(RED), imgproc::FILLED, imgproc::LINE_AA, 0)?;
    }

    let bounds = hand.bounds();
    let padded = Rect::new(
        bounds.x - HAND_BOX_PADDING,
        bounds.y - HAND_BOX_PADDING,
        bounds.width + 2 * HAND_BOX_PADDING,
        bounds.height + 2 * HAND_BOX_PADDING,
    );
    imgproc::rectangle(frame, padded, bgr(MAGENTA), 2, imgproc::LINE_8, 0)?;

    let label = match hand.handedness {
        Handedness::Left => "Left",
        Handedness::Right => "Right",
    };
    imgproc::put_text(
        frame,
        label,
        Point::new(bounds.x - 30, bounds.y - 30),
        imgproc::FONT_HERSHEY_PLAIN,
        2.,
        bgr(MAGENTA),
        2,
        imgproc::LINE_8,
        false,
    )?;
    Ok(())
}

/// The line between the two fingertips; the midpoint goes green while pinched.
pub fn draw_distance(frame: &mut Mat, span: &FingerSpan, pinched: bool) -> Result<()> {
    let color = bgr(MAGENTA);
    imgproc::circle(frame, span.index, TIP_RADIUS, color, imgproc::FILLED, imgproc::LINE_8, 0)?;
    imgproc::circle(frame, span.middle, TIP_RADIUS, color, imgproc::FILLED, imgproc::LINE_8, 0)?;
    imgproc::line(frame, span.index, span.middle, color, 3, imgproc::LINE_8, 0)?;
    let mid_color = if pinched { bgr(GREEN) } else { color };
    imgproc::circle(frame, span.midpoint(), TIP_RADIUS, mid_color, imgproc::FILLED, imgproc::LINE_8, 0)?;
    Ok(())
}

/// `alpha * frame + (1 - alpha) * overlay`, applied only to the overlay's
/// non-zero channels. Everything else keeps the frame's value.
pub fn blend(frame: &Mat, overlay: &Mat, alpha: f64) -> Result<Mat> {
    let mut blended = Mat::default();
    add_weighted(frame, alpha, overlay, 1. - alpha, 0., &mut blended, -1)?;

    let zeros = new_overlay(overlay)?;
    let mut mask = Mat::default();
    compare(overlay, &zeros, &mut mask, CMP_NE)?;

    let mut out = frame.try_clone()?;
    blended.copy_to_masked(&mut out, &mask)?;
    Ok(out)
}
