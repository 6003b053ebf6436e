//! Frame ⇄ model-input geometry: the aspect-preserving letterbox used for the
//! palm detector, and the rotated square crop the landmark network runs on.

use std::f32::consts::{FRAC_PI_2, PI};

use crate::hand::Landmark;
use crate::*;

/// Maps between frame pixels and the square, padded model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Letterbox {
    pub scale: f32,
    pub resized: Size,
    pub pad_x: i32,
    pub pad_y: i32,
}

impl Letterbox {
    pub fn fit(frame: Size, input: i32) -> Self {
        let scale = input as f32 / frame.width.max(frame.height).max(1) as f32;
        let resized = Size::new(
            ((frame.width as f32 * scale).round() as i32).clamp(1, input),
            ((frame.height as f32 * scale).round() as i32).clamp(1, input),
        );
        Self {
            scale,
            resized,
            pad_x: (input - resized.width) / 2,
            pad_y: (input - resized.height) / 2,
        }
    }

    pub fn to_input(&self, x: f32, y: f32) -> (f32, f32) {
        (
            x * self.scale + self.pad_x as f32,
            y * self.scale + self.pad_y as f32,
        )
    }

    pub fn to_frame(&self, x: f32, y: f32) -> (f32, f32) {
        (
            (x - self.pad_x as f32) / self.scale,
            (y - self.pad_y as f32) / self.scale,
        )
    }

    pub fn apply(&self, frame: &Mat, input: i32) -> Result<Mat> {
        let mut resized = Mat::default();
        imgproc::resize(frame, &mut resized, self.resized, 0., 0., imgproc::INTER_LINEAR)?;
        let mut padded = Mat::default();
        copy_make_border(
            &resized,
            &mut padded,
            self.pad_y,
            input - self.resized.height - self.pad_y,
            self.pad_x,
            input - self.resized.width - self.pad_x,
            BORDER_CONSTANT,
            Scalar::default(),
        )?;
        Ok(padded)
    }
}

const PALM_ROI_SCALE: f32 = 2.6;
const PALM_ROI_SHIFT_Y: f32 = -0.5;
const LANDMARK_ROI_SCALE: f32 = 2.0;
const LANDMARK_ROI_SHIFT_Y: f32 = -0.1;

/// Landmarks that outline the palm and finger bases; fingertips are left out
/// so a curled finger does not shrink the next crop.
const ROI_LANDMARKS: [usize; 12] = [0, 1, 2, 3, 5, 6, 9, 10, 13, 14, 17, 18];

/// A square region of the frame, rotated so the hand points up inside it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Roi {
    pub center: Point2f,
    /// Side length in frame pixels.
    pub size: f32,
    /// Clockwise rotation in radians (image y axis points down).
    pub rotation: f32,
}

impl Roi {
    /// The whole frame, padded to a square around its center.
    pub fn full_frame(frame: Size) -> Self {
        Self {
            center: Point2f::new(frame.width as f32 / 2., frame.height as f32 / 2.),
            size: frame.width.max(frame.height) as f32,
            rotation: 0.,
        }
    }

    /// Grows a palm box into a crop covering the whole hand. `wrist` and
    /// `middle_base` orient the crop.
    pub fn from_palm(bbox: Rect2f, wrist: Point2f, middle_base: Point2f) -> Self {
        let rotation = hand_rotation(wrist, middle_base);
        let center = Point2f::new(bbox.x + bbox.width / 2., bbox.y + bbox.height / 2.);
        transformed(center, bbox.width, bbox.height, rotation, PALM_ROI_SCALE, PALM_ROI_SHIFT_Y)
    }

    /// The crop to track a hand into the next frame.
    pub fn from_landmarks(landmarks: &[Landmark]) -> Self {
        let point = |idx: usize| Point2f::new(landmarks[idx].x as f32, landmarks[idx].y as f32);
        let rotation = hand_rotation(point(0), point(9));
        let (sin, cos) = rotation.sin_cos();

        let (mut lo, mut hi) = (Point2f::new(f32::MAX, f32::MAX), Point2f::new(f32::MIN, f32::MIN));
        for idx in ROI_LANDMARKS {
            let p = point(idx);
            let (x, y) = (p.x * cos + p.y * sin, -p.x * sin + p.y * cos);
            lo = Point2f::new(lo.x.min(x), lo.y.min(y));
            hi = Point2f::new(hi.x.max(x), hi.y.max(y));
        }
        let (mx, my) = ((lo.x + hi.x) / 2., (lo.y + hi.y) / 2.);
        let center = Point2f::new(mx * cos - my * sin, mx * sin + my * cos);
        transformed(
            center,
            hi.x - lo.x,
            hi.y - lo.y,
            rotation,
            LANDMARK_ROI_SCALE,
            LANDMARK_ROI_SHIFT_Y,
        )
    }

    /// Position in the frame of pixel (`u`, `v`) of a `side`×`side` crop.
    pub fn to_frame(&self, u: f32, v: f32, side: f32) -> Point2f {
        let (dx, dy) = ((u / side - 0.5) * self.size, (v / side - 0.5) * self.size);
        let (sin, cos) = self.rotation.sin_cos();
        Point2f::new(
            self.center.x + dx * cos - dy * sin,
            self.center.y + dx * sin + dy * cos,
        )
    }

    /// Samples the region into a `side`×`side` image, black outside the frame.
    pub fn crop(&self, frame: &Mat, side: i32) -> Result<Mat> {
        let s = side as f32;
        let src = Vector::<Point2f>::from_iter([
            self.to_frame(0., 0., s),
            self.to_frame(s, 0., s),
            self.to_frame(0., s, s),
        ]);
        let dst = Vector::<Point2f>::from_iter([
            Point2f::new(0., 0.),
            Point2f::new(s, 0.),
            Point2f::new(0., s),
        ]);
        let transform = imgproc::get_affine_transform(&src, &dst)?;
        let mut crop = Mat::default();
        imgproc::warp_affine(
            frame,
            &mut crop,
            &transform,
            Size::new(side, side),
            imgproc::INTER_LINEAR,
            BORDER_CONSTANT,
            Scalar::default(),
        )?;
        Ok(crop)
    }
}

/// Rotation that turns the wrist → middle-finger direction upright.
fn hand_rotation(wrist: Point2f, middle_base: Point2f) -> f32 {
    let angle = (-(middle_base.y - wrist.y)).atan2(middle_base.x - wrist.x);
    normalize_radians(FRAC_PI_2 - angle)
}

fn normalize_radians(angle: f32) -> f32 {
    angle - 2. * PI * ((angle + PI) / (2. * PI)).floor()
}

/// Shifts along the rotated y axis by `shift_y` heights, then squares to the
/// long side and scales.
fn transformed(center: Point2f, width: f32, height: f32, rotation: f32, scale: f32, shift_y: f32) -> Roi {
    let (sin, cos) = rotation.sin_cos();
    Roi {
        center: Point2f::new(
            center.x - height * shift_y * sin,
            center.y + height * shift_y * cos,
        ),
        size: width.max(height) * scale,
        rotation,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hand::LANDMARK_COUNT;

    fn close(a: Point2f, b: Point2f) -> bool {
        (a.x - b.x).abs() < 1e-3 && (a.y - b.y).abs() < 1e-3
    }

    #[test]
    fn letterbox_landscape() {
        let letterbox = Letterbox::fit(Size::new(1280, 720), 224);
        assert_eq!(letterbox.resized, Size::new(224, 126));
        assert_eq!(letterbox.pad_x, 0);
        assert_eq!(letterbox.pad_y, 49);
    }

    #[test]
    fn letterbox_portrait() {
        let letterbox = Letterbox::fit(Size::new(480, 640), 224);
        assert_eq!(letterbox.resized, Size::new(168, 224));
        assert_eq!((letterbox.pad_x, letterbox.pad_y), (28, 0));
    }

    #[test]
    fn letterbox_roundtrip() {
        let letterbox = Letterbox::fit(Size::new(1280, 720), 192);
        for (x, y) in [(0., 0.), (640., 360.), (1279., 719.), (150., 150.)] {
            let (ix, iy) = letterbox.to_input(x, y);
            assert!((0. ..=192.).contains(&ix) && (0. ..=192.).contains(&iy));
            let (fx, fy) = letterbox.to_frame(ix, iy);
            assert!((fx - x).abs() < 1e-2, "{fx} vs {x}");
            assert!((fy - y).abs() < 1e-2, "{fy} vs {y}");
        }
    }

    #[test]
    fn full_frame_center() {
        let roi = Roi::full_frame(Size::new(1280, 720));
        assert!(close(roi.to_frame(112., 112., 224.), Point2f::new(640., 360.)));
        assert!(close(roi.to_frame(0., 0., 224.), Point2f::new(0., -280.)));
    }

    #[test]
    fn upright_palm() {
        let roi = Roi::from_palm(
            Rect2f::new(50., 100., 100., 100.),
            Point2f::new(100., 200.),
            Point2f::new(100., 100.),
        );
        assert!(roi.rotation.abs() < 1e-6);
        assert!(close(roi.center, Point2f::new(100., 100.)));
        assert!((roi.size - 260.).abs() < 1e-3);
    }

    #[test]
    fn sideways_palm_shifts_toward_fingers() {
        let roi = Roi::from_palm(
            Rect2f::new(50., 50., 100., 100.),
            Point2f::new(100., 100.),
            Point2f::new(200., 100.),
        );
        assert!((roi.rotation - FRAC_PI_2).abs() < 1e-5);
        assert!(close(roi.center, Point2f::new(150., 100.)));
        // top edge of the crop faces the fingers
        let top = roi.to_frame(112., 0., 224.);
        assert!(close(top, Point2f::new(150. + 130., 100.)));
    }

    #[test]
    fn landmarks_roi_is_upright_square() {
        let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
        for (n, landmark) in landmarks.iter_mut().enumerate() {
            let col = (n % 5) as i32;
            *landmark = Landmark { x: 100 + col * 20, y: 300 - (n as i32) * 5, z: 0. };
        }
        landmarks[0] = Landmark { x: 140, y: 300, z: 0. };
        landmarks[9] = Landmark { x: 140, y: 200, z: 0. };

        let roi = Roi::from_landmarks(&landmarks);
        assert!(roi.rotation.abs() < 1e-6);
        assert!(roi.size > 0.);
        assert!(roi.center.x > 100. && roi.center.x < 200.);
    }

    #[test]
    fn radians_wrap() {
        assert!((normalize_radians(3. * PI / 2.) + PI / 2.).abs() < 1e-5);
        assert!((normalize_radians(0.25) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn crop_samples_region() {
        let mut frame = Mat::new_rows_cols_with_default(100, 100, CV_8UC3, Scalar::all(0.)).unwrap();
        imgproc::rectangle(
            &mut frame,
            Rect::new(40, 40, 20, 20),
            Scalar::all(255.),
            imgproc::FILLED,
            imgproc::LINE_8,
            0,
        )
        .unwrap();
        let roi = Roi { center: Point2f::new(50., 50.), size: 20., rotation: 0. };
        let crop = roi.crop(&frame, 10).unwrap();
        assert_eq!(crop.size().unwrap(), Size::new(10, 10));
        assert_eq!(*crop.at_2d::<Vec3b>(5, 5).unwrap(), Vec3b::from([255, 255, 255]));
    }
}
