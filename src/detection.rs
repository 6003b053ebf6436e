//! Two-stage hand tracking through OpenCV's DNN module.
//!
//! A palm detector ([`PalmDetector`]) finds the hand and orients a square
//! crop around it; a MediaPipe-style landmark network then runs on that crop:
//! a 1x3x224x224 RGB input in [0, 1], and three outputs holding the 21
//! landmarks (x, y, z in crop pixels), a hand presence score and a handedness
//! score. While the hand stays visible the next crop comes from the previous
//! landmarks and the palm detector is skipped.

use crate::hand::{Hand, Handedness, Landmark, LandmarkDetector, LANDMARK_COUNT};
use crate::palm::{Palm, PalmDetector};
use crate::roi::Roi;
use crate::*;

pub const LANDMARK_INPUT_SIZE: i32 = 224;
pub const DEFAULT_CONFIDENCE: f32 = 0.8;

/// How a score output should be read.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ScoreKind {
    #[default]
    Probability,
    Logit,
}

impl ScoreKind {
    /// Decided once per output from its name and a value it produced.
    pub fn infer(name: &str, sample: f32) -> Self {
        if name.to_lowercase().contains("logit") || !(0. ..=1.).contains(&sample) {
            Self::Logit
        } else {
            Self::Probability
        }
    }

    pub fn probability(self, value: f32) -> f32 {
        match self {
            Self::Probability => value,
            Self::Logit => 1. / (1. + (-value).exp()),
        }
    }
}

/// Positions of the landmark, score and handedness tensors in the forward
/// outputs, and how to read the two scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputLayout {
    pub landmarks: usize,
    pub score: usize,
    pub handedness: usize,
    pub score_kind: ScoreKind,
    pub handedness_kind: ScoreKind,
}

impl OutputLayout {
    /// Picks outputs by name, falling back to declaration order.
    pub fn discover(names: &[String]) -> Self {
        let find = |keys: &[&str]| {
            names.iter().position(|name| {
                let name = name.to_lowercase();
                keys.iter().any(|key| name.contains(key))
            })
        };
        let landmarks = find(&["xyz", "landmark"]);
        let score = find(&["score", "flag", "presence"]);
        let handedness = find(&["handed", "lefthand", "righthand"]);
        let (landmarks, score, handedness) = match (landmarks, score, handedness) {
            (Some(landmarks), Some(score), Some(handedness))
                if landmarks != score && score != handedness && landmarks != handedness =>
            {
                (landmarks, score, handedness)
            }
            _ => (0, 1, 2),
        };
        Self {
            landmarks,
            score,
            handedness,
            score_kind: ScoreKind::default(),
            handedness_kind: ScoreKind::default(),
        }
    }
}

/// Reads one forward pass of the landmark network. `roi` is the frame region
/// the input crop was sampled from.
///
/// The network labels hands as seen by the camera; the frame is mirrored, so
/// the label is swapped to match what the user sees.
pub fn decode(outputs: &Vector<Mat>, layout: &OutputLayout, roi: &Roi, confidence: f32) -> Result<Option<Hand>> {
    let score = layout.score_kind.probability(first_value(&outputs.get(layout.score)?)?);
    if score < confidence {
        tracing::trace!(score, "no hand");
        return Ok(None);
    }

    let raw = outputs.get(layout.landmarks)?;
    let values = raw.data_typed::<f32>()?;
    if values.len() < LANDMARK_COUNT * 3 {
        return Err(Error::Model(format!(
            "landmark output holds {} values, expected {}",
            values.len(),
            LANDMARK_COUNT * 3
        )));
    }

    let side = LANDMARK_INPUT_SIZE as f32;
    let mut landmarks = [Landmark::default(); LANDMARK_COUNT];
    for (landmark, xyz) in landmarks.iter_mut().zip(values.chunks_exact(3)) {
        let point = roi.to_frame(xyz[0], xyz[1], side);
        *landmark = Landmark {
            x: point.x.round() as i32,
            y: point.y.round() as i32,
            z: xyz[2],
        };
    }

    let right = layout.handedness_kind.probability(first_value(&outputs.get(layout.handedness)?)?);
    let handedness = if right > 0.5 {
        Handedness::Left
    } else {
        Handedness::Right
    };

    Ok(Some(Hand {
        landmarks,
        score,
        handedness,
    }))
}

fn first_value(mat: &Mat) -> Result<f32> {
    mat.data_typed::<f32>()?
        .first()
        .copied()
        .ok_or_else(|| Error::Model("empty output tensor".to_string()))
}

pub struct HandLandmarkModel {
    net: dnn::Net,
    out_names: Vector<String>,
    layout: OutputLayout,
    confidence: f32,
}

impl HandLandmarkModel {
    pub fn load(model: &path::Path, confidence: f32) -> Result<Self> {
        if !model.exists() {
            return Err(Error::ModelNotFound(model.display().to_string()));
        }
        let mut net = dnn::read_net_from_onnx(&model.to_string_lossy())?;
        net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
        net.set_preferable_target(dnn::DNN_TARGET_CPU)?;

        let out_names = net.get_unconnected_out_layers_names()?;
        if out_names.len() < 3 {
            return Err(Error::Model(format!(
                "expected 3 outputs (landmarks, score, handedness), got {}",
                out_names.len()
            )));
        }
        let names = out_names.to_vec();
        let mut loaded = Self {
            net,
            out_names,
            layout: OutputLayout::discover(&names),
            confidence,
        };

        // One pass on a blank crop tells probabilities from logits.
        let blank = Mat::zeros(LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE, CV_8UC3)?.to_mat()?;
        let outputs = loaded.forward(&blank)?;
        let layout = &mut loaded.layout;
        layout.score_kind = ScoreKind::infer(&names[layout.score], first_value(&outputs.get(layout.score)?)?);
        layout.handedness_kind =
            ScoreKind::infer(&names[layout.handedness], first_value(&outputs.get(layout.handedness)?)?);

        tracing::info!(
            path = %model.display(),
            outputs = ?names,
            layout = ?loaded.layout,
            "loaded hand landmark model"
        );
        Ok(loaded)
    }

    fn forward(&mut self, crop: &Mat) -> Result<Vector<Mat>> {
        let blob = dnn::blob_from_image(
            crop,
            1. / 255.,
            Size::new(LANDMARK_INPUT_SIZE, LANDMARK_INPUT_SIZE),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1., Scalar::default())?;

        let mut outputs = Vector::<Mat>::new();
        self.net.forward(&mut outputs, &self.out_names)?;
        Ok(outputs)
    }
}

/// First stage: where is a palm.
pub trait PalmFinder {
    fn find_palm(&mut self, frame: &Mat) -> Result<Option<Palm>>;
}

impl PalmFinder for PalmDetector {
    fn find_palm(&mut self, frame: &Mat) -> Result<Option<Palm>> {
        self.detect(frame)
    }
}

/// Second stage: landmarks of the hand inside a region.
pub trait RoiLandmarks {
    fn detect_in(&mut self, frame: &Mat, roi: &Roi) -> Result<Option<Hand>>;
}

impl RoiLandmarks for HandLandmarkModel {
    fn detect_in(&mut self, frame: &Mat, roi: &Roi) -> Result<Option<Hand>> {
        let crop = roi.crop(frame, LANDMARK_INPUT_SIZE)?;
        let outputs = self.forward(&crop)?;
        decode(&outputs, &self.layout, roi, self.confidence)
    }
}

pub struct HandTracker<P = PalmDetector, L = HandLandmarkModel> {
    palm: P,
    landmarks: L,
    tracked: Option<Roi>,
}

impl HandTracker {
    pub fn load(palm_model: &path::Path, landmark_model: &path::Path, confidence: f32) -> Result<Self> {
        Ok(Self::new(
            PalmDetector::load(palm_model)?,
            HandLandmarkModel::load(landmark_model, confidence)?,
        ))
    }
}

impl<P: PalmFinder, L: RoiLandmarks> HandTracker<P, L> {
    pub fn new(palm: P, landmarks: L) -> Self {
        Self {
            palm,
            landmarks,
            tracked: None,
        }
    }

    pub fn is_tracking(&self) -> bool {
        self.tracked.is_some()
    }
}

impl<P: PalmFinder, L: RoiLandmarks> LandmarkDetector for HandTracker<P, L> {
    fn detect(&mut self, frame: &Mat) -> Result<Option<Hand>> {
        if let Some(roi) = self.tracked.take() {
            if let Some(hand) = self.landmarks.detect_in(frame, &roi)? {
                self.tracked = Some(Roi::from_landmarks(&hand.landmarks));
                return Ok(Some(hand));
            }
            tracing::debug!("lost hand, back to palm detection");
        }

        let Some(palm) = self.palm.find_palm(frame)? else {
            return Ok(None);
        };
        let roi = Roi::from_palm(palm.bbox, palm.wrist(), palm.middle_base());
        let hand = self.landmarks.detect_in(frame, &roi)?;
        self.tracked = hand.as_ref().map(|hand| Roi::from_landmarks(&hand.landmarks));
        Ok(hand)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::hand::tests::hand_with_tips;

    fn tensor(values: &[f32]) -> Mat {
        Mat::from_slice_2d(&[values]).unwrap()
    }

    fn outputs(landmarks: &[f32], score: f32, handedness: f32) -> Vector<Mat> {
        Vector::from_iter([tensor(landmarks), tensor(&[score]), tensor(&[handedness])])
    }

    fn layout() -> OutputLayout {
        OutputLayout::discover(&[])
    }

    fn frame_roi() -> Roi {
        Roi::full_frame(Size::new(1280, 720))
    }

    #[test]
    fn outputs_by_name() {
        let names: Vec<String> = ["hand_score", "lefthand_0_or_righthand_1", "xyz_x21"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let layout = OutputLayout::discover(&names);
        assert_eq!((layout.landmarks, layout.score, layout.handedness), (2, 0, 1));
        assert_eq!(layout.score_kind, ScoreKind::Probability);
    }

    #[test]
    fn outputs_fall_back_to_order() {
        let names: Vec<String> = ["Identity", "Identity_1", "Identity_2"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let layout = OutputLayout::discover(&names);
        assert_eq!((layout.landmarks, layout.score, layout.handedness), (0, 1, 2));
    }

    #[test]
    fn score_kind_from_name_or_range() {
        assert_eq!(ScoreKind::infer("Identity_1", 0.3), ScoreKind::Probability);
        assert_eq!(ScoreKind::infer("Identity_1", -7.5), ScoreKind::Logit);
        assert_eq!(ScoreKind::infer("Identity_1", 1.5), ScoreKind::Logit);
        assert_eq!(ScoreKind::infer("presence_logits", 0.3), ScoreKind::Logit);
    }

    #[test]
    fn score_kind_is_fixed_per_output() {
        // A logit of 0.9 must not be taken as a 90% probability.
        assert!((ScoreKind::Logit.probability(0.9) - 0.711).abs() < 1e-3);
        assert_eq!(ScoreKind::Probability.probability(0.9), 0.9);
        assert!((ScoreKind::Logit.probability(0.) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn low_score_is_no_hand() {
        let outputs = outputs(&[112.; 63], 0.5, 0.9);
        assert_eq!(decode(&outputs, &layout(), &frame_roi(), DEFAULT_CONFIDENCE).unwrap(), None);
    }

    #[test]
    fn logit_score_below_confidence() {
        let mut layout = layout();
        layout.score_kind = ScoreKind::Logit;
        let outputs = outputs(&[112.; 63], 0.9, 0.9);
        assert_eq!(decode(&outputs, &layout, &frame_roi(), DEFAULT_CONFIDENCE).unwrap(), None);
    }

    #[test]
    fn short_landmark_tensor() {
        let outputs = outputs(&[112.; 60], 0.95, 0.9);
        let result = decode(&outputs, &layout(), &frame_roi(), DEFAULT_CONFIDENCE);
        assert!(matches!(result, Err(Error::Model(_))));
    }

    #[test]
    fn crop_center_maps_to_frame_center() {
        let outputs = outputs(&[112.; 63], 0.95, 0.9);
        let hand = decode(&outputs, &layout(), &frame_roi(), DEFAULT_CONFIDENCE)
            .unwrap()
            .unwrap();
        assert_eq!(hand.score, 0.95);
        for landmark in hand.landmarks {
            assert_eq!((landmark.x, landmark.y), (640, 360));
            assert_eq!(landmark.z, 112.);
        }
    }

    #[test]
    fn rotated_crop_maps_back() {
        let roi = Roi {
            center: Point2f::new(400., 300.),
            size: 224.,
            rotation: std::f32::consts::FRAC_PI_2,
        };
        let mut values = [112.; 63];
        // right of the crop center is down in the frame
        values[0] = 212.;
        let outputs = outputs(&values, 0.95, 0.9);
        let hand = decode(&outputs, &layout(), &roi, DEFAULT_CONFIDENCE).unwrap().unwrap();
        assert_eq!((hand.landmarks[0].x, hand.landmarks[0].y), (400, 400));
        assert_eq!((hand.landmarks[1].x, hand.landmarks[1].y), (400, 300));
    }

    #[test]
    fn handedness_is_mirrored() {
        let mut layout = layout();
        layout.handedness_kind = ScoreKind::Logit;

        let hand = decode(&outputs(&[112.; 63], 0.95, 2.), &layout, &frame_roi(), DEFAULT_CONFIDENCE)
            .unwrap()
            .unwrap();
        assert_eq!(hand.handedness, Handedness::Left);

        let hand = decode(&outputs(&[112.; 63], 0.95, -2.), &layout, &frame_roi(), DEFAULT_CONFIDENCE)
            .unwrap()
            .unwrap();
        assert_eq!(hand.handedness, Handedness::Right);
    }

    #[test]
    fn missing_model() {
        let err = HandLandmarkModel::load(path::Path::new("no/such/model.onnx"), DEFAULT_CONFIDENCE);
        assert!(matches!(err, Err(Error::ModelNotFound(_))));
    }

    #[test]
    fn missing_palm_model() {
        let err = HandTracker::load(
            path::Path::new("no/such/palm.onnx"),
            path::Path::new("no/such/model.onnx"),
            DEFAULT_CONFIDENCE,
        );
        assert!(matches!(err, Err(Error::ModelNotFound(path)) if path.contains("palm")));
    }

    struct Palms(VecDeque<Option<Palm>>);

    impl PalmFinder for Palms {
        fn find_palm(&mut self, _: &Mat) -> Result<Option<Palm>> {
            Ok(self.0.pop_front().flatten())
        }
    }

    #[derive(Default)]
    struct Crops {
        hands: VecDeque<Option<Hand>>,
        seen: Vec<Roi>,
    }

    impl RoiLandmarks for Crops {
        fn detect_in(&mut self, _: &Mat, roi: &Roi) -> Result<Option<Hand>> {
            self.seen.push(*roi);
            Ok(self.hands.pop_front().flatten())
        }
    }

    fn upright_palm() -> Palm {
        let mut keypoints = [Point2f::default(); 7];
        keypoints[0] = Point2f::new(300., 400.);
        keypoints[2] = Point2f::new(300., 300.);
        Palm {
            score: 0.9,
            bbox: Rect2f::new(250., 300., 100., 100.),
            keypoints,
        }
    }

    #[test]
    fn palm_then_tracking() {
        let hand = hand_with_tips((300, 200), (320, 200));
        let palms = Palms(VecDeque::from([Some(upright_palm())]));
        let crops = Crops {
            hands: VecDeque::from([Some(hand.clone()), Some(hand.clone())]),
            ..Default::default()
        };
        let mut tracker = HandTracker::new(palms, crops);
        let frame = Mat::default();

        assert_eq!(tracker.detect(&frame).unwrap(), Some(hand.clone()));
        assert!(tracker.is_tracking());
        // second frame reuses the landmarks; the palm script is already empty
        assert_eq!(tracker.detect(&frame).unwrap(), Some(hand.clone()));

        let seen = &tracker.landmarks.seen;
        assert_eq!(seen.len(), 2);
        assert!((seen[0].size - 260.).abs() < 1e-3);
        assert_eq!(seen[1], Roi::from_landmarks(&hand.landmarks));
    }

    #[test]
    fn lost_track_falls_back_to_palm() {
        let hand = hand_with_tips((300, 200), (320, 200));
        let palms = Palms(VecDeque::from([Some(upright_palm()), None]));
        let crops = Crops {
            hands: VecDeque::from([Some(hand.clone()), None]),
            ..Default::default()
        };
        let mut tracker = HandTracker::new(palms, crops);
        let frame = Mat::default();

        assert!(tracker.detect(&frame).unwrap().is_some());
        assert_eq!(tracker.detect(&frame).unwrap(), None);
        assert!(!tracker.is_tracking());
        assert!(tracker.palm.0.is_empty());
    }

    #[test]
    fn no_palm_skips_landmarks() {
        let mut tracker = HandTracker::new(Palms(VecDeque::from([None])), Crops::default());
        assert_eq!(tracker.detect(&Mat::default()).unwrap(), None);
        assert!(tracker.landmarks.seen.is_empty());
    }
}
