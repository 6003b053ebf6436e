//! Palm detection: the first stage of the hand tracker.
//!
//! Runs a MediaPipe-style SSD palm detector (192×192 RGB input in [0, 1];
//! outputs 2016×18 box regressors and 2016 score logits) on the letterboxed
//! frame, decodes anchors, suppresses overlaps and keeps the best palm.

use crate::roi::Letterbox;
use crate::*;

pub const PALM_INPUT_SIZE: i32 = 192;
const PALM_SCORE_THRESHOLD: f32 = 0.5;
const PALM_NMS_THRESHOLD: f32 = 0.3;
const PALM_KEYPOINTS: usize = 7;
const PALM_VALUES: usize = 4 + 2 * PALM_KEYPOINTS;
const SCORE_CLIP: f32 = 100.;

/// (stride, anchors per cell) for each feature map.
const ANCHOR_LAYERS: [(i32, usize); 2] = [(8, 2), (16, 6)];

pub const WRIST_KEYPOINT: usize = 0;
pub const MIDDLE_BASE_KEYPOINT: usize = 2;

/// Anchor center, normalised to the model input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Anchor {
    pub x: f32,
    pub y: f32,
}

pub fn anchors(input: i32) -> Vec<Anchor> {
    let mut anchors = Vec::new();
    for (stride, per_cell) in ANCHOR_LAYERS {
        let cells = (input + stride - 1) / stride;
        for y in 0..cells {
            for x in 0..cells {
                let anchor = Anchor {
                    x: (x as f32 + 0.5) / cells as f32,
                    y: (y as f32 + 0.5) / cells as f32,
                };
                anchors.extend(std::iter::repeat(anchor).take(per_cell));
            }
        }
    }
    anchors
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Palm {
    pub score: f32,
    pub bbox: Rect2f,
    pub keypoints: [Point2f; PALM_KEYPOINTS],
}

impl Palm {
    pub fn wrist(&self) -> Point2f {
        self.keypoints[WRIST_KEYPOINT]
    }

    pub fn middle_base(&self) -> Point2f {
        self.keypoints[MIDDLE_BASE_KEYPOINT]
    }

    /// Applies `map` to every coordinate, e.g. to go from input to frame space.
    pub fn map(&self, map: impl Fn(f32, f32) -> (f32, f32)) -> Palm {
        let (x0, y0) = map(self.bbox.x, self.bbox.y);
        let (x1, y1) = map(self.bbox.x + self.bbox.width, self.bbox.y + self.bbox.height);
        let mut keypoints = self.keypoints;
        for keypoint in &mut keypoints {
            let (x, y) = map(keypoint.x, keypoint.y);
            *keypoint = Point2f::new(x, y);
        }
        Palm {
            score: self.score,
            bbox: Rect2f::new(x0, y0, x1 - x0, y1 - y0),
            keypoints,
        }
    }
}

fn sigmoid(value: f32) -> f32 {
    1. / (1. + (-value.clamp(-SCORE_CLIP, SCORE_CLIP)).exp())
}

/// Turns raw regressors and score logits into palms in input pixels.
pub fn decode_palms(boxes: &[f32], scores: &[f32], anchors: &[Anchor], input: i32) -> Result<Vec<Palm>> {
    if boxes.len() != anchors.len() * PALM_VALUES || scores.len() != anchors.len() {
        return Err(Error::Model(format!(
            "palm outputs hold {} boxes / {} scores, expected {} / {}",
            boxes.len(),
            scores.len(),
            anchors.len() * PALM_VALUES,
            anchors.len()
        )));
    }
    let side = input as f32;
    let palms = anchors
        .iter()
        .zip(boxes.chunks_exact(PALM_VALUES))
        .zip(scores)
        .filter_map(|((anchor, raw), &logit)| {
            let score = sigmoid(logit);
            if score < PALM_SCORE_THRESHOLD {
                return None;
            }
            let (cx, cy) = (raw[0] + anchor.x * side, raw[1] + anchor.y * side);
            let (w, h) = (raw[2], raw[3]);
            let mut keypoints = [Point2f::default(); PALM_KEYPOINTS];
            for (k, keypoint) in keypoints.iter_mut().enumerate() {
                *keypoint = Point2f::new(raw[4 + 2 * k] + anchor.x * side, raw[5 + 2 * k] + anchor.y * side);
            }
            Some(Palm {
                score,
                bbox: Rect2f::new(cx - w / 2., cy - h / 2., w, h),
                keypoints,
            })
        })
        .collect();
    Ok(palms)
}

fn iou(a: &Rect2f, b: &Rect2f) -> f32 {
    let x0 = a.x.max(b.x);
    let y0 = a.y.max(b.y);
    let x1 = (a.x + a.width).min(b.x + b.width);
    let y1 = (a.y + a.height).min(b.y + b.height);
    let inter = (x1 - x0).max(0.) * (y1 - y0).max(0.);
    let union = a.width * a.height + b.width * b.height - inter;
    if union <= 0. {
        0.
    } else {
        inter / union
    }
}

/// Highest score first; drops any palm overlapping a kept one.
pub fn nms(mut palms: Vec<Palm>, threshold: f32) -> Vec<Palm> {
    palms.sort_by(|a, b| b.score.total_cmp(&a.score));
    let mut kept: Vec<Palm> = Vec::new();
    for palm in palms {
        if kept.iter().all(|k| iou(&k.bbox, &palm.bbox) < threshold) {
            kept.push(palm);
        }
    }
    kept
}

pub struct PalmDetector {
    net: dnn::Net,
    out_names: Vector<String>,
    anchors: Vec<Anchor>,
}

impl PalmDetector {
    pub fn load(model: &path::Path) -> Result<Self> {
        if !model.exists() {
            return Err(Error::ModelNotFound(model.display().to_string()));
        }
        let mut net = dnn::read_net_from_onnx(&model.to_string_lossy())?;
        net.set_preferable_backend(dnn::DNN_BACKEND_OPENCV)?;
        net.set_preferable_target(dnn::DNN_TARGET_CPU)?;

        let out_names = net.get_unconnected_out_layers_names()?;
        if out_names.len() != 2 {
            return Err(Error::Model(format!(
                "palm detector needs 2 outputs (boxes, scores), got {}",
                out_names.len()
            )));
        }
        let anchors = anchors(PALM_INPUT_SIZE);
        tracing::info!(
            path = %model.display(),
            outputs = ?out_names.to_vec(),
            anchors = anchors.len(),
            "loaded palm detection model"
        );
        Ok(Self {
            net,
            out_names,
            anchors,
        })
    }

    /// Best palm in frame pixels, if any clears the score threshold.
    pub fn detect(&mut self, frame: &Mat) -> Result<Option<Palm>> {
        let letterbox = Letterbox::fit(frame.size()?, PALM_INPUT_SIZE);
        let padded = letterbox.apply(frame, PALM_INPUT_SIZE)?;
        let blob = dnn::blob_from_image(
            &padded,
            1. / 255.,
            Size::new(PALM_INPUT_SIZE, PALM_INPUT_SIZE),
            Scalar::default(),
            true,
            false,
            CV_32F,
        )?;
        self.net.set_input(&blob, "", 1., Scalar::default())?;
        let mut outputs = Vector::<Mat>::new();
        self.net.forward(&mut outputs, &self.out_names)?;

        // Tell boxes from scores by size; export order varies.
        let (first, second) = (outputs.get(0)?, outputs.get(1)?);
        let (boxes, scores) = if first.total() > second.total() {
            (first, second)
        } else {
            (second, first)
        };
        let palms = decode_palms(
            boxes.data_typed::<f32>()?,
            scores.data_typed::<f32>()?,
            &self.anchors,
            PALM_INPUT_SIZE,
        )?;

        let best = nms(palms, PALM_NMS_THRESHOLD).into_iter().next();
        if let Some(palm) = &best {
            tracing::trace!(score = palm.score, "palm");
        }
        Ok(best.map(|palm| palm.map(|x, y| letterbox.to_frame(x, y))))
    }
}
