use clap::Parser;
use colors_transform::{Color, Rgb};

use crate::*;

/// Drag virtual rectangles around the webcam feed by pinching index and middle fingers.
#[derive(Parser, Debug, Clone)]
#[command(name = "pinch-drag", version)]
pub struct Config {
    /// Number of camera indices to probe, starting at 0
    #[arg(long, default_value_t = 3)]
    pub probe_count: i32,

    /// Requested capture width
    #[arg(long, default_value_t = 1280)]
    pub width: i32,

    /// Requested capture height
    #[arg(long, default_value_t = 720)]
    pub height: i32,

    /// Palm detection ONNX model
    #[arg(long, default_value = "data/palm_detection.onnx")]
    pub palm_model: path::PathBuf,

    /// Hand landmark ONNX model
    #[arg(long, default_value = "data/hand_landmark.onnx")]
    pub landmark_model: path::PathBuf,

    /// Minimum hand presence score
    #[arg(long, default_value_t = 0.8)]
    pub detection_confidence: f32,

    /// Fingertip distance (px) below which index and middle count as pinched
    #[arg(long, default_value_t = 30.)]
    pub pinch_threshold: f64,

    /// Weight of the camera frame when blending the overlay
    #[arg(long, default_value_t = 0.5)]
    pub alpha: f64,

    /// Rectangle fill color
    #[arg(long, default_value = "#ff00ff", value_parser = parse_color)]
    pub rect_color: Scalar,

    /// Corner marker color
    #[arg(long, default_value = "#00ff00", value_parser = parse_color)]
    pub corner_color: Scalar,
}

impl Default for Config {
    fn default() -> Self {
        Config::parse_from(["pinch-drag"])
    }
}

/// Parses a hex color into an OpenCV BGR scalar.
pub fn parse_color(hex: &str) -> Result<Scalar> {
    let rgb = Rgb::from_hex_str(hex)
        .map_err(|e| Error::InvalidColor(format!("{hex}: {}", e.message)))?;
    Ok(Scalar::new(
        rgb.get_blue() as f64,
        rgb.get_green() as f64,
        rgb.get_red() as f64,
        0.,
    ))
}
