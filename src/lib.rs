pub mod app;
pub mod camera;
pub mod config;
pub mod detection;
pub mod drag;
pub mod error;
pub mod hand;
pub mod image;
pub mod palm;
pub mod render;
pub mod roi;
pub mod session;
pub mod window;

pub use std::{env, path};

pub use opencv::{core::*, prelude::*};
pub use opencv::{dnn, imgproc, videoio};

pub use error::{Error, Result};

/// Keeps OpenCV's own console output to errors; everything else goes through `tracing`.
pub fn quiet_opencv_logs() -> Result<()> {
    opencv::core::set_log_level(opencv::core::LogLevel::LOG_LEVEL_ERROR)?;
    Ok(())
}

pub trait SizeToArray {
    fn to_array(self) -> [f32; 2];
}

impl SizeToArray for Size {
    fn to_array(self) -> [f32; 2] {
        [self.width as _, self.height as _]
    }
}
