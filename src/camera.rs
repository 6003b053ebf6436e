use crate::*;

pub const DEFAULT_PROBE_COUNT: i32 = 3;

/// Tries indices `0..count` in order and keeps the first device that opens.
pub fn probe<C>(count: i32, mut open: impl FnMut(i32) -> Result<Option<C>>) -> Result<(i32, C)> {
    for index in 0..count {
        match open(index) {
            Ok(Some(device)) => return Ok((index, device)),
            Ok(None) => tracing::debug!(index, "camera did not open"),
            Err(err) => tracing::debug!(index, %err, "camera probe failed"),
        }
    }
    Err(Error::NoCamera { probed: count })
}

pub struct Camera {
    capture: videoio::VideoCapture,
    pub index: i32,
}

impl Camera {
    pub fn open_first(count: i32, width: i32, height: i32) -> Result<Self> {
        let (index, mut capture) = probe(count, |index| {
            let capture = videoio::VideoCapture::new(index, videoio::CAP_ANY)?;
            Ok(capture.is_opened()?.then_some(capture))
        })?;
        tracing::info!(index, "camera selected");

        capture.set(videoio::CAP_PROP_FRAME_WIDTH, width as f64)?;
        capture.set(videoio::CAP_PROP_FRAME_HEIGHT, height as f64)?;
        tracing::debug!(
            width = capture.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            height = capture.get(videoio::CAP_PROP_FRAME_HEIGHT)?,
            "capture size"
        );

        Ok(Self { capture, index })
    }

    /// `None` once the device stops delivering frames.
    pub fn read(&mut self) -> Result<Option<Mat>> {
        let mut frame = Mat::default();
        if !self.capture.read(&mut frame)? || frame.size()?.area() == 0 {
            return Ok(None);
        }
        Ok(Some(frame))
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        match self.capture.release() {
            Ok(()) => tracing::debug!(index = self.index, "camera released"),
            Err(err) => tracing::warn!(index = self.index, %err, "camera release failed"),
        }
    }
}

/// Flips around the vertical axis so the feed behaves like a mirror.
pub fn mirror(frame: &Mat) -> Result<Mat> {
    let mut mirrored = Mat::default();
    flip(frame, &mut mirrored, 1)?;
    Ok(mirrored)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_indices_fail() {
        let mut tried = Vec::new();
        let result = probe::<()>(DEFAULT_PROBE_COUNT, |index| {
            tried.push(index);
            Ok(None)
        });
        assert!(matches!(result, Err(Error::NoCamera { probed: 3 })));
        assert_eq!(tried, [0, 1, 2]);
    }

    #[test]
    fn first_open_wins() {
        let mut tried = Vec::new();
        let result = probe(DEFAULT_PROBE_COUNT, |index| {
            tried.push(index);
            Ok((index >= 1).then_some(index * 10))
        });
        assert_eq!(result.unwrap(), (1, 10));
        assert_eq!(tried, [0, 1]);
    }

    #[test]
    fn errors_count_as_closed() {
        let result = probe(DEFAULT_PROBE_COUNT, |index| match index {
            0 => Err(Error::OpenCv(opencv::Error::new(StsError, "busy"))),
            _ => Ok(Some("dev")),
        });
        assert_eq!(result.unwrap(), (1, "dev"));
    }

    #[test]
    fn no_camera_message() {
        let err = probe::<()>(3, |_| Ok(None)).unwrap_err();
        assert_eq!(err.to_string(), "no camera found: indices 0..3 all failed to open");
    }

    #[test]
    fn mirror_flips_columns() {
        let frame = Mat::from_slice_2d(&[[1u8, 2, 3], [4, 5, 6]]).unwrap();
        let mirrored = mirror(&frame).unwrap();
        assert_eq!(mirrored.to_vec_2d::<u8>().unwrap(), vec![vec![3, 2, 1], vec![6, 5, 4]]);
    }
}
