use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio::{self, VideoCapture};

use super::{CaptureError, FrameSource};
use crate::config::{InputSource, Resolution};

/// OpenCV [VideoCapture] 封装，离开作用域时释放设备。
pub struct VideoSource {
    capture: VideoCapture,
    released: bool,
}

impl VideoSource {
    pub fn open(input: &InputSource, resolution: Resolution) -> Result<Self, CaptureError> {
        let capture = match input {
            InputSource::Device(index) => VideoCapture::new(*index, videoio::CAP_ANY)?,
            InputSource::File(path) => {
                let path = path
                    .to_str()
                    .ok_or_else(|| CaptureError::Open(path.display().to_string()))?;
                VideoCapture::from_file(path, videoio::CAP_ANY)?
            }
        };
        if !capture.is_opened()? {
            return Err(CaptureError::Open(input.to_string()));
        }

        let mut source = Self {
            capture,
            released: false,
        };
        source.set_resolution(resolution)?;
        log::info!("opened video source {} ({})", input, resolution);
        Ok(source)
    }

    fn set_resolution(&mut self, resolution: Resolution) -> Result<(), CaptureError> {
        let width_ok = self
            .capture
            .set(videoio::CAP_PROP_FRAME_WIDTH, resolution.width as f64)?;
        let height_ok = self
            .capture
            .set(videoio::CAP_PROP_FRAME_HEIGHT, resolution.height as f64)?;
        if !width_ok || !height_ok {
            log::warn!("backend refused resolution {}", resolution);
        }
        Ok(())
    }
}

impl FrameSource for VideoSource {
    fn read_frame(&mut self, index: usize) -> Result<Mat, CaptureError> {
        let mut frame = Mat::default();
        if self.released || !self.capture.read(&mut frame)? || frame.empty() {
            return Err(CaptureError::Read(index));
        }
        Ok(frame)
    }

    fn release(&mut self) -> Result<(), CaptureError> {
        if !self.released {
            self.released = true;
            self.capture.release()?;
            log::info!("video source released");
        }
        Ok(())
    }
}

impl Drop for VideoSource {
    fn drop(&mut self) {
        if let Err(e) = self.release() {
            log::warn!("failed to release video source: {}", e);
        }
    }
}
