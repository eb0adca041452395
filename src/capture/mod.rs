//! 图像采集
//!
//! 相机或视频文件，统一通过 [FrameSource] 逐帧读取。
mod video;

pub use video::VideoSource;

use opencv::core::Mat;

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("cannot open video source {0}")]
    Open(String),
    #[error("cannot read frame {0} from video source")]
    Read(usize),
    #[error(transparent)]
    OpenCv(#[from] opencv::Error),
}

pub trait FrameSource {
    /// 阻塞读取下一帧，`index` 为从 0 开始的帧序号
    fn read_frame(&mut self, index: usize) -> Result<Mat, CaptureError>;
    /// 释放设备句柄，重复调用无副作用
    fn release(&mut self) -> Result<(), CaptureError>;
}
