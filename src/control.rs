//! 交互控制：显示窗口、按键状态机和采集循环

use opencv::{core::Mat, highgui};

use crate::capture::FrameSource;
use crate::collector::{CornerCollector, CornerDetector, PointPairCollection};
use crate::config::*;
use crate::overlay;
use crate::sampler::FrameSampler;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ControlState {
    #[default]
    Collecting,
    Calibrating,
    Quitting,
}

impl ControlState {
    /// 按键状态转移，只看键值的低 8 位；`wait_key` 超时返回的 -1 被忽略。
    pub fn on_key(self, key: i32) -> Self {
        match (self, (key & 0xFF) as u8) {
            (Self::Collecting, KEY_CALIBRATE) => Self::Calibrating,
            (Self::Collecting, KEY_QUIT) => Self::Quitting,
            (state, _) => state,
        }
    }
}

/// 图像显示与按键输入
pub trait FrameViewer {
    fn show(&mut self, frame: &Mat) -> opencv::Result<()>;
    /// 等待按键，`delay_ms` 为 0 时一直阻塞。
    fn wait_key(&mut self, delay_ms: i32) -> opencv::Result<i32>;
    fn close_all(&mut self) -> opencv::Result<()>;
}

pub struct HighguiViewer {
    window: String,
}

impl HighguiViewer {
    pub fn new(window: &str) -> opencv::Result<Self> {
        highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
        Ok(Self {
            window: window.to_string(),
        })
    }
}

impl FrameViewer for HighguiViewer {
    fn show(&mut self, frame: &Mat) -> opencv::Result<()> {
        highgui::imshow(&self.window, frame)
    }

    fn wait_key(&mut self, delay_ms: i32) -> opencv::Result<i32> {
        highgui::wait_key(delay_ms)
    }

    fn close_all(&mut self) -> opencv::Result<()> {
        highgui::destroy_all_windows()
    }
}

#[derive(Debug)]
pub struct CollectionResult {
    /// `Calibrating` 或 `Quitting`
    pub state: ControlState,
    /// 最后一帧显示的图像 (含角点和提示)
    pub last_frame: Mat,
}

/// 采集循环：读帧、抽帧、检测角点、显示并响应按键，直到按下 c 或 q。
///
/// 读帧失败直接返回错误。
pub fn run_collection<S, V, D>(
    source: &mut S,
    viewer: &mut V,
    collector: &mut CornerCollector<D>,
    sampler: &mut FrameSampler,
    pairs: &mut PointPairCollection,
    device: &str,
) -> anyhow::Result<CollectionResult>
where
    S: FrameSource,
    V: FrameViewer,
    D: CornerDetector,
{
    let mut state = ControlState::Collecting;
    loop {
        let (index, keep) = sampler.advance();
        let mut frame = source.read_frame(index)?;
        if !keep {
            continue;
        }

        log::info!("searching for chessboard corners in frame {}...", index);
        if collector.process(&mut frame, pairs) {
            log::info!("OK ({} views collected)", pairs.len());
        }

        overlay::draw_instructions(&mut frame, device)?;
        viewer.show(&frame)?;
        state = state.on_key(viewer.wait_key(KEY_WAIT_MS)?);
        if state != ControlState::Collecting {
            log::debug!("leaving collection loop: {:?}", state);
            return Ok(CollectionResult {
                state,
                last_frame: frame,
            });
        }
    }
}
