//! 一次完整的标定会话：采集 → 标定 → 保存

use opencv::core::Mat;

use crate::calibration::{calibrate, Calibration, CalibrationError};
use crate::capture::FrameSource;
use crate::collector::{CornerCollector, CornerDetector, PointPairCollection};
use crate::config::SessionSettings;
use crate::control::{run_collection, CollectionResult, ControlState, FrameViewer};
use crate::overlay;
use crate::sampler::FrameSampler;

#[derive(Debug)]
pub enum SessionOutcome {
    /// 标定成功，参数已写入文件
    Saved(Calibration),
    /// 标定失败，未写文件
    Failed(CalibrationError),
    /// 用户按 q 退出
    Quit,
}

/// 显示结果并等待任意键
fn hold_result<V: FrameViewer>(viewer: &mut V, frame: &mut Mat, success: bool) -> anyhow::Result<()> {
    overlay::draw_result(frame, success)?;
    viewer.show(frame)?;
    viewer.wait_key(0)?;
    Ok(())
}

pub fn run_session<S, V, D>(
    source: &mut S,
    viewer: &mut V,
    detector: D,
    settings: &SessionSettings,
) -> anyhow::Result<SessionOutcome>
where
    S: FrameSource,
    V: FrameViewer,
    D: CornerDetector,
{
    let mut pairs = PointPairCollection::new();
    let mut collector = CornerCollector::new(detector, settings.grid);
    let mut sampler = FrameSampler::new(settings.framestep);

    let CollectionResult {
        state,
        mut last_frame,
    } = run_collection(
        source,
        viewer,
        &mut collector,
        &mut sampler,
        &mut pairs,
        &settings.device_label,
    )?;

    if state == ControlState::Quitting {
        source.release()?;
        viewer.close_all()?;
        log::info!("quit after {} frames, no calibration", sampler.frames_read());
        return Ok(SessionOutcome::Quit);
    }

    log::info!("performing calibration...");
    match calibrate(&pairs, settings.resolution, settings.lens_model) {
        Ok(calibration) => {
            calibration.intrinsics.write_to_file(&settings.output)?;
            log::info!(
                "successfully saved camera data to {} (rms {:.4})",
                settings.output.display(),
                calibration.rms
            );
            match calibration.summary_json() {
                Ok(json) => log::info!("{}", json),
                Err(e) => log::warn!("cannot format calibration summary: {}", e),
            }
            hold_result(viewer, &mut last_frame, true)?;
            Ok(SessionOutcome::Saved(calibration))
        }
        Err(e @ CalibrationError::InsufficientPairs { .. }) => {
            log::error!("{}", e);
            Ok(SessionOutcome::Failed(e))
        }
        Err(e) => {
            log::error!("{}", e);
            hold_result(viewer, &mut last_frame, false)?;
            Ok(SessionOutcome::Failed(e))
        }
    }
}
