/// opencv
/// https://docs.rs/opencv/latest/opencv/all.html
///
/// nalgebra
/// https://docs.rs/nalgebra/latest/nalgebra/
///
/// 用法:
///   camcalib-rs -i /dev/video0 -grid 9x6 -o fisheye.yaml -framestep 20 -resolution 640x480 -fisheye
///
/// 手持标定板在镜头前变换位置，按 'c' 开始计算内参，按 'q' 退出。
extern crate opencv;

mod calibration;
mod capture;
mod collector;
mod config;
mod control;
mod mat_cast;
mod overlay;
mod sampler;
mod session;

use crate::capture::VideoSource;
use crate::collector::ChessboardDetector;
use crate::config::{Args, WINDOW_NAME};
use crate::control::HighguiViewer;
use crate::session::SessionOutcome;

fn main() {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .format_timestamp_nanos()
        .parse_default_env()
        .init();

    if let Err(e) = run() {
        log::error!("{:?}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let args = Args::parse_compat();
    log::info!("input: {}, grid: {}, framestep: {}", args.input, args.grid, args.framestep);

    let mut source = VideoSource::open(&args.input, args.resolution)?;
    let settings = args.into_settings();
    let mut viewer = HighguiViewer::new(WINDOW_NAME)?;
    let detector = ChessboardDetector::new()?;

    match session::run_session(&mut source, &mut viewer, detector, &settings)? {
        SessionOutcome::Saved(calibration) => log::info!(
            "{} calibration finished with {} views",
            calibration.intrinsics.model.as_str(),
            calibration.pair_count
        ),
        SessionOutcome::Failed(e) => log::info!("no camera parameters written: {}", e),
        SessionOutcome::Quit => {}
    }
    Ok(())
}
