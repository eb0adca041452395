//! 命令行参数与常量配置

use std::ffi::OsString;
use std::fmt::Display;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::str::FromStr;

use clap::Parser;
use opencv::core::{Point3f, Size, Vector};

use crate::calibration::LensModel;

/// 标定所需的最少有效帧数
pub const MIN_POINT_PAIRS: usize = 12;

/// 亚像素角点搜索窗口 (半径)
pub const SUBPIX_WIN_SIZE: i32 = 5;
pub const SUBPIX_MAX_ITER: i32 = 30;
pub const SUBPIX_EPSILON: f64 = 0.01;

/// 鱼眼模型的迭代终止条件
pub const FISHEYE_MAX_ITER: i32 = 30;
pub const FISHEYE_EPSILON: f64 = 1e-6;
/// 普通模型使用 OpenCV 的默认终止条件
pub const PINHOLE_MAX_ITER: i32 = 30;

/// 采集过程中每帧等待按键的时间 (ms)
pub const KEY_WAIT_MS: i32 = 1;
pub const WINDOW_NAME: &str = "corners";

/// 角点检测要求每边至少 3 个内角点
pub const MIN_GRID_SIDE: i32 = 3;
pub const MAX_GRID_CORNERS: usize = 10_000;

pub const KEY_CALIBRATE: u8 = b'c';
pub const KEY_QUIT: u8 = b'q';

/// 旧版单横线长参数，解析前改写为双横线形式。
const LEGACY_FLAGS: [&str; 6] = [
    "-input",
    "-grid",
    "-framestep",
    "-output",
    "-resolution",
    "-fisheye",
];

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("expected <a>x<b>, got {0:?}")]
    BadPair(String),
    #[error("{what} must be positive, got {value}")]
    NotPositive { what: &'static str, value: i32 },
    #[error("grid {0} too small, each side needs at least {min} inner corners", min = MIN_GRID_SIDE)]
    GridTooSmall(String),
    #[error("grid {0} has more than {max} inner corners", max = MAX_GRID_CORNERS)]
    GridTooLarge(String),
}

fn parse_pair(s: &str) -> Result<(i32, i32), ConfigError> {
    let bad = || ConfigError::BadPair(s.to_string());
    let (a, b) = s.split_once(['x', 'X']).ok_or_else(bad)?;
    let a = a.trim().parse::<i32>().map_err(|_| bad())?;
    let b = b.trim().parse::<i32>().map_err(|_| bad())?;
    Ok((a, b))
}

/// 标定板内角点数量
///
/// `rows` 为每一行的内角点数，即传给角点检测的图案宽度。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub rows: i32,
    pub cols: i32,
}

impl GridSize {
    #[cfg(test)]
    pub fn new(rows: i32, cols: i32) -> Self {
        Self { rows, cols }
    }

    pub fn pattern_size(&self) -> Size {
        Size::new(self.rows, self.cols)
    }

    pub fn corner_count(&self) -> usize {
        self.rows.max(0) as usize * self.cols.max(0) as usize
    }

    /// 标定板坐标系下的三维参考点 (z=0)，x 变化最快，与角点检测的输出顺序一致。
    pub fn reference_points(&self) -> Vector<Point3f> {
        let mut points = Vector::<Point3f>::with_capacity(self.corner_count());
        for y in 0..self.cols {
            for x in 0..self.rows {
                points.push(Point3f::new(x as f32, y as f32, 0.0));
            }
        }
        points
    }
}

impl FromStr for GridSize {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (rows, cols) = parse_pair(s)?;
        if rows < MIN_GRID_SIDE || cols < MIN_GRID_SIDE {
            return Err(ConfigError::GridTooSmall(format!("{}x{}", rows, cols)));
        }
        match rows.checked_mul(cols) {
            Some(count) if count as usize <= MAX_GRID_CORNERS => Ok(Self { rows, cols }),
            _ => Err(ConfigError::GridTooLarge(format!("{}x{}", rows, cols))),
        }
    }
}

impl Display for GridSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.rows, self.cols)
    }
}

/// 采集分辨率
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: i32,
    pub height: i32,
}

impl Resolution {
    #[cfg(test)]
    pub fn new(width: i32, height: i32) -> Self {
        Self { width, height }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (width, height) = parse_pair(s)?;
        if width <= 0 {
            return Err(ConfigError::NotPositive {
                what: "width",
                value: width,
            });
        }
        if height <= 0 {
            return Err(ConfigError::NotPositive {
                what: "height",
                value: height,
            });
        }
        Ok(Self { width, height })
    }
}

impl Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// 输入源：相机编号或视频文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    Device(i32),
    File(PathBuf),
}

impl FromStr for InputSource {
    type Err = ConfigError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.parse::<i32>() {
            Ok(index) => Self::Device(index),
            Err(_) => Self::File(PathBuf::from(s)),
        })
    }
}

impl Display for InputSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Device(index) => write!(f, "{}", index),
            Self::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Calibrate a camera from chessboard views.
///
/// Hold the board in front of the camera in varied poses, press 'c' to
/// compute the intrinsics or 'q' to quit.
#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Args {
    /// Input video file or camera device index.
    #[arg(short = 'i', long, default_value = "0")]
    pub input: InputSource,

    /// Inner corners of the chessboard (rows x cols).
    #[arg(long, default_value = "20x20")]
    pub grid: GridSize,

    /// Use every nth frame of the stream.
    #[arg(long, default_value_t = 20, value_parser = clap::value_parser!(u32).range(1..))]
    pub framestep: u32,

    /// Path of the output parameter file (.yaml, .xml or .json).
    #[arg(short = 'o', long, default_value = "camera_params.yaml")]
    pub output: PathBuf,

    /// Capture resolution (WxH).
    #[arg(long, default_value = "640x480")]
    pub resolution: Resolution,

    /// Calibrate with the fisheye lens model.
    #[arg(long)]
    pub fisheye: bool,
}

impl Args {
    /// 解析命令行，兼容 `-grid 9x6` 这类单横线长参数。
    pub fn parse_compat() -> Self {
        Self::parse_from(normalize_legacy_flags(std::env::args_os()))
    }

    pub fn lens_model(&self) -> LensModel {
        if self.fisheye {
            LensModel::Fisheye
        } else {
            LensModel::Pinhole
        }
    }

    pub fn into_settings(self) -> SessionSettings {
        let lens_model = self.lens_model();
        SessionSettings {
            device_label: self.input.to_string(),
            grid: self.grid,
            framestep: NonZeroUsize::new(self.framestep as usize).unwrap_or(NonZeroUsize::MIN),
            output: self.output,
            resolution: self.resolution,
            lens_model,
        }
    }
}

/// 把 `-grid` 改写为 `--grid`，`-grid=9x6` 同理；其余参数原样保留。
pub fn normalize_legacy_flags<I, T>(args: I) -> Vec<OsString>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    args.into_iter()
        .map(|arg| {
            let arg: OsString = arg.into();
            let Some(s) = arg.to_str() else {
                return arg;
            };
            let flag = s.split('=').next().unwrap_or(s);
            if LEGACY_FLAGS.contains(&flag) {
                OsString::from(format!("-{}", s))
            } else {
                arg
            }
        })
        .collect()
}

/// 一次标定会话所需的全部参数
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub device_label: String,
    pub grid: GridSize,
    pub framestep: NonZeroUsize,
    pub output: PathBuf,
    pub resolution: Resolution,
    pub lens_model: LensModel,
}
