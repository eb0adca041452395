//! 相机内参标定
//!
//! 根据收集到的点对，调用 OpenCV 的普通 (针孔) 或鱼眼模型求解内参。

mod intrinsics;
#[cfg(test)]
pub(crate) mod synthetic;

pub use intrinsics::CameraIntrinsics;

use opencv::{
    calib3d,
    core::{Mat, TermCriteria, TermCriteria_COUNT, TermCriteria_EPS, Vector, CV_64F},
    prelude::*,
};
use serde::Serialize;

use crate::collector::PointPairCollection;
use crate::config::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LensModel {
    /// 针孔模型 + 5 参数径向/切向畸变
    #[default]
    Pinhole,
    /// 鱼眼模型，4 个畸变参数
    Fisheye,
}

impl LensModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pinhole => "PINHOLE",
            Self::Fisheye => "FISHEYE",
        }
    }

    #[cfg(test)]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_uppercase().as_str() {
            "PINHOLE" => Some(Self::Pinhole),
            "FISHEYE" => Some(Self::Fisheye),
            _ => None,
        }
    }

    /// 畸变系数个数
    pub fn distortion_len(&self) -> usize {
        match self {
            Self::Pinhole => 5,
            Self::Fisheye => 4,
        }
    }

    /// 求解器的初值、标志位和终止条件
    pub fn solver_setup(&self, pair_count: usize) -> opencv::Result<SolverSetup> {
        match self {
            Self::Fisheye => {
                let mut rvecs = Vector::<Mat>::with_capacity(pair_count);
                let mut tvecs = Vector::<Mat>::with_capacity(pair_count);
                for _ in 0..pair_count {
                    rvecs.push(Mat::zeros(3, 1, CV_64F)?.to_mat()?);
                    tvecs.push(Mat::zeros(3, 1, CV_64F)?.to_mat()?);
                }
                Ok(SolverSetup {
                    camera_matrix: Mat::zeros(3, 3, CV_64F)?.to_mat()?,
                    dist_coeffs: Mat::zeros(self.distortion_len() as i32, 1, CV_64F)?.to_mat()?,
                    rvecs,
                    tvecs,
                    flags: calib3d::CALIB_RECOMPUTE_EXTRINSIC
                        | calib3d::CALIB_CHECK_COND
                        | calib3d::CALIB_FIX_SKEW,
                    criteria: TermCriteria::new(
                        TermCriteria_EPS + TermCriteria_COUNT,
                        FISHEYE_MAX_ITER,
                        FISHEYE_EPSILON,
                    )?,
                })
            }
            // 畸变参数留空，由 OpenCV 决定模型大小
            Self::Pinhole => Ok(SolverSetup {
                camera_matrix: Mat::default(),
                dist_coeffs: Mat::default(),
                rvecs: Vector::new(),
                tvecs: Vector::new(),
                flags: 0,
                criteria: TermCriteria::new(
                    TermCriteria_EPS + TermCriteria_COUNT,
                    PINHOLE_MAX_ITER,
                    f64::EPSILON,
                )?,
            }),
        }
    }
}

/// 一次求解的输入输出缓冲
#[derive(Debug)]
pub struct SolverSetup {
    pub camera_matrix: Mat,
    pub dist_coeffs: Mat,
    pub rvecs: Vector<Mat>,
    pub tvecs: Vector<Mat>,
    pub flags: i32,
    pub criteria: TermCriteria,
}

#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    #[error("less than {required} chessboard views detected ({found}), calibration failed")]
    InsufficientPairs { found: usize, required: usize },
    #[error("calibration did not converge (rms = {rms})")]
    NotConverged { rms: f64 },
    #[error("calibration solver failed: {0}")]
    Solver(#[from] opencv::Error),
}

#[derive(Debug, Clone)]
pub struct Calibration {
    pub intrinsics: CameraIntrinsics,
    /// 重投影误差 (RMS, 像素)
    pub rms: f64,
    pub pair_count: usize,
}

#[derive(Serialize)]
struct CalibrationSummary<'a> {
    model: LensModel,
    dim: [i32; 2],
    camera_matrix: [[f64; 3]; 3],
    dist_coeffs: &'a [f64],
    rms: f64,
    pairs: usize,
}

impl Calibration {
    pub fn summary_json(&self) -> serde_json::Result<String> {
        let k = &self.intrinsics.camera_matrix;
        let summary = CalibrationSummary {
            model: self.intrinsics.model,
            dim: [
                self.intrinsics.resolution.width,
                self.intrinsics.resolution.height,
            ],
            camera_matrix: [
                [k[(0, 0)], k[(0, 1)], k[(0, 2)]],
                [k[(1, 0)], k[(1, 1)], k[(1, 2)]],
                [k[(2, 0)], k[(2, 1)], k[(2, 2)]],
            ],
            dist_coeffs: &self.intrinsics.dist_coeffs,
            rms: self.rms,
            pairs: self.pair_count,
        };
        serde_json::to_string_pretty(&summary)
    }
}

/// 用全部点对求解内参。点对不足或求解失败时返回错误，不产生任何输出。
pub fn calibrate(
    pairs: &PointPairCollection,
    resolution: Resolution,
    model: LensModel,
) -> Result<Calibration, CalibrationError> {
    if pairs.len() < MIN_POINT_PAIRS {
        return Err(CalibrationError::InsufficientPairs {
            found: pairs.len(),
            required: MIN_POINT_PAIRS,
        });
    }

    let (object_points, image_points) = pairs.to_cv_vectors();
    let mut setup = model.solver_setup(pairs.len())?;
    log::info!(
        "running {} calibration on {} views",
        model.as_str(),
        pairs.len()
    );

    let rms = match model {
        LensModel::Fisheye => calib3d::fisheye_calibrate(
            &object_points,
            &image_points,
            resolution.size(),
            &mut setup.camera_matrix,
            &mut setup.dist_coeffs,
            &mut setup.rvecs,
            &mut setup.tvecs,
            setup.flags,
            setup.criteria,
        )?,
        LensModel::Pinhole => calib3d::calibrate_camera(
            &object_points,
            &image_points,
            resolution.size(),
            &mut setup.camera_matrix,
            &mut setup.dist_coeffs,
            &mut setup.rvecs,
            &mut setup.tvecs,
            setup.flags,
            setup.criteria,
        )?,
    };
    if !rms.is_finite() || rms <= 0.0 {
        return Err(CalibrationError::NotConverged { rms });
    }

    let intrinsics =
        CameraIntrinsics::from_mats(resolution, model, &setup.camera_matrix, &setup.dist_coeffs)?;
    Ok(Calibration {
        intrinsics,
        rms,
        pair_count: pairs.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refuses_too_few_pairs() {
        let views = synthetic::views(GridSize::new(9, 6), MIN_POINT_PAIRS - 1);
        let result = calibrate(&views, Resolution::new(640, 480), LensModel::Pinhole);
        match result {
            Err(CalibrationError::InsufficientPairs { found, required }) => {
                assert_eq!(found, 11);
                assert_eq!(required, 12);
            }
            other => panic!("unexpected result: {:?}", other),
        }

        let empty = PointPairCollection::new();
        assert!(matches!(
            calibrate(&empty, Resolution::new(640, 480), LensModel::Fisheye),
            Err(CalibrationError::InsufficientPairs { found: 0, .. })
        ));
    }

    #[test]
    fn test_fisheye_setup() {
        let setup = LensModel::Fisheye.solver_setup(14).unwrap();
        assert_eq!(setup.dist_coeffs.rows(), 4);
        assert_eq!(setup.dist_coeffs.cols(), 1);
        assert_eq!((setup.camera_matrix.rows(), setup.camera_matrix.cols()), (3, 3));
        assert_eq!(setup.rvecs.len(), 14);
        assert_eq!(setup.tvecs.len(), 14);

        assert_ne!(setup.flags & calib3d::CALIB_RECOMPUTE_EXTRINSIC, 0);
        assert_ne!(setup.flags & calib3d::CALIB_CHECK_COND, 0);
        assert_ne!(setup.flags & calib3d::CALIB_FIX_SKEW, 0);
        assert_eq!(setup.criteria.max_count, 30);
        assert_eq!(setup.criteria.epsilon, 1e-6);
    }

    #[test]
    fn test_pinhole_setup() {
        let setup = LensModel::Pinhole.solver_setup(14).unwrap();
        assert!(setup.dist_coeffs.empty());
        assert_eq!(setup.flags, 0);
        assert!(setup.rvecs.is_empty());
    }

    #[test]
    fn test_pinhole_calibration() {
        let views = synthetic::views(GridSize::new(9, 6), 15);
        let calibration = calibrate(&views, Resolution::new(640, 480), LensModel::Pinhole).unwrap();

        let k = calibration.intrinsics.camera_matrix;
        assert!((k[(0, 0)] - synthetic::FOCAL).abs() < 30.0, "fx = {}", k[(0, 0)]);
        assert!((k[(1, 1)] - synthetic::FOCAL).abs() < 30.0, "fy = {}", k[(1, 1)]);
        assert!((k[(0, 2)] - synthetic::CX).abs() < 30.0, "cx = {}", k[(0, 2)]);
        assert!((k[(1, 2)] - synthetic::CY).abs() < 30.0, "cy = {}", k[(1, 2)]);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(calibration.intrinsics.dist_coeffs.len(), 5);
        assert_eq!(calibration.intrinsics.model, LensModel::Pinhole);
        assert_eq!(calibration.pair_count, 15);
        assert!(calibration.rms > 0.0 && calibration.rms < 1.0, "rms = {}", calibration.rms);

        let json = calibration.summary_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["model"], "PINHOLE");
        assert_eq!(value["dim"], serde_json::json!([640, 480]));
        assert_eq!(value["pairs"], 15);
    }

    #[test]
    fn test_fisheye_calibration() {
        let views = synthetic::views(GridSize::new(9, 6), 15);
        let calibration = calibrate(&views, Resolution::new(640, 480), LensModel::Fisheye).unwrap();

        let k = calibration.intrinsics.camera_matrix;
        assert!((k[(0, 0)] - synthetic::FOCAL).abs() < 50.0, "fx = {}", k[(0, 0)]);
        assert!((k[(1, 1)] - synthetic::FOCAL).abs() < 50.0, "fy = {}", k[(1, 1)]);
        assert!((k[(0, 2)] - synthetic::CX).abs() < 40.0, "cx = {}", k[(0, 2)]);
        assert!((k[(1, 2)] - synthetic::CY).abs() < 40.0, "cy = {}", k[(1, 2)]);
        // CALIB_FIX_SKEW
        assert_eq!(k[(0, 1)], 0.0);
        assert_eq!(k[(2, 2)], 1.0);
        assert_eq!(calibration.intrinsics.model, LensModel::Fisheye);
        assert_eq!(calibration.intrinsics.dist_coeffs.len(), 4);
        assert!(calibration.intrinsics.dist_coeffs.iter().all(|d| d.is_finite()));
        assert!(calibration.rms > 0.0 && calibration.rms < 1.0, "rms = {}", calibration.rms);

        let json = calibration.summary_json().unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["model"], "FISHEYE");
        assert_eq!(value["dist_coeffs"].as_array().unwrap().len(), 4);
    }
}
