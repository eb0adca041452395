//! 测试用的合成标定板视图

use opencv::{
    calib3d,
    core::{Mat, Point2f, Vector},
};

use crate::collector::{PointPair, PointPairCollection};
use crate::config::GridSize;

pub const FOCAL: f64 = 600.0;
pub const CX: f64 = 320.0;
pub const CY: f64 = 240.0;

/// 第 `index` 个位姿下标定板角点的投影，带少量确定性噪声。
pub fn view_corners(grid: GridSize, index: usize) -> Vector<Point2f> {
    let a = index as f64 * 0.9;
    let rvec = Mat::from_slice_2d(&[
        [0.3 * a.sin()],
        [0.3 * (a * 1.3).cos()],
        [0.1 * (a * 0.7).sin()],
    ])
    .unwrap();
    let tvec = Mat::from_slice_2d(&[
        [-(grid.rows - 1) as f64 / 2.0 + 0.8 * a.cos()],
        [-(grid.cols - 1) as f64 / 2.0 + 0.6 * (a * 1.1).sin()],
        [16.0 + 2.0 * (a * 0.5).sin()],
    ])
    .unwrap();
    let camera_matrix =
        Mat::from_slice_2d(&[[FOCAL, 0.0, CX], [0.0, FOCAL, CY], [0.0, 0.0, 1.0]]).unwrap();
    let dist_coeffs = Mat::from_slice_2d(&[[0.0f64; 5]]).unwrap();

    let mut projected = Vector::<Point2f>::new();
    calib3d::project_points(
        &grid.reference_points(),
        &rvec,
        &tvec,
        &camera_matrix,
        &dist_coeffs,
        &mut projected,
        &mut Mat::default(),
        0.0,
    )
    .unwrap();

    projected
        .iter()
        .enumerate()
        .map(|(j, p)| {
            let noise = 0.05 * (((index * 31 + j * 17) % 7) as f32 / 3.0 - 1.0);
            Point2f::new(p.x + noise, p.y - noise)
        })
        .collect()
}

pub fn views(grid: GridSize, count: usize) -> PointPairCollection {
    let mut pairs = PointPairCollection::new();
    for i in 0..count {
        pairs.push(PointPair::new(grid.reference_points(), view_corners(grid, i)).unwrap());
    }
    pairs
}
