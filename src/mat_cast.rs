//! Mat 与 nalgebra 类型之间的转换
//!
//! 标定结果在 OpenCV 中以 [Mat] 表示，写文件和打印时转换为 nalgebra 类型。

use nalgebra::Matrix3;
use opencv::core::{Mat, StsBadSize, CV_64F};
use opencv::prelude::*;

fn bad_size(expected: &str, mat: &Mat) -> opencv::Error {
    opencv::Error::new(
        StsBadSize,
        format!("expected {}, got {}x{}", expected, mat.rows(), mat.cols()),
    )
}

/// 转换为 CV_64F，便于统一按 f64 读取。
fn as_f64(mat: &Mat) -> opencv::Result<Mat> {
    if mat.depth() == CV_64F {
        return Ok(mat.clone());
    }
    let mut out = Mat::default();
    mat.convert_to(&mut out, CV_64F, 1.0, 0.0)?;
    Ok(out)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix3d(pub Matrix3<f64>);

/// 将 [Mat] 转换为 [Matrix3]
impl TryFrom<&Mat> for Matrix3d {
    type Error = opencv::Error;
    fn try_from(mat: &Mat) -> opencv::Result<Self> {
        if mat.rows() != 3 || mat.cols() != 3 || mat.channels() != 1 {
            return Err(bad_size("3x3", mat));
        }
        let mat = as_f64(mat)?;
        let mut matrix = Matrix3::<f64>::zeros();
        for i in 0..3 {
            for j in 0..3 {
                matrix[(i, j)] = *mat.at_2d::<f64>(i as i32, j as i32)?;
            }
        }
        Ok(Matrix3d(matrix))
    }
}

impl Matrix3d {
    /// 将 [Matrix3] 转换为 [Mat]
    pub fn to_mat(&self) -> opencv::Result<Mat> {
        let mut mat = Mat::zeros(3, 3, CV_64F)?.to_mat()?;
        for i in 0..3 {
            for j in 0..3 {
                *mat.at_2d_mut::<f64>(i as i32, j as i32)? = self.0[(i, j)];
            }
        }
        Ok(mat)
    }
}

/// 行向量或列向量展开为 [Vec]
pub fn mat_to_vec(mat: &Mat) -> opencv::Result<Vec<f64>> {
    if mat.empty() {
        return Ok(Vec::new());
    }
    if (mat.rows() != 1 && mat.cols() != 1) || mat.channels() != 1 {
        return Err(bad_size("a 1xN or Nx1 vector", mat));
    }
    let mat = as_f64(mat)?;
    let mut values = Vec::with_capacity((mat.rows() * mat.cols()) as usize);
    for i in 0..mat.rows() {
        for j in 0..mat.cols() {
            values.push(*mat.at_2d::<f64>(i, j)?);
        }
    }
    Ok(values)
}

/// 生成 Nx1 的 CV_64F 列向量
pub fn vec_to_mat(values: &[f64]) -> opencv::Result<Mat> {
    let mut mat = Mat::zeros(values.len() as i32, 1, CV_64F)?.to_mat()?;
    for (i, v) in values.iter().enumerate() {
        *mat.at_2d_mut::<f64>(i as i32, 0)? = *v;
    }
    Ok(mat)
}

#[test]
fn test_mat_to_matrix() {
    let mat = Mat::from_slice_2d(&[[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 9.0]]).unwrap();
    let matrix = Matrix3d::try_from(&mat).unwrap();
    assert_eq!(matrix.0, Matrix3::new(1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0));

    let back = matrix.to_mat().unwrap();
    assert_eq!(*back.at_2d::<f64>(1, 2).unwrap(), 6.0);
    assert_eq!(Matrix3d::try_from(&back).unwrap(), matrix);
}

#[test]
fn test_matrix_rejects_wrong_shape() {
    let mat = Mat::from_slice_2d(&[[1.0, 0.0], [0.0, 1.0]]).unwrap();
    assert!(Matrix3d::try_from(&mat).is_err());
}

#[test]
fn test_mat_to_vec() {
    let column = Mat::from_slice_2d(&[[1.0f64], [2.0], [3.0]]).unwrap();
    assert_eq!(mat_to_vec(&column).unwrap(), vec![1.0, 2.0, 3.0]);

    let row = Mat::from_slice_2d(&[[640i32, 480]]).unwrap();
    assert_eq!(mat_to_vec(&row).unwrap(), vec![640.0, 480.0]);

    assert!(mat_to_vec(&Mat::default()).unwrap().is_empty());

    let mat = vec_to_mat(&[0.1, -0.2, 0.0, 0.0]).unwrap();
    assert_eq!(mat.rows(), 4);
    assert_eq!(mat_to_vec(&mat).unwrap(), vec![0.1, -0.2, 0.0, 0.0]);
}
