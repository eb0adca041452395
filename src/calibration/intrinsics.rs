use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use nalgebra::Matrix3;
use opencv::core::{FileStorage, FileStorage_Mode, Mat};
use opencv::prelude::*;

use super::LensModel;
use crate::config::Resolution;
use crate::mat_cast::{mat_to_vec, vec_to_mat, Matrix3d};

/// 标定结果：分辨率、内参矩阵和畸变系数
#[derive(Debug, Clone, PartialEq)]
pub struct CameraIntrinsics {
    pub model: LensModel,
    pub resolution: Resolution,
    pub camera_matrix: Matrix3<f64>,
    pub dist_coeffs: Vec<f64>,
}

fn path_str(path: &Path) -> anyhow::Result<&str> {
    path.to_str()
        .ok_or_else(|| anyhow!("path is not valid utf-8: {}", path.display()))
}

/// 同目录下的临时文件 `.<name>`，保留扩展名以便 FileStorage 按扩展名选择格式。
fn staged_path(path: &Path) -> anyhow::Result<PathBuf> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("not a file path: {}", path.display()))?;
    let mut staged = OsString::from(".");
    staged.push(name);
    Ok(path.with_file_name(staged))
}

fn write_storage<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut FileStorage) -> anyhow::Result<()>,
{
    let mut fs = FileStorage::new(path_str(path)?, FileStorage_Mode::WRITE as i32, "utf-8")?;
    if !fs.is_opened()? {
        bail!("cannot open {} for writing", path.display());
    }
    write(&mut fs)?;
    fs.release()?;
    Ok(())
}

/// 先写临时文件，全部写完后再替换 `path`；失败时 `path` 保持原样。
fn write_file_staged<F>(path: &Path, write: F) -> anyhow::Result<()>
where
    F: FnOnce(&mut FileStorage) -> anyhow::Result<()>,
{
    let staged = staged_path(path)?;
    if let Err(e) = write_storage(&staged, write) {
        if staged.exists() {
            if let Err(remove_err) = std::fs::remove_file(&staged) {
                log::warn!("cannot remove {}: {}", staged.display(), remove_err);
            }
        }
        return Err(e);
    }
    std::fs::rename(&staged, path)
        .with_context(|| format!("cannot move {} to {}", staged.display(), path.display()))
}

impl CameraIntrinsics {
    pub fn from_mats(
        resolution: Resolution,
        model: LensModel,
        camera_matrix: &Mat,
        dist_coeffs: &Mat,
    ) -> opencv::Result<Self> {
        Ok(Self {
            model,
            resolution,
            camera_matrix: Matrix3d::try_from(camera_matrix)?.0,
            dist_coeffs: mat_to_vec(dist_coeffs)?,
        })
    }

    /// 写入 OpenCV FileStorage 文件，格式由扩展名决定 (.yaml/.yml/.xml/.json)。
    /// 写出失败时不会留下不完整的文件。
    pub fn write_to_file(&self, path: &Path) -> anyhow::Result<()> {
        let dim = Mat::from_slice_2d(&[[self.resolution.width], [self.resolution.height]])?;
        let camera_matrix = Matrix3d(self.camera_matrix).to_mat()?;
        let dist_coeffs = vec_to_mat(&self.dist_coeffs)?;

        write_file_staged(path, |fs| {
            fs.write_str("model_type", self.model.as_str())?;
            fs.write_mat("dim", &dim)?;
            fs.write_mat("camera_matrix", &camera_matrix)?;
            fs.write_mat("dist_coeffs", &dist_coeffs)?;
            Ok(())
        })
    }

    #[cfg(test)]
    pub fn read_from_file(path: &Path) -> anyhow::Result<Self> {
        let fs = FileStorage::new(path_str(path)?, FileStorage_Mode::READ as i32, "utf-8")?;
        if !fs.is_opened()? {
            bail!("cannot open {}", path.display());
        }

        let read_mat = |key: &str| -> anyhow::Result<Mat> {
            let mat = fs.get(key)?.mat()?;
            if mat.empty() {
                bail!("{}: missing key {:?}", path.display(), key);
            }
            Ok(mat)
        };

        let dim = mat_to_vec(&read_mat("dim")?)?;
        let &[width, height] = dim.as_slice() else {
            bail!("{}: dim must have 2 elements, got {}", path.display(), dim.len());
        };
        let camera_matrix = Matrix3d::try_from(&read_mat("camera_matrix")?)?.0;
        let dist_coeffs = mat_to_vec(&read_mat("dist_coeffs")?)?;

        // model_type 可选，缺省时按畸变系数个数推断
        let model_name = fs.get("model_type")?.to_string().unwrap_or_default();
        let model = match LensModel::from_name(&model_name) {
            Some(model) => model,
            None if dist_coeffs.len() == LensModel::Fisheye.distortion_len() => LensModel::Fisheye,
            None => LensModel::Pinhole,
        };

        Ok(Self {
            model,
            resolution: Resolution::new(width as i32, height as i32),
            camera_matrix,
            dist_coeffs,
        })
    }
}
