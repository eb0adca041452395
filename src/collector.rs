//! 标定板角点检测与点对收集

use opencv::{
    calib3d,
    core::*,
    imgproc::{self, COLOR_BGR2GRAY},
    prelude::*,
};

use crate::config::*;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("object/image point count mismatch: {object} vs {image}")]
pub struct PointPairError {
    pub object: usize,
    pub image: usize,
}

/// 一次成功检测：标定板三维参考点与对应的图像角点，按元素一一对应。
#[derive(Debug, Clone)]
pub struct PointPair {
    object_points: Vector<Point3f>,
    image_points: Vector<Point2f>,
}

impl PointPair {
    pub fn new(
        object_points: Vector<Point3f>,
        image_points: Vector<Point2f>,
    ) -> Result<Self, PointPairError> {
        if object_points.len() != image_points.len() {
            return Err(PointPairError {
                object: object_points.len(),
                image: image_points.len(),
            });
        }
        Ok(Self {
            object_points,
            image_points,
        })
    }

    #[cfg(test)]
    pub fn object_points(&self) -> &Vector<Point3f> {
        &self.object_points
    }

    pub fn image_points(&self) -> &Vector<Point2f> {
        &self.image_points
    }
}

/// 按检测顺序累积的点对，只增不改。
#[derive(Debug, Default)]
pub struct PointPairCollection {
    pairs: Vec<PointPair>,
}

impl PointPairCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pair: PointPair) {
        self.pairs.push(pair);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = &PointPair> {
        self.pairs.iter()
    }

    /// 转换为标定函数需要的 (objectPoints, imagePoints)
    pub fn to_cv_vectors(&self) -> (Vector<Vector<Point3f>>, Vector<Vector<Point2f>>) {
        let object_points = self.pairs.iter().map(|p| p.object_points.clone()).collect();
        let image_points = self.pairs.iter().map(|p| p.image_points.clone()).collect();
        (object_points, image_points)
    }
}

/// 角点检测器
pub trait CornerDetector {
    /// 在灰度图中寻找 `pattern` 个内角点，未找到返回 `None`。
    fn detect(&mut self, gray: &Mat, pattern: Size) -> opencv::Result<Option<Vector<Point2f>>>;
}

/// OpenCV 棋盘格角点检测 + 亚像素优化
#[derive(Debug, Clone, Copy)]
pub struct ChessboardDetector {
    pub flags: i32,
    pub win_size: Size,
    pub criteria: TermCriteria,
}

impl ChessboardDetector {
    pub fn new() -> opencv::Result<Self> {
        Ok(Self {
            flags: calib3d::CALIB_CB_ADAPTIVE_THRESH
                | calib3d::CALIB_CB_NORMALIZE_IMAGE
                | calib3d::CALIB_CB_FILTER_QUADS,
            win_size: Size::new(SUBPIX_WIN_SIZE, SUBPIX_WIN_SIZE),
            criteria: TermCriteria::new(
                TermCriteria_EPS + TermCriteria_COUNT,
                SUBPIX_MAX_ITER,
                SUBPIX_EPSILON,
            )?,
        })
    }
}

impl CornerDetector for ChessboardDetector {
    fn detect(&mut self, gray: &Mat, pattern: Size) -> opencv::Result<Option<Vector<Point2f>>> {
        let mut corners = Vector::<Point2f>::new();
        let found = calib3d::find_chessboard_corners(gray, pattern, &mut corners, self.flags)?;
        if !found {
            return Ok(None);
        }
        imgproc::corner_sub_pix(
            gray,
            &mut corners,
            self.win_size,
            Size::new(-1, -1),
            self.criteria,
        )?;
        Ok(Some(corners))
    }
}

/// 对抽样帧做角点检测，成功时追加点对并在帧上画出角点。
pub struct CornerCollector<D>
where
    D: CornerDetector,
{
    detector: D,
    grid: GridSize,
    reference_points: Vector<Point3f>,
    gray: Mat,
}

impl<D> CornerCollector<D>
where
    D: CornerDetector,
{
    pub fn new(detector: D, grid: GridSize) -> Self {
        Self {
            detector,
            grid,
            reference_points: grid.reference_points(),
            gray: Mat::default(),
        }
    }

    /// 处理一帧，返回是否检测到完整的标定板。检测失败或 OpenCV 出错都只会丢弃该帧。
    pub fn process(&mut self, frame: &mut Mat, pairs: &mut PointPairCollection) -> bool {
        match self.try_process(frame, pairs) {
            Ok(found) => found,
            Err(e) => {
                log::warn!("corner detection error: {}", e);
                false
            }
        }
    }

    fn try_process(
        &mut self,
        frame: &mut Mat,
        pairs: &mut PointPairCollection,
    ) -> opencv::Result<bool> {
        if frame.channels() == 1 {
            self.gray = frame.clone();
        } else {
            imgproc::cvt_color(&*frame, &mut self.gray, COLOR_BGR2GRAY, 0)?;
        }

        let pattern = self.grid.pattern_size();
        let Some(corners) = self.detector.detect(&self.gray, pattern)? else {
            return Ok(false);
        };
        let pair = match PointPair::new(self.reference_points.clone(), corners) {
            Ok(pair) => pair,
            Err(e) => {
                log::warn!("discarding detection: {}", e);
                return Ok(false);
            }
        };

        calib3d::draw_chessboard_corners(frame, pattern, pair.image_points(), true)?;
        pairs.push(pair);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 返回预设结果的检测器
    struct ScriptedDetector {
        results: Vec<Option<Vector<Point2f>>>,
        calls: usize,
    }

    impl CornerDetector for ScriptedDetector {
        fn detect(&mut self, gray: &Mat, _pattern: Size) -> opencv::Result<Option<Vector<Point2f>>> {
            assert_eq!(gray.channels(), 1);
            let result = self.results.get(self.calls).cloned().flatten();
            self.calls += 1;
            Ok(result)
        }
    }

    fn corners(grid: GridSize) -> Vector<Point2f> {
        grid.reference_points()
            .iter()
            .map(|p| Point2f::new(100.0 + p.x * 20.0, 100.0 + p.y * 20.0))
            .collect()
    }

    fn frame() -> Mat {
        Mat::new_rows_cols_with_default(480, 640, CV_8UC3, Scalar::all(0.0)).unwrap()
    }

    #[test]
    fn test_point_pair_length_invariant() {
        let grid = GridSize::new(3, 3);
        assert!(PointPair::new(grid.reference_points(), corners(grid)).is_ok());

        let mut short = corners(grid);
        short.remove(0).unwrap();
        let err = PointPair::new(grid.reference_points(), short).unwrap_err();
        assert_eq!(err, PointPairError { object: 9, image: 8 });
    }

    #[test]
    fn test_collects_only_detections() {
        let grid = GridSize::new(4, 3);
        let detector = ScriptedDetector {
            results: vec![Some(corners(grid)), None, Some(corners(grid))],
            calls: 0,
        };
        let mut collector = CornerCollector::new(detector, grid);
        let mut pairs = PointPairCollection::new();

        let mut img = frame();
        assert!(collector.process(&mut img, &mut pairs));
        assert!(!collector.process(&mut frame(), &mut pairs));
        assert!(collector.process(&mut frame(), &mut pairs));
        assert_eq!(pairs.len(), 2);

        for pair in pairs.iter() {
            assert_eq!(pair.object_points().len(), grid.corner_count());
            assert_eq!(pair.image_points().len(), grid.corner_count());
        }
        // 角点已绘制到显示帧上
        let mut gray = Mat::default();
        imgproc::cvt_color(&img, &mut gray, COLOR_BGR2GRAY, 0).unwrap();
        assert!(count_non_zero(&gray).unwrap() > 0);
    }

    #[test]
    fn test_wrong_corner_count_is_dropped() {
        let grid = GridSize::new(4, 3);
        let detector = ScriptedDetector {
            results: vec![Some(corners(GridSize::new(2, 2)))],
            calls: 0,
        };
        let mut collector = CornerCollector::new(detector, grid);
        let mut pairs = PointPairCollection::new();
        assert!(!collector.process(&mut frame(), &mut pairs));
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_chessboard_detector_misses_blank_frame() {
        let grid = GridSize::new(9, 6);
        let mut collector = CornerCollector::new(ChessboardDetector::new().unwrap(), grid);
        let mut pairs = PointPairCollection::new();
        assert!(!collector.process(&mut frame(), &mut pairs));
        assert!(pairs.is_empty());
    }

    #[test]
    fn test_to_cv_vectors() {
        let grid = GridSize::new(3, 2);
        let mut pairs = PointPairCollection::new();
        for _ in 0..3 {
            pairs.push(PointPair::new(grid.reference_points(), corners(grid)).unwrap());
        }
        let (object_points, image_points) = pairs.to_cv_vectors();
        assert_eq!(object_points.len(), 3);
        assert_eq!(image_points.len(), 3);
        assert_eq!(image_points.get(2).unwrap().len(), 6);
    }
}
