use std::num::NonZeroUsize;

/// 按固定步长抽帧：只有序号能被 `step` 整除的帧进入角点检测。
#[derive(Debug, Clone)]
pub struct FrameSampler {
    step: NonZeroUsize,
    next_index: usize,
}

impl FrameSampler {
    pub fn new(step: NonZeroUsize) -> Self {
        Self {
            step,
            next_index: 0,
        }
    }

    /// 计数加一，返回当前帧序号及是否保留该帧。
    #[inline]
    pub fn advance(&mut self) -> (usize, bool) {
        let index = self.next_index;
        self.next_index += 1;
        (index, index % self.step.get() == 0)
    }

    /// 已读取的帧数
    pub fn frames_read(&self) -> usize {
        self.next_index
    }
}
