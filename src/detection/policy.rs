//! 判定策略: 区域面积 ≥ 阈值 即为运动

use super::types::{Region, Status, Verdict};
use crate::config::Sensitivity;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionPolicy {
    min_area: f64,
}

impl DetectionPolicy {
    pub fn new(min_area: f64) -> Self {
        Self { min_area }
    }

    pub fn min_area(&self) -> f64 {
        self.min_area
    }

    /// 边界值 (面积恰好等于阈值) 也算运动
    pub fn qualifies(&self, area: f64) -> bool {
        area >= self.min_area
    }

    pub fn evaluate(&self, regions: &[Region]) -> Verdict {
        let qualifying: Vec<usize> = regions
            .iter()
            .enumerate()
            .filter(|(_, r)| self.qualifies(r.area))
            .map(|(i, _)| i)
            .collect();
        let status = if qualifying.is_empty() {
            Status::Ready
        } else {
            Status::MotionDetected
        };
        Verdict { status, qualifying }
    }
}

impl From<Sensitivity> for DetectionPolicy {
    fn from(sensitivity: Sensitivity) -> Self {
        Self::new(sensitivity.min_area())
    }
}
