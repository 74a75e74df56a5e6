/// 移动侦测数据结构定义
/// Data structures shared by the detection pipeline
use std::fmt;

use image::Rgb;
use imageproc::point::Point;
use imageproc::rect::Rect;

// ========== 颜色 ==========

pub const BOUNDING_RECT_COLOR: Rgb<u8> = Rgb([0, 0, 0]); // black
pub const STATUS_READY_COLOR: Rgb<u8> = Rgb([255, 255, 255]); // white
pub const STATUS_MOTION_DETECTED_COLOR: Rgb<u8> = Rgb([255, 0, 255]); // purple
pub const STATUS_CLOSED_COLOR: Rgb<u8> = Rgb([128, 128, 128]);

// ========== 枚举类型 ==========

/// 侦测器状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Status {
    /// Initialised, or the last frame had no qualifying region.
    #[default]
    Ready,
    /// At least one region in the last frame reached the minimum area.
    MotionDetected,
    /// Terminal.
    Closed,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Ready => "Ready",
            Status::MotionDetected => "Motion Detected",
            Status::Closed => "Closed",
        }
    }

    /// 每个状态对应唯一颜色
    pub fn color(self) -> Rgb<u8> {
        match self {
            Status::Ready => STATUS_READY_COLOR,
            Status::MotionDetected => STATUS_MOTION_DETECTED_COLOR,
            Status::Closed => STATUS_CLOSED_COLOR,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ========== 数据结构 ==========

/// 变化区域: 二值掩码中的一个外轮廓
#[derive(Clone, Debug, PartialEq)]
pub struct Region {
    pub contour: Vec<Point<i32>>, // 简化后的轮廓点
    pub area: f64,                // 轮廓包围面积
    pub bounds: Rect,             // 外接矩形
}

/// 单帧判定结果
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Verdict {
    pub status: Status,
    pub qualifying: Vec<usize>, // 达到面积阈值的区域下标
}

impl Verdict {
    pub fn motion(&self) -> bool {
        !self.qualifying.is_empty()
    }
}

/// 一次处理循环的结果
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cycle {
    pub status: Status,
    pub regions: usize,
    pub qualifying: usize,
    pub terminate: bool, // 用户按下 Esc
}

/// 侦测器运行统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub frames: u64,
    pub empty_reads: u64,
    pub triggers: u64,
    pub dropped_triggers: u64,
}
