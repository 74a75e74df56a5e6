//! 掩码精炼 (Mask Refinement)
//! 职责: 前景幅值 → 阈值二值化 → 膨胀, 填补变化区域内的小空洞

use image::GrayImage;
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate_mut;

/// 幅值达到该值即视为前景
pub const FOREGROUND_THRESHOLD: u8 = 25;

/// 二值化 + 3x3 膨胀
#[derive(Clone, Copy, Debug)]
pub struct MaskRefiner {
    threshold: u8,
    dilate_radius: u8,
}

impl Default for MaskRefiner {
    fn default() -> Self {
        Self {
            threshold: FOREGROUND_THRESHOLD,
            dilate_radius: 1,
        }
    }
}

impl MaskRefiner {
    /// Writes the binary mask (0 / 255) of `foreground` into `binary`, then grows every
    /// foreground pixel by one pixel in each direction, diagonals included.
    pub fn refine(&self, foreground: &GrayImage, binary: &mut GrayImage) {
        debug_assert_eq!(foreground.dimensions(), binary.dimensions());

        for (dst, src) in binary.iter_mut().zip(foreground.iter()) {
            *dst = if *src >= self.threshold { 255 } else { 0 };
        }

        // 切比雪夫距离 1 即 3x3 方形结构元素
        dilate_mut(binary, Norm::LInf, self.dilate_radius);
    }
}
