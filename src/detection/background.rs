//! 背景模型 (Background Model)
//! 职责: 帧 → 前景幅值掩码, 并随每一帧自适应更新

use image::{GrayImage, Rgb, RgbImage};
use ndarray::{Array2, Array3, ArrayViewMut1, Axis, Zip};

use crate::config::BackgroundConfig;

/// Stateful background subtraction.
///
/// `apply` advances the model by one frame, so calls must follow frame order.
pub trait BackgroundModel: Send {
    /// Writes a foreground magnitude mask for `frame` into `foreground`, which the caller
    /// has sized to the frame.
    fn apply(&mut self, frame: &RgbImage, foreground: &mut GrayImage);

    fn release(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// 逐像素高斯混合背景模型 (MOG2 同类算法, 基于亮度)
///
/// Each pixel keeps up to `mixtures` Gaussians sorted by weight. Components whose
/// preceding cumulative weight stays under `background_ratio` describe the background.
/// A pixel explained by one of them yields 0, any other pixel yields its distance in grey
/// levels from the dominant component, saturated at 255.
pub struct MixtureModel {
    params: BackgroundConfig,
    weights: Array3<f32>,
    means: Array3<f32>,
    variances: Array3<f32>,
    magnitude: Array2<u8>,
    frames: u32,
}

impl MixtureModel {
    pub fn new(params: BackgroundConfig) -> Self {
        Self {
            params,
            weights: Array3::zeros((0, 0, params.mixtures)),
            means: Array3::zeros((0, 0, params.mixtures)),
            variances: Array3::zeros((0, 0, params.mixtures)),
            magnitude: Array2::zeros((0, 0)),
            frames: 0,
        }
    }

    pub fn frames_seen(&self) -> u32 {
        self.frames
    }

    fn reset(&mut self, height: usize, width: usize) {
        let k = self.params.mixtures;
        self.weights = Array3::zeros((height, width, k));
        self.means = Array3::zeros((height, width, k));
        self.variances = Array3::from_elem((height, width, k), self.params.var_init);
        self.magnitude = Array2::zeros((height, width));
        self.frames = 0;
    }

    /// alpha = 1 / min(n, history)
    fn learning_rate(&self) -> f32 {
        1.0 / self.frames.min(self.params.history).max(1) as f32
    }
}

impl Default for MixtureModel {
    fn default() -> Self {
        Self::new(BackgroundConfig::default())
    }
}

#[inline]
fn luma_of(p: &Rgb<u8>) -> f32 {
    // BT.601
    0.299 * p.0[0] as f32 + 0.587 * p.0[1] as f32 + 0.114 * p.0[2] as f32
}

impl BackgroundModel for MixtureModel {
    fn apply(&mut self, frame: &RgbImage, foreground: &mut GrayImage) {
        let (w, h) = frame.dimensions();
        let (w, h) = (w as usize, h as usize);

        if self.magnitude.dim() != (h, w) {
            self.reset(h, w);
        }
        self.frames = self.frames.saturating_add(1);

        let luma = Array2::from_shape_fn((h, w), |(y, x)| {
            luma_of(frame.get_pixel(x as u32, y as u32))
        });

        if self.frames == 1 {
            // 首帧: 每个像素以当前亮度初始化一个分量
            self.weights.index_axis_mut(Axis(2), 0).fill(1.0);
            self.means.index_axis_mut(Axis(2), 0).assign(&luma);
            self.magnitude.fill(0);
        } else {
            let alpha = self.learning_rate();
            let params = self.params;
            Zip::from(self.weights.lanes_mut(Axis(2)))
                .and(self.means.lanes_mut(Axis(2)))
                .and(self.variances.lanes_mut(Axis(2)))
                .and(&luma)
                .and(&mut self.magnitude)
                .for_each(|weights, means, variances, &x, out| {
                    *out = update_pixel(&params, weights, means, variances, x, alpha);
                });
        }

        for (dst, src) in foreground.iter_mut().zip(self.magnitude.iter()) {
            *dst = *src;
        }
    }

    fn release(&mut self) -> anyhow::Result<()> {
        self.reset(0, 0);
        Ok(())
    }
}

/// 单像素更新, 返回前景幅值
fn update_pixel(
    params: &BackgroundConfig,
    mut weights: ArrayViewMut1<f32>,
    mut means: ArrayViewMut1<f32>,
    mut variances: ArrayViewMut1<f32>,
    x: f32,
    alpha: f32,
) -> u8 {
    let k = weights.len();

    let mut matched = None;
    let mut background = false;
    let mut cumulative = 0.0;
    for i in 0..k {
        if weights[i] <= 0.0 {
            break;
        }
        let d = x - means[i];
        if d * d < params.var_threshold * variances[i] {
            matched = Some(i);
            background = cumulative < params.background_ratio;
            break;
        }
        cumulative += weights[i];
    }

    let magnitude = if background {
        0
    } else {
        (x - means[0]).abs().round().min(255.0) as u8
    };

    weights.mapv_inplace(|w| w * (1.0 - alpha));
    let updated = match matched {
        Some(i) => {
            weights[i] += alpha;
            let rho = alpha / weights[i];
            let d = x - means[i];
            means[i] += rho * d;
            variances[i] = (variances[i] + rho * (d * d - variances[i]))
                .clamp(params.var_min, params.var_max);
            i
        }
        None => {
            // 替换最弱分量
            let i = k - 1;
            weights[i] = alpha;
            means[i] = x;
            variances[i] = params.var_init;
            i
        }
    };

    // 保持按权重降序
    let mut i = updated;
    while i > 0 && weights[i] > weights[i - 1] {
        weights.swap(i, i - 1);
        means.swap(i, i - 1);
        variances.swap(i, i - 1);
        i -= 1;
    }

    let total = weights.sum();
    if total > 0.0 {
        weights.mapv_inplace(|w| w / total);
    }

    magnitude
}
