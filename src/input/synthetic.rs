//! 合成帧源: 无摄像头时用于演示与测试
//!
//! Frames are a flat grey background with optional scripted blobs, a square moving left to
//! right, sensor noise and periodic empty reads.

use image::{Rgb, RgbImage};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::FrameSource;

/// 在第 `frame` 帧 (从 1 开始) 出现的矩形
#[derive(Clone, Copy, Debug)]
struct Blob {
    frame: u64,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    value: u8,
}

#[derive(Clone, Copy, Debug)]
struct MovingSquare {
    size: u32,
    speed: u32, // 像素/帧
    value: u8,
}

pub struct SyntheticSource {
    width: u32,
    height: u32,
    background: u8,
    limit: Option<u64>,
    blobs: Vec<Blob>,
    moving: Option<MovingSquare>,
    noise: Option<(u8, StdRng)>,
    empty_every: Option<u64>,
    frames: u64,
    reads: u64,
    closed: bool,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            background: 50,
            limit: None,
            blobs: Vec::new(),
            moving: None,
            noise: None,
            empty_every: None,
            frames: 0,
            reads: 0,
            closed: false,
        }
    }

    pub fn background(mut self, value: u8) -> Self {
        self.background = value;
        self
    }

    /// 输出 `frames` 帧后报告设备关闭
    pub fn limit(mut self, frames: u64) -> Self {
        self.limit = Some(frames);
        self
    }

    pub fn blob_at(mut self, frame: u64, x: u32, y: u32, width: u32, height: u32, value: u8) -> Self {
        self.blobs.push(Blob {
            frame,
            x,
            y,
            width,
            height,
            value,
        });
        self
    }

    pub fn moving_square(mut self, size: u32, speed: u32, value: u8) -> Self {
        self.moving = Some(MovingSquare { size, speed, value });
        self
    }

    /// 每个像素叠加 [-amplitude, amplitude] 的均匀噪声
    pub fn noise(mut self, amplitude: u8, seed: u64) -> Self {
        self.noise = Some((amplitude, StdRng::seed_from_u64(seed)));
        self
    }

    /// 每第 `n` 次读取返回空帧
    pub fn empty_every(mut self, n: u64) -> Self {
        self.empty_every = Some(n.max(1));
        self
    }

    pub fn frames_emitted(&self) -> u64 {
        self.frames
    }

    fn render(&mut self, frame: &mut RgbImage) {
        let bg = self.background;
        if frame.dimensions() != (self.width, self.height) {
            *frame = RgbImage::new(self.width, self.height);
        }
        for p in frame.pixels_mut() {
            *p = Rgb([bg, bg, bg]);
        }

        let index = self.frames;
        for blob in self.blobs.iter().filter(|b| b.frame == index) {
            fill(frame, blob.x, blob.y, blob.width, blob.height, blob.value);
        }

        if let Some(sq) = self.moving {
            let span = self.width.saturating_sub(sq.size).max(1);
            let x = ((index as u32).wrapping_mul(sq.speed)) % span;
            let y = self.height.saturating_sub(sq.size) / 2;
            fill(frame, x, y, sq.size, sq.size, sq.value);
        }

        if let Some((amplitude, rng)) = self.noise.as_mut() {
            let a = *amplitude as i16;
            for v in frame.iter_mut() {
                let n: i16 = rng.gen_range(-a..=a);
                *v = (*v as i16 + n).clamp(0, 255) as u8;
            }
        }
    }
}

fn fill(frame: &mut RgbImage, x: u32, y: u32, width: u32, height: u32, value: u8) {
    let x1 = (x + width).min(frame.width());
    let y1 = (y + height).min(frame.height());
    for yy in y.min(y1)..y1 {
        for xx in x.min(x1)..x1 {
            frame.put_pixel(xx, yy, Rgb([value, value, value]));
        }
    }
}

impl FrameSource for SyntheticSource {
    fn read(&mut self, frame: &mut RgbImage) -> bool {
        if self.closed {
            return false;
        }
        self.reads += 1;
        if let Some(n) = self.empty_every {
            if self.reads % n == 0 {
                *frame = RgbImage::new(0, 0);
                return true;
            }
        }
        if self.limit.is_some_and(|limit| self.frames >= limit) {
            return false;
        }
        self.frames += 1;
        self.render(frame);
        true
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_limit_then_closed() {
        let mut source = SyntheticSource::new(8, 8).limit(3);
        let mut frame = RgbImage::new(0, 0);
        for _ in 0..3 {
            assert!(source.read(&mut frame));
            assert_eq!(frame.dimensions(), (8, 8));
        }
        assert!(!source.read(&mut frame));
        assert_eq!(source.frames_emitted(), 3);
    }

    #[test]
    fn test_blob_only_on_its_frame() {
        let mut source = SyntheticSource::new(20, 20).blob_at(2, 5, 5, 4, 4, 200);
        let mut frame = RgbImage::new(0, 0);
        source.read(&mut frame);
        assert_eq!(frame.get_pixel(6, 6).0, [50, 50, 50]);
        source.read(&mut frame);
        assert_eq!(frame.get_pixel(6, 6).0, [200, 200, 200]);
        assert_eq!(frame.get_pixel(9, 9).0, [50, 50, 50]);
        source.read(&mut frame);
        assert_eq!(frame.get_pixel(6, 6).0, [50, 50, 50]);
    }

    #[test]
    fn test_empty_reads_do_not_count_as_frames() {
        let mut source = SyntheticSource::new(4, 4).empty_every(2).limit(2);
        let mut frame = RgbImage::new(0, 0);
        let mut empties = 0;
        while source.read(&mut frame) {
            if frame.width() == 0 {
                empties += 1;
            }
        }
        assert_eq!(source.frames_emitted(), 2);
        assert_eq!(empties, 2);
    }

    #[test]
    fn test_noise_is_reproducible() {
        let mut a = SyntheticSource::new(6, 6).noise(3, 7);
        let mut b = SyntheticSource::new(6, 6).noise(3, 7);
        let (mut fa, mut fb) = (RgbImage::new(0, 0), RgbImage::new(0, 0));
        a.read(&mut fa);
        b.read(&mut fb);
        assert_eq!(fa, fb);
        assert!(fa.iter().all(|v| (47..=53).contains(v)));
    }

    #[test]
    fn test_background_level() {
        let mut source = SyntheticSource::new(4, 4).background(120);
        let mut frame = RgbImage::new(0, 0);
        assert!(source.read(&mut frame));
        assert!(frame.pixels().all(|p| p.0 == [120, 120, 120]));
    }

    #[test]
    fn test_close_reports_closed() {
        let mut source = SyntheticSource::new(4, 4);
        source.close().unwrap();
        assert!(!source.read(&mut RgbImage::new(0, 0)));
    }
}
