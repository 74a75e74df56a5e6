/// FFmpeg帧过滤器: 摄像头 YUV420P → RgbImage → 通道
/// FFmpeg frame filter feeding decoded camera frames to the detector
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;

/// 单帧最大边长, 超出视为损坏帧
const MAX_DIMENSION: u32 = 4096;

#[derive(Clone)]
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    count: usize,
    last: Instant,
    pub dropped_frames: usize, // 损坏或队列满而丢弃的帧
    pub total_frames: usize,
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>) -> Self {
        Self {
            tx,
            count: 0,
            last: Instant::now(),
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) -> Result<Option<Frame>, String> {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            log::warn!("丢弃帧 #{}: {}", self.total_frames, reason);
        }
        Ok(None)
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        log::debug!("摄像头解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        self.total_frames += 1;

        if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
            return self.drop_frame("空帧/损坏帧");
        }

        // 管线前端的 format=yuv420p 保证了平面布局
        let image = unsafe {
            let raw = &*frame.as_ptr();
            let (w, h) = (raw.width as u32, raw.height as u32);
            if w == 0 || h == 0 || w > MAX_DIMENSION || h > MAX_DIMENSION {
                return self.drop_frame(&format!("非法分辨率 {}x{}", w, h));
            }

            if raw.data[0].is_null() || raw.data[1].is_null() || raw.data[2].is_null() {
                return self.drop_frame("YUV指针为空");
            }
            let Some((y_stride, uv_stride)) = plane_strides(&raw.linesize, w) else {
                return self.drop_frame(&format!(
                    "步长异常 linesize={:?}",
                    &raw.linesize[..3]
                ));
            };

            let chroma_rows = (h as usize).div_ceil(2);
            let planes = Yuv420Planes {
                y: std::slice::from_raw_parts(raw.data[0], y_stride * h as usize),
                u: std::slice::from_raw_parts(raw.data[1], uv_stride * chroma_rows),
                v: std::slice::from_raw_parts(raw.data[2], uv_stride * chroma_rows),
                y_stride,
                uv_stride,
            };
            let mut image = RgbImage::new(w, h);
            planes.write_rgb(&mut image);
            image
        };

        match self.tx.try_send(image) {
            Ok(()) => self.count += 1,
            // 侦测循环跟不上时丢弃最新帧, 不阻塞解码
            Err(TrySendError::Full(_)) => self.dropped_frames += 1,
            Err(TrySendError::Disconnected(_)) => {
                return Err("frame receiver dropped".to_string());
            }
        }

        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            let drop_rate = self.dropped_frames as f64 / self.total_frames as f64 * 100.0;
            log::debug!(
                "解码统计: {}帧 | {:.1}fps | 总帧{} | 丢弃{} ({:.1}%)",
                self.count,
                self.count as f64 / elapsed,
                self.total_frames,
                self.dropped_frames,
                drop_rate
            );
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        log::debug!("摄像头解码线程退出");
    }
}

/// 校验 YUV420P 步长; 负步长 (倒置帧) 与过窄的步长都拒绝
fn plane_strides(linesize: &[i32], width: u32) -> Option<(usize, usize)> {
    let (y, u, v) = (*linesize.first()?, *linesize.get(1)?, *linesize.get(2)?);
    if y <= 0 || u <= 0 || v != u {
        return None;
    }
    let (y, uv) = (y as usize, u as usize);
    if y < width as usize || uv < (width as usize).div_ceil(2) {
        return None;
    }
    Some((y, uv))
}

/// YUV420P 三个平面 (色度平面宽高各为亮度的一半, 向上取整)
pub struct Yuv420Planes<'a> {
    pub y: &'a [u8],
    pub u: &'a [u8],
    pub v: &'a [u8],
    pub y_stride: usize,
    pub uv_stride: usize,
}

impl Yuv420Planes<'_> {
    /// BT.601 定点转换 (系数放大 128 倍)
    pub fn write_rgb(&self, out: &mut RgbImage) {
        let width = out.width() as usize;
        for (row, line) in out.chunks_exact_mut(width * 3).enumerate() {
            let y_row = &self.y[row * self.y_stride..];
            let uv_row = (row >> 1) * self.uv_stride;
            for (x, px) in line.chunks_exact_mut(3).enumerate() {
                let y_val = y_row[x] as i32;
                let u_val = self.u[uv_row + (x >> 1)] as i32 - 128;
                let v_val = self.v[uv_row + (x >> 1)] as i32 - 128;

                px[0] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
                px[1] = (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
                px[2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            }
        }
    }
}
