//! macroquad 窗口显示
//!
//! macroquad 必须占用主线程, 因此显示分为两半: 侦测线程持有 `WindowDisplay`,
//! 主线程运行 `WindowRenderer`, 二者通过 crossbeam 通道交换帧与按键.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TrySendError};
use image::{DynamicImage, RgbImage, RgbaImage};
use macroquad::prelude::*;

use super::{FrameDisplay, ESCAPE_KEY};

/// 窗口配置
pub fn window_conf(title: &str, width: u32, height: u32) -> macroquad::window::Conf {
    macroquad::window::Conf {
        window_title: title.to_string(),
        window_width: width as i32,
        window_height: height as i32,
        high_dpi: true,
        ..Default::default()
    }
}

/// 侦测线程一侧: 发送帧, 接收按键
pub struct WindowDisplay {
    frames: Option<Sender<RgbaImage>>,
    keys: Receiver<i32>,
}

impl WindowDisplay {
    /// 创建一对通道相连的显示端与渲染端
    pub fn pair(title: &str) -> (WindowDisplay, WindowRenderer) {
        let (frame_tx, frame_rx) = crossbeam_channel::bounded(2);
        let (key_tx, key_rx) = crossbeam_channel::bounded(16);
        (
            WindowDisplay {
                frames: Some(frame_tx),
                keys: key_rx,
            },
            WindowRenderer::new(title, frame_rx, key_tx),
        )
    }
}

impl FrameDisplay for WindowDisplay {
    fn show(&mut self, frame: &RgbImage) {
        if let Some(tx) = &self.frames {
            let rgba = DynamicImage::ImageRgb8(frame.clone()).into_rgba8();
            // 渲染跟不上时丢帧
            if let Err(TrySendError::Disconnected(_)) = tx.try_send(rgba) {
                log::debug!("窗口已关闭, 停止发送帧");
                self.frames = None;
            }
        }
    }

    fn wait_key(&mut self, timeout: Duration) -> Option<i32> {
        match self.keys.recv_timeout(timeout) {
            Ok(key) => Some(key),
            Err(RecvTimeoutError::Timeout) => None,
            // 窗口被关闭等同于 Esc
            Err(RecvTimeoutError::Disconnected) => Some(ESCAPE_KEY),
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        drop(self.frames.take());
        Ok(())
    }
}

/// 主线程一侧: macroquad 渲染循环
pub struct WindowRenderer {
    title: String,
    frames: Receiver<RgbaImage>,
    keys: Sender<i32>,
    last_frame: Option<Texture2D>,

    // FPS统计
    render_count: u64,
    render_last: Instant,
    render_fps: f64,
}

impl WindowRenderer {
    fn new(title: &str, frames: Receiver<RgbaImage>, keys: Sender<i32>) -> Self {
        Self {
            title: title.to_string(),
            frames,
            keys,
            last_frame: None,
            render_count: 0,
            render_last: Instant::now(),
            render_fps: 0.0,
        }
    }

    pub fn conf(&self, width: u32, height: u32) -> macroquad::window::Conf {
        window_conf(&self.title, width, height)
    }

    /// 取最新一帧上传到 GPU; 侦测端关闭后返回 false
    pub fn update(&mut self) -> bool {
        let mut latest = None;
        loop {
            match self.frames.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(crossbeam_channel::TryRecvError::Empty) => break,
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    if latest.is_none() {
                        return false;
                    }
                    break;
                }
            }
        }

        if let Some(frame) = latest {
            let (w, h) = frame.dimensions();
            let needs_rebuild = match &self.last_frame {
                Some(tex) => tex.width() as u32 != w || tex.height() as u32 != h,
                None => true,
            };
            if needs_rebuild {
                let texture = Texture2D::from_rgba8(w as u16, h as u16, frame.as_raw());
                texture.set_filter(FilterMode::Linear);
                self.last_frame = Some(texture);
            } else if let Some(tex) = &self.last_frame {
                // 复用纹理, 避免重新分配GPU内存
                tex.update(&Image {
                    bytes: frame.into_raw(),
                    width: w as u16,
                    height: h as u16,
                });
            }
        }
        true
    }

    pub fn draw(&mut self) {
        clear_background(BLACK);

        if let Some(texture) = &self.last_frame {
            // 等比缩放并居中
            let scale = (screen_width() / texture.width()).min(screen_height() / texture.height());
            let (dw, dh) = (texture.width() * scale, texture.height() * scale);
            draw_texture_ex(
                texture,
                (screen_width() - dw) / 2.0,
                (screen_height() - dh) / 2.0,
                WHITE,
                DrawTextureParams {
                    dest_size: Some(vec2(dw, dh)),
                    ..Default::default()
                },
            );
        }

        self.render_count += 1;
        let now = Instant::now();
        if now.duration_since(self.render_last).as_secs() >= 1 {
            self.render_fps =
                self.render_count as f64 / now.duration_since(self.render_last).as_secs_f64();
            self.render_count = 0;
            self.render_last = now;
            log::trace!("渲染 {:.1}fps", self.render_fps);
        }
    }

    /// 转发按键; 窗口关闭请求视为 Esc
    fn forward_keys(&self) -> bool {
        if is_quit_requested() {
            let _ = self.keys.try_send(ESCAPE_KEY);
            return false;
        }
        if let Some(key) = get_last_key_pressed() {
            let code = match key {
                KeyCode::Escape => ESCAPE_KEY,
                other => other as i32,
            };
            let _ = self.keys.try_send(code);
            if code == ESCAPE_KEY {
                return false;
            }
        }
        true
    }

    /// 渲染循环, 直到用户关闭窗口或侦测端释放显示
    pub async fn run(mut self) {
        prevent_quit();
        loop {
            if !self.update() {
                break;
            }
            self.draw();
            if !self.forward_keys() {
                break;
            }
            next_frame().await;
        }
        log::info!("窗口关闭");
    }
}
