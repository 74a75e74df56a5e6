/// 渲染系统 (Rendering System)
///
/// - Annotator:       在帧上绘制变化区域与状态文字
/// - WindowDisplay:   macroquad 窗口 (渲染在主线程)
/// - HeadlessDisplay: 无窗口, 可按间隔保存 JPEG
pub mod annotate;
pub mod headless;
pub mod window;

pub use annotate::Annotator;
pub use headless::HeadlessDisplay;
pub use window::{window_conf, WindowDisplay, WindowRenderer};

use std::time::Duration;

use image::RgbImage;

/// Esc 键码, 按下即结束侦测循环
pub const ESCAPE_KEY: i32 = 27;

/// 帧显示
pub trait FrameDisplay: Send {
    fn show(&mut self, frame: &RgbImage);

    /// Waits up to `timeout` for a key press and returns its code.
    fn wait_key(&mut self, timeout: Duration) -> Option<i32>;

    fn close(&mut self) -> anyhow::Result<()>;
}
