//! 无窗口显示: 服务器/测试环境使用

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use image::{ImageFormat, RgbImage};

use super::{FrameDisplay, ESCAPE_KEY};

#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    dump_dir: Option<PathBuf>,
    dump_every: u64,
    max_frames: Option<u64>,
    shown: u64,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    /// 每 `every` 帧保存一张 JPEG 到 `dir`
    pub fn dump_to(mut self, dir: impl Into<PathBuf>, every: u64) -> Self {
        self.dump_dir = Some(dir.into());
        self.dump_every = every.max(1);
        self
    }

    /// 显示 `frames` 帧后模拟按下 Esc
    pub fn max_frames(mut self, frames: u64) -> Self {
        self.max_frames = Some(frames);
        self
    }

    pub fn frames_shown(&self) -> u64 {
        self.shown
    }

    fn dump(&self, frame: &RgbImage) -> anyhow::Result<()> {
        if let Some(dir) = &self.dump_dir {
            if self.shown % self.dump_every == 0 {
                fs::create_dir_all(dir)?;
                let path = dir.join(format!("{}_{:06}.jpg", crate::gen_time_string("-"), self.shown));
                frame.save_with_format(&path, ImageFormat::Jpeg)?;
                log::debug!("帧已保存: {}", path.display());
            }
        }
        Ok(())
    }
}

impl FrameDisplay for HeadlessDisplay {
    fn show(&mut self, frame: &RgbImage) {
        self.shown += 1;
        if let Err(e) = self.dump(frame) {
            log::warn!("保存帧失败: {:#}", e);
        }
    }

    fn wait_key(&mut self, _timeout: Duration) -> Option<i32> {
        match self.max_frames {
            Some(max) if self.shown >= max => Some(ESCAPE_KEY),
            _ => None,
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        log::debug!("无窗口显示关闭, 共显示 {} 帧", self.shown);
        Ok(())
    }
}
