//! 帧标注: 轮廓 + 外接矩形 + 状态文字

use std::fs;
use std::path::Path;

use ab_glyph::{FontArc, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::detection::types::{Region, Status, Verdict, BOUNDING_RECT_COLOR};

const TEXT_SCALE: f32 = 18.0;
const TEXT_ORIGIN: (i32, i32) = (10, 20); // 文字基线左端

/// 内置字体 (DejaVu Sans), 未配置字体文件时使用
static BUILTIN_FONT: &[u8] = include_bytes!("../../assets/font/DejaVuSans.ttf");

pub struct Annotator {
    font: Option<FontArc>,
}

impl Default for Annotator {
    fn default() -> Self {
        Self::new()
    }
}

impl Annotator {
    /// 使用内置字体绘制状态文字
    pub fn new() -> Self {
        match FontArc::try_from_slice(BUILTIN_FONT) {
            Ok(font) => Self::with_font(font),
            Err(e) => {
                log::warn!("内置字体解析失败, 不显示状态文字: {}", e);
                Self::without_text()
            }
        }
    }

    /// 只画轮廓和外接矩形
    pub fn without_text() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    /// 加载 TTF/OTF 字体文件
    pub fn from_font_file(path: &Path) -> anyhow::Result<Self> {
        let data = fs::read(path)?;
        let font = FontArc::try_from_vec(data)
            .map_err(|e| anyhow::anyhow!("{}: {}", path.display(), e))?;
        Ok(Self::with_font(font))
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draws every qualifying region (contour in the status colour, bounding rectangle in
    /// black, both 2 px) and the status text.
    pub fn annotate(&self, frame: &mut RgbImage, regions: &[Region], verdict: &Verdict) {
        let color = verdict.status.color();
        for region in verdict.qualifying.iter().filter_map(|&i| regions.get(i)) {
            draw_contour(frame, region, color);
            draw_rect(frame, region.bounds, BOUNDING_RECT_COLOR);
        }
        self.draw_status(frame, verdict.status);
    }

    fn draw_status(&self, frame: &mut RgbImage, status: Status) {
        if let Some(font) = &self.font {
            let (x, baseline) = TEXT_ORIGIN;
            draw_text_mut(
                frame,
                status.color(),
                x,
                baseline - TEXT_SCALE as i32,
                PxScale::from(TEXT_SCALE),
                font,
                status.as_str(),
            );
        }
    }
}

fn draw_contour(frame: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    let points = &region.contour;
    if points.len() == 1 {
        let p = points[0];
        draw_rect(frame, Rect::at(p.x, p.y).of_size(1, 1), color);
        return;
    }
    for (a, b) in points.iter().zip(points.iter().cycle().skip(1)) {
        // 两条相邻 1px 线段构成 2px 线宽
        for (dx, dy) in [(0.0, 0.0), (1.0, 0.0), (0.0, 1.0)] {
            draw_line_segment_mut(
                frame,
                (a.x as f32 + dx, a.y as f32 + dy),
                (b.x as f32 + dx, b.y as f32 + dy),
                color,
            );
        }
    }
}

fn draw_rect(frame: &mut RgbImage, rect: Rect, color: Rgb<u8>) {
    draw_hollow_rect_mut(frame, rect, color);
    if rect.width() > 2 && rect.height() > 2 {
        let inner = Rect::at(rect.left() + 1, rect.top() + 1).of_size(rect.width() - 2, rect.height() - 2);
        draw_hollow_rect_mut(frame, inner, color);
    }
}
