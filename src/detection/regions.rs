//! 变化区域提取 (Region Extraction)
//! 职责: 二值掩码 → 外轮廓 → 面积 + 外接矩形

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType, Contour};
use imageproc::point::Point;
use imageproc::rect::Rect;

use super::types::Region;

/// 提取二值掩码中所有外轮廓 (不含孔洞, 不含嵌套轮廓)
///
/// Non-zero pixels are foreground. Each region's contour keeps only the points where the
/// border changes direction, so a rectangle comes back as its four corners.
pub fn extract_regions(binary: &GrayImage) -> Vec<Region> {
    find_contours::<i32>(binary)
        .into_iter()
        .filter(is_external)
        .filter_map(|contour| {
            let points = simplify_chain(&contour.points);
            let bounds = bounding_rect(&points)?;
            Some(Region {
                area: contour_area(&points),
                contour: points,
                bounds,
            })
        })
        .collect()
}

fn is_external(contour: &Contour<i32>) -> bool {
    contour.border_type == BorderType::Outer && contour.parent.is_none()
}

/// 压缩水平/垂直/对角线上的连续段, 只保留端点
pub fn simplify_chain(points: &[Point<i32>]) -> Vec<Point<i32>> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let n = points.len();
    let step = |a: Point<i32>, b: Point<i32>| ((b.x - a.x).signum(), (b.y - a.y).signum());

    let mut out = Vec::with_capacity(n);
    for i in 0..n {
        let prev = points[(i + n - 1) % n];
        let cur = points[i];
        let next = points[(i + 1) % n];
        if cur == prev {
            continue;
        }
        if step(prev, cur) != step(cur, next) {
            out.push(cur);
        }
    }

    // 闭合直线段 (所有点同向) 时至少保留一个点
    if out.is_empty() {
        out.push(points[0]);
    }
    out
}

/// 多边形面积 (鞋带公式), 与点的方向无关
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    twice.abs() as f64 / 2.0
}

/// 外接矩形 (含端点像素)
pub fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
    for p in &points[1..] {
        x0 = x0.min(p.x);
        y0 = y0.min(p.y);
        x1 = x1.max(p.x);
        y1 = y1.max(p.y);
    }
    Some(Rect::at(x0, y0).of_size((x1 - x0 + 1) as u32, (y1 - y0 + 1) as u32))
}
