#![allow(clippy::type_complexity)]
// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 侦测器配置参数
pub mod detection; // 移动侦测系统
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod notify; // 运动通知
pub mod renderer; // 标注与显示

pub use crate::config::{DetectorConfig, Sensitivity};
pub use crate::detection::{Detector, DetectorHandle, Status};
pub use crate::error::{CloseError, MotionError};
pub use crate::input::FrameSource;
pub use crate::notify::{Callback, RateLimiter, WebhookNotifier};
pub use crate::renderer::FrameDisplay;

/// 本地时间字符串, 各字段以 `delimiter` 分隔, 用于快照文件名与通知时间戳
pub fn gen_time_string(delimiter: &str) -> String {
    let t_now = chrono::Local::now();
    let fmt = format!(
        "%Y{}%m{}%d{}%H{}%M{}%S{}%3f",
        delimiter, delimiter, delimiter, delimiter, delimiter, delimiter
    );
    t_now.format(&fmt).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_string_fields() {
        let s = gen_time_string("-");
        let fields: Vec<&str> = s.split('-').collect();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0].len(), 4);
        assert_eq!(fields[6].len(), 3);
    }
}
