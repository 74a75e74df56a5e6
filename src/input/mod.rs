/// 视频输入系统 (Video Input System)
///
/// - CameraSource:    本地摄像头 (DirectShow/AVFoundation/V4L2)
/// - DecodeFilter:    FFmpeg帧过滤, YUV420P → RGB
/// - SyntheticSource: 合成帧, 用于演示与测试
pub mod camera;
pub mod decode_filter;
pub mod synthetic;

pub use camera::{get_camera_devices, CameraSource};
pub use decode_filter::DecodeFilter;
pub use synthetic::SyntheticSource;

use image::RgbImage;

/// 帧源
pub trait FrameSource: Send {
    /// Reads the next frame into `frame`.
    ///
    /// Returns `false` once the source is closed. `true` with an empty (0x0) frame means
    /// nothing arrived this time and the caller should read again.
    fn read(&mut self, frame: &mut RgbImage) -> bool;

    fn close(&mut self) -> anyhow::Result<()>;
}
