//! 摄像头输入模块
//!
//! 处理本地摄像头输入,支持 DirectShow(Windows) / AVFoundation(macOS) / V4L2(Linux)

use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::{AVMediaType, FfmpegContext, Input};
use image::RgbImage;

use super::decode_filter::DecodeFilter;
use super::FrameSource;
use crate::config::CameraConfig;
use crate::error::MotionError;

type Stopper = Box<dyn FnOnce() -> anyhow::Result<()> + Send>;

/// 摄像头帧源: FFmpeg 在后台线程解码, 帧经有界通道送达
pub struct CameraSource {
    rx: Receiver<RgbImage>,
    read_timeout: Duration,
    stop: Option<Stopper>,
}

impl CameraSource {
    /// 打开第 `device_index` 个摄像头, 构建失败时按配置重试
    pub fn open(device_index: usize, config: &CameraConfig) -> Result<Self, MotionError> {
        let device_name = get_camera_devices()
            .into_iter()
            .find(|(i, _)| *i == device_index)
            .map(|(_, name)| name)
            .unwrap_or_default();
        let url = format_camera_url(device_index, &device_name);
        let format = capture_format();
        log::info!(
            "打开摄像头 #{} ({}), 格式: {}, 输入: {}",
            device_index,
            device_name,
            format,
            url
        );

        let video_size = format!("{}x{}", config.frame_width, config.frame_height);
        let framerate = config.framerate.to_string();
        let retries = config.open_retries.max(1);
        let mut last_error = String::new();

        for attempt in 1..=retries {
            let (tx, rx) = crossbeam_channel::bounded(config.queue.max(1));

            let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
            let pipe = pipe.filter("capture", Box::new(DecodeFilter::new(tx)));
            let out = create_null_output().add_frame_pipeline(pipe);

            let input = Input::new(url.as_str()).set_format(format).set_input_opts(
                [
                    ("framerate", framerate.as_str()),
                    ("video_size", video_size.as_str()),
                ]
                .into(),
            );

            let started = FfmpegContext::builder()
                .input(input)
                .filter_desc("format=yuv420p")
                .output(out)
                .build()
                .and_then(|ctx| ctx.start());

            match started {
                Ok(sch) => {
                    log::info!("摄像头连接成功,开始解码");
                    return Ok(Self {
                        rx,
                        read_timeout: Duration::from_millis(config.read_timeout_ms),
                        stop: Some(Box::new(move || {
                            sch.abort();
                            sch.wait()
                                .map_err(|e| anyhow::anyhow!("ffmpeg scheduler: {}", e))
                        })),
                    });
                }
                Err(e) => {
                    last_error = e.to_string();
                    log::warn!(
                        "摄像头忙或无法打开 ({}/{}): {}",
                        attempt,
                        retries,
                        last_error
                    );
                    if attempt < retries {
                        std::thread::sleep(Duration::from_secs(1));
                    }
                }
            }
        }

        Err(MotionError::SourceOpen(format!(
            "camera #{} ({}): {}",
            device_index, url, last_error
        )))
    }
}

impl FrameSource for CameraSource {
    fn read(&mut self, frame: &mut RgbImage) -> bool {
        match self.rx.recv_timeout(self.read_timeout) {
            Ok(image) => {
                *frame = image;
                true
            }
            // 超时: 交回空帧, 由调用方重试
            Err(RecvTimeoutError::Timeout) => {
                *frame = RgbImage::new(0, 0);
                true
            }
            Err(RecvTimeoutError::Disconnected) => false,
        }
    }

    fn close(&mut self) -> anyhow::Result<()> {
        match self.stop.take() {
            Some(stop) => stop(),
            None => Ok(()),
        }
    }
}

impl Drop for CameraSource {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            log::warn!("关闭摄像头失败: {:#}", e);
        }
    }
}

/// 各平台的采集格式
fn capture_format() -> &'static str {
    if cfg!(target_os = "windows") {
        "dshow"
    } else if cfg!(target_os = "macos") {
        "avfoundation"
    } else {
        "v4l2"
    }
}

/// 格式化摄像头URL - 根据平台选择
fn format_camera_url(index: usize, name: &str) -> String {
    if cfg!(target_os = "windows") {
        format!("video={}", name)
    } else if cfg!(target_os = "linux") {
        format!("/dev/video{}", index)
    } else {
        index.to_string()
    }
}

/// 获取可用的摄像头设备列表
pub fn get_camera_devices() -> Vec<(usize, String)> {
    match ez_ffmpeg::device::get_input_video_devices() {
        Ok(devices) => devices.into_iter().enumerate().collect(),
        Err(e) => {
            log::warn!("获取摄像头列表失败: {}", e);
            vec![]
        }
    }
}
