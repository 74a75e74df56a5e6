//! 运动通知示例: 检测到运动时 POST 到 Webhook, 15 秒内最多一次
//!
//! MOTION_WEBHOOK_URL=http://localhost:8080/hook cargo run --example notify_webhook -- 0

use std::thread;

use motion_sentinel::config::WebhookConfig;
use motion_sentinel::{Detector, MotionError, WebhookNotifier};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let device_index = std::env::args()
        .nth(1)
        .map(|s| s.parse::<usize>())
        .transpose()?
        .unwrap_or(0);

    let notifier = WebhookNotifier::from_config(&WebhookConfig::default()).ok_or_else(|| {
        anyhow::anyhow!("set MOTION_WEBHOOK_URL to the webhook that should receive alerts")
    })?;

    let (mut detector, renderer) =
        Detector::new(device_index, "Motion Detector", Some(notifier.into_callback()))?;

    let worker = thread::spawn(move || {
        let result = detector.start();
        if let Err(e) = detector.close() {
            log::error!("{}", e);
        }
        match result {
            Ok(()) | Err(MotionError::DeviceClosed) => Ok(()),
            Err(e) => Err(e),
        }
    });

    macroquad::Window::from_config(renderer.conf(1280, 720), renderer.run());

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("detector thread panicked"))??;
    Ok(())
}
