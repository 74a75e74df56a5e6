//! 最小示例: 合成帧源 + 无窗口显示, 回调只计数
//!
//! cargo run --example simple

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use motion_sentinel::detection::MixtureModel;
use motion_sentinel::input::SyntheticSource;
use motion_sentinel::renderer::HeadlessDisplay;
use motion_sentinel::{Detector, DetectorConfig, MotionError, Sensitivity};

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = DetectorConfig {
        sensitivity: Sensitivity::DefaultSensitive,
        ..Default::default()
    };

    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();

    let source = SyntheticSource::new(640, 480)
        .moving_square(120, 10, 230)
        .noise(2, 7)
        .limit(120);
    let mut detector = Detector::with_parts(
        Box::new(source),
        Box::new(HeadlessDisplay::new()),
        Box::new(MixtureModel::new(config.background)),
        &config,
        Some(Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        })),
    )?;

    match detector.start() {
        Ok(()) | Err(MotionError::DeviceClosed) => {}
        Err(e) => return Err(e.into()),
    }
    let stats = detector.stats();
    detector.close()?;

    println!(
        "处理 {} 帧, 回调 {} 次",
        stats.frames,
        count.load(Ordering::SeqCst)
    );
    Ok(())
}
