//! 侦测器 (Detector)
//! 职责: 读帧 → 背景模型 → 掩码精炼 → 区域提取 → 判定 → 标注 → 显示

use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use image::{GrayImage, ImageFormat, RgbImage};

use super::background::{BackgroundModel, MixtureModel};
use super::policy::DetectionPolicy;
use super::refine::MaskRefiner;
use super::regions::extract_regions;
use super::types::{Cycle, DetectorStats, Status};
use crate::config::DetectorConfig;
use crate::error::{CloseError, MotionError, ReleaseFailure, Result};
use crate::input::{CameraSource, FrameSource};
use crate::notify::{Callback, Dispatcher};
use crate::renderer::{Annotator, FrameDisplay, WindowDisplay, WindowRenderer, ESCAPE_KEY};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // 写入方 panic 不影响读取最新状态
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// 处理线程与外部观察者共享的状态
#[derive(Default)]
struct Shared {
    status: Mutex<Status>,
    latest: Mutex<Option<RgbImage>>, // 最近一次标注后的帧
    frames: AtomicU64,
    empty_reads: AtomicU64,
    triggers: AtomicU64,
    dropped_triggers: AtomicU64,
}

impl Shared {
    fn set_status(&self, status: Status) {
        *lock(&self.status) = status;
    }

    fn publish(&self, frame: &RgbImage) {
        let mut latest = lock(&self.latest);
        match latest.as_mut() {
            Some(buf) if buf.dimensions() == frame.dimensions() => buf.copy_from_slice(frame),
            _ => *latest = Some(frame.clone()),
        }
    }
}

/// Thread-safe view of a running detector.
///
/// Cloned handles stay valid after the detector closes and then report `Closed`.
#[derive(Clone)]
pub struct DetectorHandle {
    shared: Arc<Shared>,
}

impl DetectorHandle {
    pub fn status(&self) -> Status {
        *lock(&self.shared.status)
    }

    pub fn stats(&self) -> DetectorStats {
        DetectorStats {
            frames: self.shared.frames.load(Ordering::Relaxed),
            empty_reads: self.shared.empty_reads.load(Ordering::Relaxed),
            triggers: self.shared.triggers.load(Ordering::Relaxed),
            dropped_triggers: self.shared.dropped_triggers.load(Ordering::Relaxed),
        }
    }

    /// JPEG 快照 (最近一次显示的帧)
    pub fn snapshot_jpeg(&self) -> Result<Vec<u8>> {
        if self.status() == Status::Closed {
            return Err(MotionError::Closed);
        }
        // 锁内只做拷贝, 编码在锁外
        let frame = lock(&self.shared.latest).clone().ok_or(MotionError::NoFrame)?;
        let mut buf = Cursor::new(Vec::new());
        frame.write_to(&mut buf, ImageFormat::Jpeg)?;
        Ok(buf.into_inner())
    }
}

/// 按获取的逆序释放资源, 收集全部失败
#[derive(Default)]
struct Teardown {
    failures: Vec<ReleaseFailure>,
}

impl Teardown {
    fn release(&mut self, resource: &'static str, result: anyhow::Result<()>) {
        match result {
            Ok(()) => log::debug!("已释放: {}", resource),
            Err(error) => {
                log::warn!("释放 {} 失败: {:#}", resource, error);
                self.failures.push(ReleaseFailure { resource, error });
            }
        }
    }

    fn finish(self) -> std::result::Result<(), CloseError> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(CloseError {
                failures: self.failures,
            })
        }
    }
}

pub struct Detector {
    source: Option<Box<dyn FrameSource>>,
    display: Option<Box<dyn FrameDisplay>>,
    model: Option<Box<dyn BackgroundModel>>,
    dispatcher: Option<Dispatcher>,

    // 每帧复用的缓冲区
    frame: RgbImage,
    foreground: GrayImage,
    binary: GrayImage,

    refiner: MaskRefiner,
    policy: DetectionPolicy,
    annotator: Annotator,
    wait_key: Duration,
    shared: Arc<Shared>,
    closed: bool,

    // 统计
    count: u64,
    last: Instant,
}

impl Detector {
    /// Opens camera `device_index` with the default configuration (not sensitive) and a
    /// window titled `window_title`.
    ///
    /// The returned renderer must run on the main thread, see [`WindowRenderer::run`].
    pub fn new(
        device_index: usize,
        window_title: &str,
        on_detect: Option<Callback>,
    ) -> Result<(Self, WindowRenderer)> {
        let config = DetectorConfig::default();
        let source = CameraSource::open(device_index, &config.camera)?;
        let (display, renderer) = WindowDisplay::pair(window_title);
        let model = MixtureModel::new(config.background);
        let detector = Self::with_parts(
            Box::new(source),
            Box::new(display),
            Box::new(model),
            &config,
            on_detect,
        )?;
        Ok((detector, renderer))
    }

    pub fn with_parts(
        source: Box<dyn FrameSource>,
        display: Box<dyn FrameDisplay>,
        model: Box<dyn BackgroundModel>,
        config: &DetectorConfig,
        on_detect: Option<Callback>,
    ) -> Result<Self> {
        config.validate()?;

        let dispatcher = on_detect
            .map(|cb| Dispatcher::spawn(cb, config.callback_queue))
            .transpose()?;

        let annotator = match &config.font_path {
            Some(path) => Annotator::from_font_file(path).unwrap_or_else(|e| {
                log::warn!("字体加载失败, 使用内置字体: {:#}", e);
                Annotator::new()
            }),
            None => Annotator::new(),
        };

        let policy = DetectionPolicy::new(config.min_area());
        log::info!(
            "侦测器启动: 灵敏度 {:?}, 最小区域面积 {}, 回调 {}",
            config.sensitivity,
            policy.min_area(),
            if dispatcher.is_some() { "已注册" } else { "无" }
        );

        Ok(Self {
            source: Some(source),
            display: Some(display),
            model: Some(model),
            dispatcher,
            frame: RgbImage::new(0, 0),
            foreground: GrayImage::new(0, 0),
            binary: GrayImage::new(0, 0),
            refiner: MaskRefiner::default(),
            policy,
            annotator,
            wait_key: Duration::from_millis(config.wait_key_ms),
            shared: Arc::new(Shared::default()),
            closed: false,
            count: 0,
            last: Instant::now(),
        })
    }

    pub fn handle(&self) -> DetectorHandle {
        DetectorHandle {
            shared: self.shared.clone(),
        }
    }

    pub fn status(&self) -> Status {
        self.handle().status()
    }

    pub fn stats(&self) -> DetectorStats {
        self.handle().stats()
    }

    pub fn min_area(&self) -> f64 {
        self.policy.min_area()
    }

    pub fn snapshot_jpeg(&self) -> Result<Vec<u8>> {
        self.handle().snapshot_jpeg()
    }

    /// Runs cycles until Escape is pressed (`Ok`) or the source closes (`DeviceClosed`).
    pub fn start(&mut self) -> Result<()> {
        if self.closed {
            return Err(MotionError::Closed);
        }
        loop {
            if self.run_cycle()?.terminate {
                log::info!("收到退出按键, 侦测循环结束");
                return Ok(());
            }
        }
    }

    /// 单次处理循环
    pub fn run_cycle(&mut self) -> Result<Cycle> {
        if self.closed {
            return Err(MotionError::Closed);
        }
        let (Some(source), Some(display), Some(model)) = (
            self.source.as_deref_mut(),
            self.display.as_deref_mut(),
            self.model.as_deref_mut(),
        ) else {
            return Err(MotionError::Closed);
        };

        // 1. 读帧, 空帧直接重试; 上一帧的状态保持到拿到新帧为止
        loop {
            if !source.read(&mut self.frame) {
                log::info!("视频设备已关闭");
                return Err(MotionError::DeviceClosed);
            }
            if self.frame.width() > 0 && self.frame.height() > 0 {
                self.shared.set_status(Status::Ready);
                break;
            }
            self.shared.empty_reads.fetch_add(1, Ordering::Relaxed);
        }

        // 2. 背景模型 → 二值掩码 → 区域
        let (w, h) = self.frame.dimensions();
        if self.foreground.dimensions() != (w, h) {
            self.foreground = GrayImage::new(w, h);
            self.binary = GrayImage::new(w, h);
        }
        model.apply(&self.frame, &mut self.foreground);
        self.refiner.refine(&self.foreground, &mut self.binary);
        let regions = extract_regions(&self.binary);

        // 3. 判定, 每个达标区域触发一次回调
        let verdict = self.policy.evaluate(&regions);
        self.shared.set_status(verdict.status);
        if let Some(dispatcher) = &self.dispatcher {
            for _ in &verdict.qualifying {
                if dispatcher.trigger() {
                    self.shared.triggers.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.shared.dropped_triggers.fetch_add(1, Ordering::Relaxed);
                    log::warn!("回调队列已满, 丢弃一次触发");
                }
            }
        }

        // 4. 标注 → 发布快照 → 显示
        self.annotator.annotate(&mut self.frame, &regions, &verdict);
        self.shared.publish(&self.frame);
        display.show(&self.frame);
        let terminate = display.wait_key(self.wait_key) == Some(ESCAPE_KEY);

        self.shared.frames.fetch_add(1, Ordering::Relaxed);
        self.count += 1;
        let now = Instant::now();
        if now.duration_since(self.last).as_secs() >= 1 {
            let fps = self.count as f64 / now.duration_since(self.last).as_secs_f64();
            log::debug!(
                "侦测: {:.1}fps | 区域{}个 | 达标{}个 | {}",
                fps,
                regions.len(),
                verdict.qualifying.len(),
                verdict.status
            );
            self.count = 0;
            self.last = now;
        }

        Ok(Cycle {
            status: verdict.status,
            regions: regions.len(),
            qualifying: verdict.qualifying.len(),
            terminate,
        })
    }

    /// Releases everything the detector owns, in reverse order of acquisition.
    ///
    /// Every release is attempted even after a failure. A second call does nothing.
    pub fn close(&mut self) -> std::result::Result<(), CloseError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.shared.set_status(Status::Closed);

        let mut teardown = Teardown::default();
        if let Some(mut dispatcher) = self.dispatcher.take() {
            teardown.release("callback dispatcher", dispatcher.release());
        }
        if let Some(mut model) = self.model.take() {
            teardown.release("background model", model.release());
        }

        self.frame = RgbImage::new(0, 0);
        self.foreground = GrayImage::new(0, 0);
        self.binary = GrayImage::new(0, 0);
        *lock(&self.shared.latest) = None;

        if let Some(mut display) = self.display.take() {
            teardown.release("display", display.close());
        }
        if let Some(mut source) = self.source.take() {
            teardown.release("frame source", source.close());
        }

        log::info!("侦测器已关闭");
        teardown.finish()
    }
}

impl Drop for Detector {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("侦测器关闭时出错: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Sensitivity;
    use crate::input::SyntheticSource;
    use crate::renderer::HeadlessDisplay;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    const W: u32 = 320;
    const H: u32 = 240;

    fn config(sensitivity: Sensitivity) -> DetectorConfig {
        DetectorConfig {
            sensitivity,
            font_path: None,
            ..Default::default()
        }
    }

    fn counter() -> (Arc<AtomicUsize>, Callback) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = count.clone();
        (
            count,
            Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            }),
        )
    }

    fn detector(
        source: SyntheticSource,
        sensitivity: Sensitivity,
        on_detect: Option<Callback>,
    ) -> Detector {
        Detector::with_parts(
            Box::new(source),
            Box::new(HeadlessDisplay::new()),
            Box::new(MixtureModel::default()),
            &config(sensitivity),
            on_detect,
        )
        .unwrap()
    }

    /// 等待回调计数达到 `n`, 最多 5 秒
    fn wait_for(count: &AtomicUsize, n: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < n && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    /// 运行到设备关闭, 返回每帧状态
    fn run_to_end(detector: &mut Detector) -> Vec<Status> {
        let mut statuses = Vec::new();
        loop {
            match detector.run_cycle() {
                Ok(cycle) => statuses.push(cycle.status),
                Err(MotionError::DeviceClosed) => return statuses,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
    }

    #[test]
    fn test_end_to_end_single_motion_frame() {
        // 69x99 膨胀后轮廓面积 70*100 = 7000
        let source = SyntheticSource::new(W, H).blob_at(5, 100, 60, 69, 99, 200).limit(12);
        let (count, cb) = counter();
        let mut detector = detector(source, Sensitivity::DefaultSensitive, Some(cb));

        let statuses = run_to_end(&mut detector);
        let mut expected = vec![Status::Ready; 12];
        expected[4] = Status::MotionDetected;
        assert_eq!(statuses, expected);

        wait_for(&count, 1);
        detector.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(detector.stats().triggers, 1);
    }

    #[test]
    fn test_area_equal_to_threshold_qualifies() {
        // 59x99 → 60*100 = 6000, 58x99 → 5900
        for (width, expected) in [(59, Status::MotionDetected), (58, Status::Ready)] {
            let source = SyntheticSource::new(W, H).blob_at(3, 40, 40, width, 99, 220).limit(3);
            let mut detector = detector(source, Sensitivity::DefaultSensitive, None);
            let statuses = run_to_end(&mut detector);
            assert_eq!(statuses[2], expected, "blob width {width}");
        }
    }

    #[test]
    fn test_lower_sensitivity_ignores_same_region() {
        let source = SyntheticSource::new(W, H).blob_at(5, 100, 60, 69, 99, 200).limit(6);
        let mut detector = detector(source, Sensitivity::NotSensitive, None);
        assert!(run_to_end(&mut detector)
            .iter()
            .all(|s| *s == Status::Ready));
    }

    #[test]
    fn test_empty_frames_are_retried() {
        let source = SyntheticSource::new(64, 48).empty_every(3).limit(6);
        let mut detector = detector(source, Sensitivity::NotSensitive, None);
        assert_eq!(run_to_end(&mut detector).len(), 6);
        let stats = detector.stats();
        assert_eq!(stats.frames, 6);
        assert!(stats.empty_reads >= 2);
    }

    #[test]
    fn test_start_reports_device_closed() {
        let source = SyntheticSource::new(64, 48).limit(4);
        let mut detector = detector(source, Sensitivity::NotSensitive, None);
        assert!(matches!(detector.start(), Err(MotionError::DeviceClosed)));
        assert_eq!(detector.stats().frames, 4);
    }

    #[test]
    fn test_escape_ends_start() {
        let mut detector = Detector::with_parts(
            Box::new(SyntheticSource::new(64, 48)),
            Box::new(HeadlessDisplay::new().max_frames(3)),
            Box::new(MixtureModel::default()),
            &config(Sensitivity::NotSensitive),
            None,
        )
        .unwrap();
        detector.start().unwrap();
        assert_eq!(detector.stats().frames, 3);
    }

    #[test]
    fn test_closed_is_terminal() {
        let source = SyntheticSource::new(64, 48).limit(10);
        let mut detector = detector(source, Sensitivity::NotSensitive, None);
        detector.run_cycle().unwrap();
        assert_eq!(detector.status(), Status::Ready);

        let handle = detector.handle();
        detector.close().unwrap();
        assert_eq!(detector.status(), Status::Closed);
        assert_eq!(handle.status(), Status::Closed);
        assert!(matches!(detector.start(), Err(MotionError::Closed)));
        assert!(matches!(detector.run_cycle(), Err(MotionError::Closed)));
        assert!(matches!(handle.snapshot_jpeg(), Err(MotionError::Closed)));
        assert_eq!(detector.status(), Status::Closed);
        // 第二次关闭无操作
        assert!(detector.close().is_ok());
    }

    #[test]
    fn test_invalid_min_area_rejected() {
        let config = DetectorConfig {
            min_area: Some(0.0),
            font_path: None,
            ..Default::default()
        };
        let result = Detector::with_parts(
            Box::new(SyntheticSource::new(8, 8)),
            Box::new(HeadlessDisplay::new()),
            Box::new(MixtureModel::default()),
            &config,
            None,
        );
        assert!(matches!(result, Err(MotionError::Config(_))));
    }

    #[test]
    fn test_one_trigger_per_qualifying_region() {
        let source = SyntheticSource::new(W, H)
            .blob_at(5, 10, 10, 80, 80, 200)
            .blob_at(5, 150, 100, 100, 100, 200)
            .limit(6);
        let (count, cb) = counter();
        let mut detector = detector(source, Sensitivity::VerySensitive, Some(cb));
        run_to_end(&mut detector);
        wait_for(&count, 2);
        detector.close().unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(detector.stats().triggers, 2);
    }

    #[test]
    fn test_slow_callback_does_not_block_loop() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let (count, mut inner) = counter();
        let cb: Callback = Box::new(move || {
            let _ = gate_rx.recv();
            inner();
        });
        let source = SyntheticSource::new(W, H)
            .blob_at(3, 10, 10, 80, 80, 200)
            .blob_at(6, 150, 100, 100, 100, 200)
            .limit(10);
        let mut detector = detector(source, Sensitivity::VerySensitive, Some(cb));

        // 回调阻塞期间循环照常跑完
        let statuses = run_to_end(&mut detector);
        assert_eq!(statuses.len(), 10);
        assert_eq!(count.load(Ordering::SeqCst), 0);

        drop(gate_tx);
        wait_for(&count, 2);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        detector.close().unwrap();
    }

    #[test]
    fn test_close_does_not_wait_for_running_callback() {
        let (count, mut inner) = counter();
        let cb: Callback = Box::new(move || {
            std::thread::sleep(Duration::from_secs(3));
            inner();
        });
        let source = SyntheticSource::new(W, H).blob_at(3, 10, 10, 80, 80, 200).limit(4);
        let mut detector = detector(source, Sensitivity::VerySensitive, Some(cb));
        run_to_end(&mut detector);
        assert_eq!(detector.stats().triggers, 1);
        std::thread::sleep(Duration::from_millis(50));

        let started = Instant::now();
        detector.close().unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    /// 包装帧源, 每次读帧前记录外部句柄看到的状态
    struct ObservedSource {
        inner: SyntheticSource,
        handle: Arc<Mutex<Option<DetectorHandle>>>,
        seen: Arc<Mutex<Vec<Status>>>,
    }

    impl FrameSource for ObservedSource {
        fn read(&mut self, frame: &mut RgbImage) -> bool {
            if let Some(handle) = lock(&self.handle).as_ref() {
                lock(&self.seen).push(handle.status());
            }
            self.inner.read(frame)
        }
        fn close(&mut self) -> anyhow::Result<()> {
            self.inner.close()
        }
    }

    fn observed(inner: SyntheticSource) -> (Detector, Arc<Mutex<Vec<Status>>>) {
        let slot = Arc::new(Mutex::new(None));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let source = ObservedSource {
            inner,
            handle: slot.clone(),
            seen: seen.clone(),
        };
        let detector = Detector::with_parts(
            Box::new(source),
            Box::new(HeadlessDisplay::new()),
            Box::new(MixtureModel::default()),
            &config(Sensitivity::DefaultSensitive),
            None,
        )
        .unwrap();
        *lock(&slot) = Some(detector.handle());
        (detector, seen)
    }

    #[test]
    fn test_motion_status_persists_while_waiting_for_next_frame() {
        let source = SyntheticSource::new(W, H).blob_at(3, 100, 60, 69, 99, 200).limit(5);
        let (mut detector, seen) = observed(source);
        let handle = detector.handle();

        let mut between = Vec::new();
        loop {
            match detector.run_cycle() {
                Ok(_) => between.push(handle.status()),
                Err(MotionError::DeviceClosed) => break,
                Err(e) => panic!("unexpected error: {e}"),
            }
        }

        use Status::{MotionDetected, Ready};
        assert_eq!(between, vec![Ready, Ready, MotionDetected, Ready, Ready]);
        // 第 4 次读帧阻塞期间, 外部仍看到第 3 帧的结果
        assert_eq!(
            *lock(&seen),
            vec![Ready, Ready, Ready, MotionDetected, Ready, Ready]
        );
    }

    #[test]
    fn test_status_after_device_closed_keeps_last_outcome() {
        let source = SyntheticSource::new(W, H).blob_at(3, 100, 60, 69, 99, 200).limit(3);
        let (mut detector, _seen) = observed(source);
        let handle = detector.handle();

        assert!(matches!(detector.start(), Err(MotionError::DeviceClosed)));
        assert_eq!(handle.status(), Status::MotionDetected);
        detector.close().unwrap();
        assert_eq!(handle.status(), Status::Closed);
    }

    #[test]
    fn test_empty_reads_keep_previous_status() {
        // 每第 4 次读为空帧; 第 3 帧有运动, 随后的空帧不改写状态
        let source = SyntheticSource::new(W, H)
            .blob_at(3, 100, 60, 69, 99, 200)
            .empty_every(4)
            .limit(4);
        let (mut detector, seen) = observed(source);
        for _ in 0..3 {
            detector.run_cycle().unwrap();
        }
        assert_eq!(detector.status(), Status::MotionDetected);
        assert_eq!(detector.run_cycle().unwrap().status, Status::Ready);
        // 读 #4 为空帧, 读 #4 和 #5 之前看到的都是第 3 帧的结果
        let seen = lock(&seen).clone();
        assert_eq!(&seen[3..5], &[Status::MotionDetected, Status::MotionDetected]);
        assert_eq!(detector.stats().empty_reads, 1);
    }

    #[test]
    fn test_full_queue_drops_triggers() {
        let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(0);
        let source = SyntheticSource::new(W, H)
            .blob_at(5, 5, 5, 70, 70, 200)
            .blob_at(5, 120, 5, 70, 70, 200)
            .blob_at(5, 5, 120, 70, 70, 200)
            .limit(6);
        let config = DetectorConfig {
            callback_queue: 1,
            ..config(Sensitivity::VerySensitive)
        };
        let mut detector = Detector::with_parts(
            Box::new(source),
            Box::new(HeadlessDisplay::new()),
            Box::new(MixtureModel::default()),
            &config,
            Some(Box::new(move || {
                let _ = gate_rx.recv();
            })),
        )
        .unwrap();
        run_to_end(&mut detector);

        let stats = detector.stats();
        assert_eq!(stats.triggers + stats.dropped_triggers, 3);
        assert!(stats.dropped_triggers >= 1);
        drop(gate_tx);
        detector.close().unwrap();
    }

    #[test]
    fn test_default_config_draws_status_text() {
        let mut detector = Detector::with_parts(
            Box::new(SyntheticSource::new(W, H).limit(1)),
            Box::new(HeadlessDisplay::new()),
            Box::new(MixtureModel::default()),
            &DetectorConfig::default(),
            None,
        )
        .unwrap();
        assert!(detector.annotator.has_font());

        detector.run_cycle().unwrap();
        let jpeg = detector.snapshot_jpeg().unwrap();
        let frame = image::load_from_memory(&jpeg).unwrap().to_rgb8();
        // 背景为 50 灰, "Ready" 白字使左上角出现亮像素
        let bright = (0..26)
            .flat_map(|y| (10..80).map(move |x| (x, y)))
            .filter(|&(x, y)| frame.get_pixel(x, y)[0] > 180)
            .count();
        assert!(bright > 10, "status text pixels: {bright}");
    }

    #[test]
    fn test_snapshot_before_first_frame() {
        let detector = detector(SyntheticSource::new(8, 8), Sensitivity::NotSensitive, None);
        assert!(matches!(detector.snapshot_jpeg(), Err(MotionError::NoFrame)));
    }

    #[test]
    fn test_concurrent_snapshots_decode() {
        let source = SyntheticSource::new(W, H).moving_square(60, 7, 230).limit(30);
        let mut detector = detector(source, Sensitivity::VerySensitive, None);
        let handle = detector.handle();
        let stop = Arc::new(AtomicBool::new(false));

        let readers: Vec<_> = (0..3)
            .map(|_| {
                let handle = handle.clone();
                let stop = stop.clone();
                std::thread::spawn(move || {
                    let mut decoded = 0;
                    while !stop.load(Ordering::SeqCst) {
                        if let Ok(jpeg) = handle.snapshot_jpeg() {
                            let img = image::load_from_memory_with_format(&jpeg, ImageFormat::Jpeg)
                                .unwrap();
                            assert_eq!((img.width(), img.height()), (W, H));
                            decoded += 1;
                        }
                    }
                    decoded
                })
            })
            .collect();

        run_to_end(&mut detector);
        let last = detector.snapshot_jpeg().unwrap();
        assert!(image::load_from_memory(&last).is_ok());
        stop.store(true, Ordering::SeqCst);
        for reader in readers {
            reader.join().unwrap();
        }
    }

    // ========== 释放失败注入 ==========

    type Log = Arc<Mutex<Vec<&'static str>>>;

    struct FailingSource(Log);
    impl FrameSource for FailingSource {
        fn read(&mut self, _frame: &mut RgbImage) -> bool {
            false
        }
        fn close(&mut self) -> anyhow::Result<()> {
            lock(&self.0).push("frame source");
            anyhow::bail!("device busy")
        }
    }

    struct FailingDisplay(Log);
    impl FrameDisplay for FailingDisplay {
        fn show(&mut self, _frame: &RgbImage) {}
        fn wait_key(&mut self, _timeout: Duration) -> Option<i32> {
            None
        }
        fn close(&mut self) -> anyhow::Result<()> {
            lock(&self.0).push("display");
            anyhow::bail!("window gone")
        }
    }

    struct FailingModel(Log);
    impl BackgroundModel for FailingModel {
        fn apply(&mut self, _frame: &RgbImage, _foreground: &mut GrayImage) {}
        fn release(&mut self) -> anyhow::Result<()> {
            lock(&self.0).push("background model");
            anyhow::bail!("model state corrupt")
        }
    }

    #[test]
    fn test_close_attempts_every_release() {
        let log: Log = Arc::default();
        let mut detector = Detector::with_parts(
            Box::new(FailingSource(log.clone())),
            Box::new(FailingDisplay(log.clone())),
            Box::new(FailingModel(log.clone())),
            &config(Sensitivity::NotSensitive),
            None,
        )
        .unwrap();

        let err = detector.close().unwrap_err();
        assert_eq!(
            err.resources(),
            vec!["background model", "display", "frame source"]
        );
        assert_eq!(
            *lock(&log),
            vec!["background model", "display", "frame source"]
        );
        assert_eq!(detector.status(), Status::Closed);
        assert!(detector.close().is_ok());
    }

    #[test]
    fn test_drop_closes_unclosed_detector() {
        let log: Log = Arc::default();
        let detector = Detector::with_parts(
            Box::new(FailingSource(log.clone())),
            Box::new(FailingDisplay(log.clone())),
            Box::new(FailingModel(log.clone())),
            &config(Sensitivity::NotSensitive),
            None,
        )
        .unwrap();
        let handle = detector.handle();
        drop(detector);
        assert_eq!(lock(&log).len(), 3);
        assert_eq!(handle.status(), Status::Closed);
    }
}
