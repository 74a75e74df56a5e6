/// 移动侦测 (Motion Sentinel)
///
/// 实时摄像头运动检测
///
/// 系统架构:
/// 1. 解码线程: FFmpeg 摄像头采集 (独立工作线程)
/// 2. 侦测线程: 背景建模 + 区域判定 + 回调投递
/// 3. 回调线程: 运动通知
/// 4. 主线程:   渲染显示 (macroquad 事件循环), --headless 时由侦测循环占用
use std::path::PathBuf;
use std::thread;

use clap::{Parser, ValueEnum};
use motion_sentinel::detection::MixtureModel;
use motion_sentinel::input::{CameraSource, SyntheticSource};
use motion_sentinel::renderer::{HeadlessDisplay, WindowDisplay};
use motion_sentinel::{
    Callback, Detector, DetectorConfig, FrameSource, MotionError, Sensitivity, WebhookNotifier,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// 本地摄像头
    Camera,
    /// 合成画面 (移动方块)
    Synthetic,
}

/// 移动侦测参数
#[derive(Parser, Debug)]
#[command(author, version, about = "移动侦测 - 实时摄像头运动检测", long_about = None)]
struct Args {
    /// 摄像头索引
    #[arg(short, long, default_value_t = 0)]
    device: usize,

    /// 窗口标题
    #[arg(short, long, default_value = "Motion Detector")]
    title: String,

    /// 灵敏度: not (9000) / default (6000) / very (3000)
    #[arg(short, long, value_enum)]
    sensitivity: Option<Sensitivity>,

    /// 最小区域面积, 覆盖灵敏度
    #[arg(long)]
    min_area: Option<f64>,

    /// JSON 配置文件 (默认: 用户配置目录下 motion-sentinel/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 帧源
    #[arg(long, value_enum, default_value_t = SourceKind::Camera)]
    source: SourceKind,

    /// 不打开窗口
    #[arg(long)]
    headless: bool,

    /// 无窗口模式下处理的最大帧数
    #[arg(long)]
    max_frames: Option<u64>,

    /// 无窗口模式下保存帧的目录
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// 每 N 帧保存一张
    #[arg(long, default_value_t = 30)]
    dump_every: u64,

    /// 运动通知 Webhook 地址
    #[arg(long)]
    webhook_url: Option<String>,

    /// 日志级别 (RUST_LOG 优先)
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn load_config(args: &Args) -> anyhow::Result<DetectorConfig> {
    let mut config = match &args.config {
        Some(path) => DetectorConfig::load(path)?,
        None => DetectorConfig::default_path()
            .map(|path| DetectorConfig::load_or_default(&path))
            .unwrap_or_default(),
    };

    // 命令行参数覆盖配置文件
    if let Some(sensitivity) = args.sensitivity {
        config.sensitivity = sensitivity;
    }
    if args.min_area.is_some() {
        config.min_area = args.min_area;
    }
    if args.webhook_url.is_some() {
        config.webhook.url = args.webhook_url.clone();
    }
    config.validate()?;
    Ok(config)
}

fn open_source(args: &Args, config: &DetectorConfig) -> anyhow::Result<Box<dyn FrameSource>> {
    let source: Box<dyn FrameSource> = match args.source {
        SourceKind::Camera => Box::new(CameraSource::open(args.device, &config.camera)?),
        SourceKind::Synthetic => Box::new(
            SyntheticSource::new(config.camera.frame_width, config.camera.frame_height)
                .moving_square(160, 8, 220)
                .noise(2, 42),
        ),
    };
    Ok(source)
}

/// 运行到退出, 然后关闭侦测器并汇报释放失败
fn run(mut detector: Detector) -> anyhow::Result<()> {
    let result = detector.start();

    let stats = detector.stats();
    log::info!(
        "共处理 {} 帧 | 空帧 {} | 触发 {} 次 (丢弃 {})",
        stats.frames,
        stats.empty_reads,
        stats.triggers,
        stats.dropped_triggers
    );

    if let Err(e) = detector.close() {
        log::error!("{}", e);
    }

    match result {
        Ok(()) => Ok(()),
        Err(MotionError::DeviceClosed) => {
            log::warn!("视频设备已关闭, 退出");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&args.log_level))
        .init();

    let config = load_config(&args)?;
    log::info!("移动侦测启动 (最小区域面积 {})", config.min_area());

    let on_detect: Option<Callback> = WebhookNotifier::from_config(&config.webhook).map(|n| {
        log::info!("运动通知 → {}", n.url());
        n.into_callback()
    });

    let source = open_source(&args, &config)?;
    let model = Box::new(MixtureModel::new(config.background));

    // ========== 无窗口: 主线程运行侦测循环 ==========
    if args.headless {
        let mut display = HeadlessDisplay::new();
        if let Some(dir) = &args.dump_dir {
            display = display.dump_to(dir, args.dump_every);
        }
        if let Some(max) = args.max_frames {
            display = display.max_frames(max);
        }
        let detector = Detector::with_parts(source, Box::new(display), model, &config, on_detect)?;
        return run(detector);
    }

    // ========== 启动侦测线程 ==========
    let (display, renderer) = WindowDisplay::pair(&args.title);
    let detector = Detector::with_parts(source, Box::new(display), model, &config, on_detect)?;
    let worker = thread::Builder::new()
        .name("motion-detector".to_string())
        .spawn(move || run(detector))?;

    // ========== 主线程: 窗口渲染 ==========
    let conf = renderer.conf(config.camera.frame_width, config.camera.frame_height);
    macroquad::Window::from_config(conf, renderer.run());

    worker
        .join()
        .map_err(|_| anyhow::anyhow!("detector thread panicked"))?
}
