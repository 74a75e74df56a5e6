/// 移动侦测系统 (Motion Detection System)
///
/// 每帧流水线: 背景模型 → 掩码精炼 → 区域提取 → 判定策略
/// - Detector:  编排流水线与资源生命周期
/// - Background: 自适应背景建模
/// - Policy:    最小面积灵敏度
pub mod background;
pub mod detector;
pub mod policy;
pub mod refine;
pub mod regions;
pub mod types;

pub use background::{BackgroundModel, MixtureModel};
pub use detector::{Detector, DetectorHandle};
pub use policy::DetectionPolicy;
pub use refine::{MaskRefiner, FOREGROUND_THRESHOLD};
pub use regions::extract_regions;
pub use types::{Cycle, DetectorStats, Region, Status, Verdict};
