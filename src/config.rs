//! 侦测器配置 - 通过JSON文件调整参数

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::{MotionError, Result};

/// 灵敏度预设: 最小变化区域面积 (像素)
///
/// A smaller area lets smaller moving objects count as motion, so the presets are ordered
/// `VerySensitive < DefaultSensitive < NotSensitive` by area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum Sensitivity {
    /// 9000 px
    #[default]
    #[value(name = "not")]
    NotSensitive,
    /// 6000 px
    #[value(name = "default")]
    DefaultSensitive,
    /// 3000 px
    #[value(name = "very")]
    VerySensitive,
}

impl Sensitivity {
    pub fn min_area(self) -> f64 {
        match self {
            Sensitivity::NotSensitive => 9000.0,
            Sensitivity::DefaultSensitive => 6000.0,
            Sensitivity::VerySensitive => 3000.0,
        }
    }
}

/// 背景模型参数 (高斯混合)
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackgroundConfig {
    pub history: u32,          // 学习窗口帧数
    pub mixtures: usize,       // 每像素高斯分量数
    pub var_threshold: f32,    // 马氏距离平方阈值
    pub background_ratio: f32, // 背景分量累计权重
    pub var_init: f32,         // 新分量初始方差
    pub var_min: f32,
    pub var_max: f32,
}

impl Default for BackgroundConfig {
    fn default() -> Self {
        Self {
            history: 500,
            mixtures: 3,
            var_threshold: 16.0,
            background_ratio: 0.9,
            var_init: 15.0,
            var_min: 4.0,
            var_max: 75.0,
        }
    }
}

/// 摄像头采集参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub frame_width: u32,
    pub frame_height: u32,
    pub framerate: u32,
    pub read_timeout_ms: u64, // 超时视为空帧
    pub open_retries: u32,
    pub queue: usize,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            frame_width: 1280,
            frame_height: 720,
            framerate: 30,
            read_timeout_ms: 500,
            open_retries: 3,
            queue: 4,
        }
    }
}

/// Webhook 通知参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    pub url: Option<String>,
    pub cooldown_secs: u64,
    pub message: String,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            url: None,
            cooldown_secs: 15,
            message: "Motion has been detected in the room".to_string(),
        }
    }
}

/// 侦测器参数配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub sensitivity: Sensitivity,
    pub min_area: Option<f64>,   // 覆盖灵敏度预设
    pub callback_queue: usize,   // 回调队列容量
    pub wait_key_ms: u64,        // 每帧按键轮询时长
    pub font_path: Option<PathBuf>, // 为空时使用内置字体
    pub background: BackgroundConfig,
    pub camera: CameraConfig,
    pub webhook: WebhookConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity: Sensitivity::NotSensitive,
            min_area: None,
            callback_queue: 64,
            wait_key_ms: 1,
            font_path: None,
            background: BackgroundConfig::default(),
            camera: CameraConfig::default(),
            webhook: WebhookConfig::default(),
        }
    }
}

impl DetectorConfig {
    /// Minimum qualifying region area: the explicit override, else the preset.
    pub fn min_area(&self) -> f64 {
        self.min_area.unwrap_or_else(|| self.sensitivity.min_area())
    }

    pub fn validate(&self) -> Result<()> {
        let area = self.min_area();
        if !(area.is_finite() && area > 0.0) {
            return Err(MotionError::Config(format!(
                "minimum region area must be positive, got {area}"
            )));
        }
        if self.callback_queue == 0 {
            return Err(MotionError::Config(
                "callback queue needs room for at least one trigger".to_string(),
            ));
        }
        if self.background.mixtures == 0 || self.background.history == 0 {
            return Err(MotionError::Config(
                "background model needs at least one mixture and a non-zero history".to_string(),
            ));
        }
        Ok(())
    }

    /// `$CONFIG_DIR/motion-sentinel/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("motion-sentinel").join("config.json"))
    }

    /// 从JSON文件加载配置 (文件必须存在)
    pub fn load(path: &Path) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&json)?;
        config.validate()?;
        log::info!("配置已从 {} 加载", path.display());
        Ok(config)
    }

    /// 加载配置, 文件不存在时写入默认配置
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            log::info!("配置文件不存在,创建默认配置: {}", path.display());
            let config = Self::default();
            if let Err(e) = config.save(path) {
                log::warn!("保存默认配置失败: {}", e);
            }
            return config;
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                log::warn!("配置文件解析失败: {}, 使用默认值", e);
                Self::default()
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        log::debug!("配置已保存到 {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("motion-sentinel-{}-{}", std::process::id(), name))
            .join("config.json")
    }

    #[test]
    fn test_presets_are_strictly_ordered() {
        let very = Sensitivity::VerySensitive.min_area();
        let default = Sensitivity::DefaultSensitive.min_area();
        let not = Sensitivity::NotSensitive.min_area();
        assert!(very < default && default < not);
        assert_eq!((very, default, not), (3000.0, 6000.0, 9000.0));
    }

    #[test]
    fn test_default_is_not_sensitive() {
        let config = DetectorConfig::default();
        assert_eq!(config.sensitivity, Sensitivity::NotSensitive);
        assert_eq!(config.min_area(), 9000.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_min_area_override_wins() {
        let config = DetectorConfig {
            sensitivity: Sensitivity::VerySensitive,
            min_area: Some(1234.0),
            ..Default::default()
        };
        assert_eq!(config.min_area(), 1234.0);
    }

    #[test]
    fn test_non_positive_min_area_rejected() {
        for bad in [0.0, -5.0, f64::NAN] {
            let config = DetectorConfig {
                min_area: Some(bad),
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(MotionError::Config(_))));
        }
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("roundtrip");
        let config = DetectorConfig {
            sensitivity: Sensitivity::DefaultSensitive,
            callback_queue: 8,
            ..Default::default()
        };
        config.save(&path).unwrap();
        let loaded = DetectorConfig::load(&path).unwrap();
        assert_eq!(loaded, config);
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: DetectorConfig =
            serde_json::from_str(r#"{ "sensitivity": "very_sensitive" }"#).unwrap();
        assert_eq!(config.min_area(), 3000.0);
        assert_eq!(config.callback_queue, 64);
        assert_eq!(config.background, BackgroundConfig::default());
    }

    #[test]
    fn test_load_or_default_creates_file() {
        let path = temp_path("create");
        let _ = fs::remove_dir_all(path.parent().unwrap());
        let config = DetectorConfig::load_or_default(&path);
        assert_eq!(config, DetectorConfig::default());
        assert!(path.exists());
        let _ = fs::remove_dir_all(path.parent().unwrap());
    }
}
