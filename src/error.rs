use std::fmt;

use thiserror::Error;

/// 移动侦测错误类型
/// Top-level error type for the motion detector.
#[derive(Debug, Error)]
pub enum MotionError {
    #[error("could not open frame source: {0}")]
    SourceOpen(String),

    #[error("video device closed")]
    DeviceClosed,

    #[error("motion detector is closed")]
    Closed,

    #[error("no frame has been captured yet")]
    NoFrame,

    #[error("snapshot encoding failed: {0}")]
    Encode(#[from] image::ImageError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MotionError>;

/// 单个资源释放失败
#[derive(Debug)]
pub struct ReleaseFailure {
    pub resource: &'static str,
    pub error: anyhow::Error,
}

/// Every release failure collected while closing a detector.
///
/// Close keeps going after a failed release, so this may hold several entries.
#[derive(Debug)]
pub struct CloseError {
    pub failures: Vec<ReleaseFailure>,
}

impl CloseError {
    pub fn resources(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.resource).collect()
    }
}

impl fmt::Display for CloseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} resource(s) failed to release", self.failures.len())?;
        for failure in &self.failures {
            write!(f, "; {}: {:#}", failure.resource, failure.error)?;
        }
        Ok(())
    }
}

impl std::error::Error for CloseError {}
