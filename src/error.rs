// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("no image provided")]
    NoImage,

    #[error("image dimensions are zero: {width}x{height}")]
    EmptyImage { width: u32, height: u32 },

    #[error("network detector initialization failed: {0:#}")]
    NetworkInit(#[source] anyhow::Error),

    #[error("network inference failed: {0:#}")]
    Inference(#[source] anyhow::Error),

    #[error("classical detector failed: {0:#}")]
    Classical(#[source] anyhow::Error),
}

impl DetectError {
    /// 错误类别, 用于降级时的 warning 文本
    pub fn category(&self) -> &'static str {
        match self {
            DetectError::NoImage => "no-image",
            DetectError::EmptyImage { .. } => "empty-image",
            DetectError::NetworkInit(_) => "initialization",
            DetectError::Inference(_) => "inference",
            DetectError::Classical(_) => "classical",
        }
    }
}

/// 模型文件准备失败
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("model file {path:?} is missing and no download url is configured")]
    NoSource { path: PathBuf },

    #[error("failed to download model from {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("model file {path:?} is too small: {size} bytes (min: {min})")]
    TooSmall { path: PathBuf, size: u64, min: u64 },

    #[error("model file io error: {0}")]
    Io(#[from] std::io::Error),
}
