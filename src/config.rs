// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测配置 - 命令行参数 + 可选 JSON 文件
use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// 预缩放宽度上限的允许范围
pub const MAX_WIDTH_RANGE: (u32, u32) = (480, 1600);

/// letterbox 画布最小边长 (YOLO 最大下采样步长)
pub const MIN_INPUT_SIZE: u32 = 32;

/// 小于该字节数的模型文件视为下载不完整
pub const DEFAULT_MIN_MODEL_BYTES: u64 = 1024 * 1024;

/// 检测后端选择
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// 网络检测器 (失败时降级到 HOG)
    #[default]
    Auto,
    /// 仅使用 HOG 行人检测器
    Classical,
}

/// 核心检测参数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectConfig {
    pub backend: Backend,
    pub confidence_threshold: f32, // 网络检测置信度阈值
    pub iou_threshold: f32,        // 网络检测 NMS IOU阈值
    pub classical_iou_threshold: f32, // HOG 检测 NMS IOU阈值
    pub max_width: u32,            // 预缩放宽度上限
    pub input_size: u32,           // letterbox 画布边长
}

impl Default for DetectConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Auto,
            confidence_threshold: 0.25,
            iou_threshold: 0.45,
            classical_iou_threshold: 0.35,
            max_width: 960,
            input_size: 640,
        }
    }
}

impl DetectConfig {
    /// 从JSON文件加载配置, 解析失败时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️ 配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("⚠️ 配置文件读取失败: {}, 使用默认值", e);
                Self::default()
            }
        }
    }

    /// letterbox 画布边长, 不小于 32
    pub fn effective_input_size(&self) -> u32 {
        self.input_size.max(MIN_INPUT_SIZE)
    }

    /// 限制在 [480, 1600] 内的宽度上限
    pub fn effective_max_width(&self) -> u32 {
        self.max_width.clamp(MAX_WIDTH_RANGE.0, MAX_WIDTH_RANGE.1)
    }
}

/// 命令行参数
#[derive(Parser, Clone, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// 输入图片路径
    pub source: PathBuf,

    /// 检测后端
    #[arg(long, value_enum)]
    pub backend: Option<Backend>,

    /// 网络检测置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// 网络检测 NMS IOU阈值
    #[arg(long)]
    pub iou: Option<f32>,

    /// HOG 检测 NMS IOU阈值
    #[arg(long)]
    pub classical_iou: Option<f32>,

    /// 预缩放宽度上限 (480-1600)
    #[arg(long)]
    pub max_width: Option<u32>,

    /// JSON 配置文件, 命令行参数优先
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// ONNX 模型路径
    #[arg(long)]
    pub model: Option<PathBuf>,

    /// 模型缺失时的下载地址
    #[arg(long)]
    pub model_url: Option<String>,

    /// 模型文件最小字节数
    #[arg(long, default_value_t = DEFAULT_MIN_MODEL_BYTES)]
    pub min_model_bytes: u64,

    /// ONNX Runtime 线程数
    #[arg(long, default_value_t = 4)]
    pub threads: usize,

    /// 格式化输出 JSON
    #[arg(long)]
    pub pretty: bool,
}

impl Args {
    /// 合并配置文件与命令行参数
    pub fn detect_config(&self) -> DetectConfig {
        let mut config = match &self.config {
            Some(path) => DetectConfig::load(path),
            None => DetectConfig::default(),
        };
        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if let Some(conf) = self.conf {
            config.confidence_threshold = conf;
        }
        if let Some(iou) = self.iou {
            config.iou_threshold = iou;
        }
        if let Some(iou) = self.classical_iou {
            config.classical_iou_threshold = iou;
        }
        if let Some(max_width) = self.max_width {
            config.max_width = max_width;
        }
        config
    }

    /// 模型路径, 默认放在用户缓存目录
    pub fn model_path(&self) -> PathBuf {
        self.model.clone().unwrap_or_else(default_model_path)
    }
}

pub fn default_model_path() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("people-counter")
        .join("yolov8n.onnx")
}
