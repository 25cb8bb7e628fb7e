/// 检测器接口与实现
///
/// # 架构说明
///
/// ## 网络检测器 (NetworkModel)
/// - **YOLOv8**: ONNX Runtime 推理, 输入 letterbox 后的 NCHW 张量
///   - 输出原始张量, 由 `decoder` 统一解码
///   - 文件: `yolov8.rs` (feature `onnx`)
///
/// ## 传统检测器 (ClassicalDetector)
/// - **HOG**: OpenCV HOG + 默认行人 SVM, 无需模型文件
///   - 文件: `hog.rs` (feature `hog`)
///
/// ## 流程
/// ```text
/// 网络: letterbox → NetworkModel::forward → decoder::postprocess → 检测框
/// 传统: ClassicalDetector::detect → scores_from_weights → NMS → 检测框
/// ```
use anyhow::Result;
use ndarray::{Array4, ArrayD};

pub mod decoder;
pub mod hog;
pub mod provision;
#[cfg(feature = "onnx")]
pub mod yolov8;

pub use decoder::{decode, normalize_output, postprocess, DecodeParams, RowLayout};
#[cfg(feature = "hog")]
pub use hog::HogPeopleDetector;
pub use hog::{scores_from_weights, ClassicalDetector, ClassicalOutput, WeightSource};
pub use provision::{ensure_model, ModelSource};
#[cfg(feature = "onnx")]
pub use yolov8::{OrtConfig, YOLOv8};

/// 网络检测器: letterbox 画布张量 → 原始输出张量
///
/// 实现需要是 `Send + Sync`, 由多个请求共享.
pub trait NetworkModel: Send + Sync {
    /// 输入画布尺寸 (宽, 高)
    fn input_size(&self) -> (u32, u32);

    /// 一次前向推理, 返回模型全部输出 (通常只有一个)
    fn forward(&self, blob: Array4<f32>) -> Result<Vec<ArrayD<f32>>>;
}
