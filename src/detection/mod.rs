/// 检测编排 (Detection)
///
/// - Detector: 后端选择 + 网络失败降级到 HOG
/// - types:    检测结果与响应格式
pub mod detector;
pub mod types;

pub use detector::{Detector, DetectorBuilder};
pub use types::{DetectionResult, DetectorKind};
