// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 单帧人数统计 (People Counter)
//!
//! 原始检测输出 → 去重后的行人框 + 置信度:
//! - 网络检测器 (YOLOv8/YOLOv11 ONNX): letterbox → 推理 → 解码 → NMS
//! - 传统检测器 (HOG + SVM): 检测 → 权重解析 → NMS
//!
//! 网络后端失败时自动降级到传统后端, 见 [`Detector`].
pub mod config; // 检测配置参数
pub mod detection; // 检测编排 (后端选择 + 降级)
pub mod error;
pub mod models; // 检测器接口与具体实现
pub mod utils; // 图像预处理

use serde::{Deserialize, Serialize};

pub use crate::config::{Args, Backend, DetectConfig};
pub use crate::detection::{DetectionResult, Detector, DetectorBuilder, DetectorKind};
pub use crate::error::{DetectError, ProvisionError};
pub use crate::models::{ClassicalDetector, ClassicalOutput, NetworkModel, RowLayout};
pub use crate::utils::letterbox::Letterbox;

/// 轴对齐检测框, 整数像素坐标, 左上角为原点
///
/// 允许 w/h 为 0 或负数 (退化框), 面积按 0 计算.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Bbox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Bbox {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn xmax(&self) -> i64 {
        self.x as i64 + self.w as i64
    }

    pub fn ymax(&self) -> i64 {
        self.y as i64 + self.h as i64
    }

    pub fn area(&self) -> i64 {
        (self.w.max(0) as i64) * (self.h.max(0) as i64)
    }

    pub fn intersection_area(&self, another: &Bbox) -> i64 {
        let l = (self.x as i64).max(another.x as i64);
        let t = (self.y as i64).max(another.y as i64);
        let r = self.xmax().min(another.xmax());
        let b = self.ymax().min(another.ymax());
        (r - l).max(0) * (b - t).max(0)
    }

    /// 交并比, 并集为 0 时返回 0.0
    pub fn iou(&self, another: &Bbox) -> f32 {
        let inter = self.intersection_area(another);
        let union = self.area() + another.area() - inter;
        if union <= 0 {
            return 0.0;
        }
        (inter as f64 / union as f64) as f32
    }
}

/// 带分数的检测框
///
/// HOG 的 SVM 权重未归一化, 分数可能大于 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDetection {
    pub bbox: Bbox,
    pub score: f32,
}

impl ScoredDetection {
    pub fn new(bbox: Bbox, score: f32) -> Self {
        Self { bbox, score }
    }
}

/// 贪心 NMS, 返回保留下来的下标 (按分数从高到低)
///
/// 分数相同时保持输入顺序. 与已保留框 IoU >= 阈值的候选被丢弃.
pub fn non_max_suppression(boxes: &[Bbox], scores: &[f32], iou_threshold: f32) -> Vec<usize> {
    let n = boxes.len().min(scores.len());
    let mut idxs: Vec<usize> = (0..n).collect();
    // sort_by 是稳定排序
    idxs.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut keep = Vec::new();
    while !idxs.is_empty() {
        let current = idxs.remove(0);
        keep.push(current);
        idxs.retain(|&i| boxes[current].iou(&boxes[i]) < iou_threshold);
    }
    keep
}

/// [`non_max_suppression`] 的便捷版本, 直接作用于 `ScoredDetection`
pub fn suppress(detections: Vec<ScoredDetection>, iou_threshold: f32) -> Vec<ScoredDetection> {
    let boxes: Vec<Bbox> = detections.iter().map(|d| d.bbox).collect();
    let scores: Vec<f32> = detections.iter().map(|d| d.score).collect();
    non_max_suppression(&boxes, &scores, iou_threshold)
        .into_iter()
        .map(|i| detections[i])
        .collect()
}
