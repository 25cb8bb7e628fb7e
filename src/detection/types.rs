// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测结果数据结构
/// Data structures for detection results
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{Bbox, ScoredDetection};

/// 实际执行的检测后端
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectorKind {
    Classical,
    Network,
}

impl std::fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DetectorKind::Classical => write!(f, "classical"),
            DetectorKind::Network => write!(f, "network"),
        }
    }
}

/// 单帧检测结果
///
/// `boxes` 与 `scores` 一一对应, 按分数从高到低排列.
/// 坐标基于宽度受限后的工作帧 (`width` x `height`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub detector: DetectorKind,
    pub boxes: Vec<Bbox>,
    pub scores: Vec<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl DetectionResult {
    pub fn new(
        detector: DetectorKind,
        detections: Vec<ScoredDetection>,
        frame_size: (u32, u32),
        warning: Option<String>,
    ) -> Self {
        let (boxes, scores) = detections.into_iter().map(|d| (d.bbox, d.score)).unzip();
        Self {
            detector,
            boxes,
            scores,
            warning,
            width: frame_size.0,
            height: frame_size.1,
        }
    }

    pub fn count(&self) -> usize {
        self.boxes.len()
    }

    /// 成对遍历 (框, 分数)
    pub fn iter(&self) -> impl Iterator<Item = (&Bbox, f32)> + '_ {
        self.boxes.iter().zip(self.scores.iter().copied())
    }

    /// `/count` 接口的响应体
    ///
    /// `{"ok": true, "count": n, "detector": "...", "boxes": [{x,y,w,h}], "scores": [...]}`,
    /// 有降级信息时附带 `"warning"`.
    pub fn to_response(&self) -> Value {
        let mut body = json!({
            "ok": true,
            "count": self.count(),
            "detector": self.detector,
            "boxes": self.boxes,
            "scores": self.scores,
        });
        if let Some(warning) = &self.warning {
            body["warning"] = json!(warning);
        }
        body
    }
}
