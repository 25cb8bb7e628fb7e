// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 网络输出解码
// 不同导出方式的输出张量形状不一: [1, 84, 8400] / [8400, 84] / [1, 25200, 85] ...
// 这里统一成 "每行一个候选框" 的二维矩阵, 再取行人类别分数、还原坐标、NMS

use ndarray::{Array2, ArrayD, ArrayView1, ArrayView2, Axis, Ix2};
use tracing::debug;

use crate::utils::letterbox::Letterbox;
use crate::{suppress, Bbox, ScoredDetection};

/// 行人类别 (COCO class 0)
pub const PERSON_CLASS: usize = 0;

/// 输出行的布局, 由行宽决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowLayout {
    /// 85 列: `cx, cy, w, h, objectness, 80 类分数` (YOLOv5 / YOLOX)
    ///
    /// 分数 = objectness × 行人类别分数
    WithObjectness,
    /// 84 列: `cx, cy, w, h, 80 类分数`, 没有 objectness (YOLOv8 / YOLOv11)
    ///
    /// 下标 4 按行人类别分数处理. 部分 84 列导出把 objectness 放在下标 4,
    /// 这类模型不在支持范围内.
    ClassScores,
}

impl RowLayout {
    pub const OBJECTNESS_WIDTH: usize = 85;
    pub const CLASS_SCORES_WIDTH: usize = 84;
    /// 小于该宽度的行视为格式错误
    pub const MIN_WIDTH: usize = 6;

    /// 根据行宽判断布局, 宽度不足时返回 `None`
    ///
    /// 除 85 以外的合法宽度都按 `ClassScores` 处理.
    pub fn classify(width: usize) -> Option<Self> {
        if width < Self::MIN_WIDTH {
            None
        } else if width == Self::OBJECTNESS_WIDTH {
            Some(RowLayout::WithObjectness)
        } else {
            Some(RowLayout::ClassScores)
        }
    }

    /// 行人置信度
    pub fn person_score(&self, row: ArrayView1<f32>) -> f32 {
        match self {
            RowLayout::WithObjectness => row[4] * row[5 + PERSON_CLASS],
            RowLayout::ClassScores => row[4 + PERSON_CLASS],
        }
    }
}

/// 解码参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeParams {
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    /// 还原后宽或高小于该值的框被丢弃
    pub min_size: i32,
}

impl Default for DecodeParams {
    fn default() -> Self {
        Self {
            conf_threshold: 0.25,
            iou_threshold: 0.45,
            min_size: 8,
        }
    }
}

/// 将模型输出整理成 `[候选数, 行宽]`
///
/// 1. 只有一个输出时直接取出 (多个输出时第一个是检测头)
/// 2. 去掉大小为 1 的 batch 维
/// 3. 二维且第一维是 84/85、第二维更大时转置 (channels-first)
/// 4. 其余形状按最后一维 reshape 成 `(-1, last)`
pub fn normalize_output(outputs: &[ArrayD<f32>]) -> Array2<f32> {
    let Some(first) = outputs.first() else {
        return Array2::zeros((0, 0));
    };

    let mut x = first.view();
    if x.ndim() > 2 && x.shape()[0] == 1 {
        x = x.index_axis_move(Axis(0), 0);
    }

    if x.ndim() == 2 {
        let (s0, s1) = (x.shape()[0], x.shape()[1]);
        let channels_first = (s0 == RowLayout::CLASS_SCORES_WIDTH
            || s0 == RowLayout::OBJECTNESS_WIDTH)
            && s1 > s0;
        let x = match x.into_dimensionality::<Ix2>() {
            Ok(x) => x,
            Err(_) => return Array2::zeros((0, 0)),
        };
        return if channels_first {
            x.t().as_standard_layout().into_owned()
        } else {
            x.as_standard_layout().into_owned()
        };
    }

    let last = match x.shape().last() {
        Some(&last) if last > 0 => last,
        _ => return Array2::zeros((0, 0)),
    };
    let rows = x.len() / last;
    let flat: Vec<f32> = x.iter().copied().collect();
    Array2::from_shape_vec((rows, last), flat).unwrap_or_else(|_| Array2::zeros((0, 0)))
}

/// 解码候选框 (不做 NMS)
///
/// 坐标先减去 letterbox 填充再除以缩放比例, 然后裁剪到 `[0, w-1] x [0, h-1]`.
pub fn decode(
    rows: ArrayView2<f32>,
    lb: &Letterbox,
    frame_size: (u32, u32),
    params: &DecodeParams,
) -> Vec<ScoredDetection> {
    let Some(layout) = RowLayout::classify(rows.ncols()) else {
        debug!("输出行宽 {} 过小, 跳过 {} 行", rows.ncols(), rows.nrows());
        return Vec::new();
    };

    let max_x = frame_size.0.saturating_sub(1) as f32;
    let max_y = frame_size.1.saturating_sub(1) as f32;

    let mut ys = Vec::new();
    for row in rows.rows() {
        let score = layout.person_score(row);
        // NaN 同样被拒绝
        if !(score >= params.conf_threshold) {
            continue;
        }

        let (cx, cy, w, h) = (row[0], row[1], row[2], row[3]);
        let (x1, y1) = lb.to_source(cx - w / 2., cy - h / 2.);
        let (x2, y2) = lb.to_source(cx + w / 2., cy + h / 2.);
        let x1 = x1.clamp(0.0, max_x);
        let y1 = y1.clamp(0.0, max_y);
        let x2 = x2.clamp(0.0, max_x);
        let y2 = y2.clamp(0.0, max_y);

        let bbox = Bbox::new(
            x1 as i32,
            y1 as i32,
            (x2 - x1) as i32,
            (y2 - y1) as i32,
        );
        if bbox.w < params.min_size || bbox.h < params.min_size {
            continue;
        }
        ys.push(ScoredDetection::new(bbox, score));
    }
    ys
}

/// 完整后处理: 整理形状 → 解码 → NMS
pub fn postprocess(
    outputs: &[ArrayD<f32>],
    lb: &Letterbox,
    frame_size: (u32, u32),
    params: &DecodeParams,
) -> Vec<ScoredDetection> {
    let rows = normalize_output(outputs);
    let candidates = decode(rows.view(), lb, frame_size, params);
    let n = candidates.len();
    let kept = suppress(candidates, params.iou_threshold);
    debug!(
        "解码: {}行 → {}个候选 → NMS后{}个",
        rows.nrows(),
        n,
        kept.len()
    );
    kept
}
