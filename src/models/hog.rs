// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 传统行人检测 (HOG + 线性 SVM)
// 不依赖外部模型文件, 作为网络检测器不可用时的兜底后端

use anyhow::Result;
use image::RgbImage;
use tracing::warn;

use crate::Bbox;

/// 传统检测器的原始输出
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClassicalOutput {
    /// 候选区域 (x, y, w, h)
    pub regions: Vec<Bbox>,
    /// 与 `regions` 一一对应的 SVM 权重, 部分实现不提供
    pub weights: Option<Vec<f64>>,
}

/// 传统检测器接口
///
/// 输入为宽度受限后的原图 (不做 letterbox).
pub trait ClassicalDetector: Send + Sync {
    fn detect(&self, image: &RgbImage) -> Result<ClassicalOutput>;
}

/// 分数来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WeightSource {
    /// 使用检测器给出的权重
    Detector,
    /// 权重缺失
    Missing,
    /// 权重数量与候选数不一致, 或包含 NaN/inf
    Unparsable,
}

/// 由 SVM 权重得到每个候选的分数
///
/// 依次尝试:
/// 1. 权重存在、数量与候选一致且全部有限 → 原样使用 (可能大于 1)
/// 2. 权重缺失 → 全部 1.0
/// 3. 其它情况 → 全部 1.0
pub fn scores_from_weights(weights: Option<&[f64]>, n: usize) -> (Vec<f32>, WeightSource) {
    match weights {
        Some(ws) if ws.len() == n && ws.iter().all(|w| w.is_finite()) => {
            (ws.iter().map(|&w| w as f32).collect(), WeightSource::Detector)
        }
        None => (vec![1.0; n], WeightSource::Missing),
        Some(ws) => {
            warn!(
                "⚠️ HOG 权重无法解析 ({}个权重/{}个候选), 使用统一分数 1.0",
                ws.len(),
                n
            );
            (vec![1.0; n], WeightSource::Unparsable)
        }
    }
}

#[cfg(feature = "hog")]
pub use self::opencv_hog::{HogParams, HogPeopleDetector};

#[cfg(feature = "hog")]
mod opencv_hog {
    use std::sync::Mutex;

    use anyhow::{anyhow, Context, Result};
    use image::RgbImage;
    use opencv::core::{Mat, Rect, Size, Vector};
    use opencv::imgproc;
    use opencv::objdetect::HOGDescriptor;
    use opencv::prelude::*;
    use tracing::{debug, info};

    use super::{ClassicalDetector, ClassicalOutput};
    use crate::Bbox;

    /// detectMultiScale 参数 (比 OpenCV 默认值更灵敏)
    #[derive(Debug, Clone, Copy)]
    pub struct HogParams {
        pub win_stride: (i32, i32),
        pub padding: (i32, i32),
        pub scale: f64,
        pub hit_threshold: f64,
        pub final_threshold: f64,
    }

    impl Default for HogParams {
        fn default() -> Self {
            Self {
                win_stride: (6, 6),
                padding: (10, 10),
                scale: 1.04,
                hit_threshold: 0.0,
                final_threshold: 2.0,
            }
        }
    }

    /// OpenCV 内置行人检测器
    pub struct HogPeopleDetector {
        hog: Mutex<HOGDescriptor>,
        params: HogParams,
    }

    impl HogPeopleDetector {
        pub fn new() -> Result<Self> {
            Self::with_params(HogParams::default())
        }

        pub fn with_params(params: HogParams) -> Result<Self> {
            let mut hog = HOGDescriptor::default()?;
            let svm = HOGDescriptor::get_default_people_detector()?;
            hog.set_svm_detector(&svm)?;
            info!("✅ HOG 行人检测器初始化完成");
            Ok(Self {
                hog: Mutex::new(hog),
                params,
            })
        }
    }

    impl ClassicalDetector for HogPeopleDetector {
        fn detect(&self, image: &RgbImage) -> Result<ClassicalOutput> {
            let (w, h) = image.dimensions();
            let rgb = Mat::from_slice(image.as_raw().as_slice())?.reshape(3, h as i32)?;
            let mut bgr = Mat::default();
            imgproc::cvt_color(&rgb, &mut bgr, imgproc::COLOR_RGB2BGR, 0)?;

            let mut found = Vector::<Rect>::new();
            let mut weights = Vector::<f64>::new();
            let mut hog = self
                .hog
                .lock()
                .map_err(|_| anyhow!("HOG descriptor mutex poisoned"))?;
            hog.detect_multi_scale_weights(
                &bgr,
                &mut found,
                &mut weights,
                self.params.hit_threshold,
                Size::new(self.params.win_stride.0, self.params.win_stride.1),
                Size::new(self.params.padding.0, self.params.padding.1),
                self.params.scale,
                self.params.final_threshold,
                false,
            )
            .with_context(|| format!("HOG detectMultiScale failed on {}x{} frame", w, h))?;
            drop(hog);

            let regions: Vec<Bbox> = found
                .iter()
                .map(|r| Bbox::new(r.x, r.y, r.width, r.height))
                .collect();
            debug!("HOG: {}个候选", regions.len());

            Ok(ClassicalOutput {
                regions,
                weights: Some(weights.to_vec()),
            })
        }
    }
}
