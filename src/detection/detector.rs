// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 选择后端 → 预处理 → 推理 → 后处理 → DetectionResult
//!
//! 网络后端初始化或推理失败时降级到传统后端, 请求本身仍然成功,
//! 结果里带上 warning.

use std::time::Instant;

use anyhow::anyhow;
use image::RgbImage;
use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use super::types::{DetectionResult, DetectorKind};
use crate::config::{Backend, DetectConfig};
use crate::error::DetectError;
use crate::models::{postprocess, scores_from_weights, ClassicalDetector, DecodeParams, NetworkModel};
use crate::utils::{cap_width, letterbox, to_nchw};
use crate::{suppress, ScoredDetection};

type NetworkFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn NetworkModel>> + Send + Sync>;
type ClassicalFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn ClassicalDetector>> + Send + Sync>;

/// 构建 [`Detector`]
///
/// 后端以工厂函数形式注入, 第一次用到时才创建.
pub struct DetectorBuilder {
    config: DetectConfig,
    network: Option<NetworkFactory>,
    classical: Option<ClassicalFactory>,
}

impl DetectorBuilder {
    pub fn new(config: DetectConfig) -> Self {
        Self {
            config,
            network: None,
            classical: None,
        }
    }

    pub fn network<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn NetworkModel>> + Send + Sync + 'static,
    {
        self.network = Some(Box::new(factory));
        self
    }

    pub fn classical<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn ClassicalDetector>> + Send + Sync + 'static,
    {
        self.classical = Some(Box::new(factory));
        self
    }

    pub fn build(self) -> Detector {
        Detector {
            config: self.config,
            network_factory: self.network,
            classical_factory: self.classical,
            network: OnceCell::new(),
            classical: OnceCell::new(),
        }
    }
}

/// 检测服务, 多个请求共享同一个实例
///
/// 两个后端句柄各自只初始化一次; 并发的首次调用会阻塞等待.
/// 初始化失败不会被缓存, 下一次请求重新尝试.
pub struct Detector {
    config: DetectConfig,
    network_factory: Option<NetworkFactory>,
    classical_factory: Option<ClassicalFactory>,
    network: OnceCell<Box<dyn NetworkModel>>,
    classical: OnceCell<Box<dyn ClassicalDetector>>,
}

impl Detector {
    pub fn builder(config: DetectConfig) -> DetectorBuilder {
        DetectorBuilder::new(config)
    }

    pub fn config(&self) -> &DetectConfig {
        &self.config
    }

    /// 检测一帧
    ///
    /// `None` 表示请求里没有图片, 返回 [`DetectError::NoImage`].
    pub fn detect(&self, image: Option<&RgbImage>) -> Result<DetectionResult, DetectError> {
        let image = image.ok_or(DetectError::NoImage)?;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(DetectError::EmptyImage { width, height });
        }

        let t = Instant::now();
        let frame = cap_width(image, self.config.effective_max_width());
        let frame_size = frame.dimensions();
        debug!(
            "[Preprocess] {}x{} → {}x{}: {:?}",
            width,
            height,
            frame_size.0,
            frame_size.1,
            t.elapsed()
        );

        let mut warning = None;
        if self.config.backend == Backend::Auto {
            match self.detect_network(&frame) {
                Ok(ys) => {
                    return Ok(DetectionResult::new(
                        DetectorKind::Network,
                        ys,
                        frame_size,
                        None,
                    ))
                }
                Err(e) => {
                    let msg = format!("network backend unavailable ({}): {}", e.category(), e);
                    warn!("⚠️ {}, 降级到 HOG", msg);
                    warning = Some(msg);
                }
            }
        }

        let ys = self.detect_classical(&frame)?;
        Ok(DetectionResult::new(
            DetectorKind::Classical,
            ys,
            frame_size,
            warning,
        ))
    }

    /// 解码 JPEG/PNG 等编码图片后检测, 无法解码视为没有图片
    pub fn detect_bytes(&self, bytes: &[u8]) -> Result<DetectionResult, DetectError> {
        let image = match image::load_from_memory(bytes) {
            Ok(img) => Some(img.to_rgb8()),
            Err(e) => {
                debug!("图片解码失败: {}", e);
                None
            }
        };
        self.detect(image.as_ref())
    }

    /// 提前初始化后端, 返回可用的后端
    ///
    /// Auto 模式下网络后端初始化失败时改为初始化 HOG.
    pub fn warm_up(&self) -> Result<DetectorKind, DetectError> {
        if self.config.backend == Backend::Auto {
            match self.network() {
                Ok(_) => return Ok(DetectorKind::Network),
                Err(e) => warn!("⚠️ 网络后端预热失败 ({}): {}", e.category(), e),
            }
        }
        self.classical()?;
        Ok(DetectorKind::Classical)
    }

    fn network(&self) -> Result<&dyn NetworkModel, DetectError> {
        self.network
            .get_or_try_init(|| -> anyhow::Result<Box<dyn NetworkModel>> {
                let t = Instant::now();
                let factory = self
                    .network_factory
                    .as_ref()
                    .ok_or_else(|| anyhow!("no network backend configured"))?;
                let model = factory()?;
                let (w, h) = model.input_size();
                info!("✅ 网络检测器就绪: 输入{}x{} ({:?})", w, h, t.elapsed());
                Ok(model)
            })
            .map(|m| &**m)
            .map_err(DetectError::NetworkInit)
    }

    fn classical(&self) -> Result<&dyn ClassicalDetector, DetectError> {
        self.classical
            .get_or_try_init(|| -> anyhow::Result<Box<dyn ClassicalDetector>> {
                let t = Instant::now();
                let factory = self
                    .classical_factory
                    .as_ref()
                    .ok_or_else(|| anyhow!("no classical backend configured"))?;
                let detector = factory()?;
                info!("✅ HOG 检测器就绪 ({:?})", t.elapsed());
                Ok(detector)
            })
            .map(|d| &**d)
            .map_err(DetectError::Classical)
    }

    fn detect_network(&self, frame: &RgbImage) -> Result<Vec<ScoredDetection>, DetectError> {
        let model = self.network()?;
        let (nw, nh) = model.input_size();
        if nw == 0 || nh == 0 {
            return Err(DetectError::Inference(anyhow!(
                "invalid input size {}x{}",
                nw,
                nh
            )));
        }

        let t_pre = Instant::now();
        let (canvas, lb) = letterbox(frame, nw, nh);
        let blob = to_nchw(&canvas);
        debug!("[Model Preprocess]: {:?}", t_pre.elapsed());

        let t_run = Instant::now();
        let outputs = model.forward(blob).map_err(DetectError::Inference)?;
        debug!("[Model Inference]: {:?}", t_run.elapsed());

        let t_post = Instant::now();
        let params = DecodeParams {
            conf_threshold: self.config.confidence_threshold,
            iou_threshold: self.config.iou_threshold,
            ..Default::default()
        };
        let ys = postprocess(&outputs, &lb, frame.dimensions(), &params);
        debug!("[Model Postprocess]: {:?}", t_post.elapsed());
        Ok(ys)
    }

    fn detect_classical(&self, frame: &RgbImage) -> Result<Vec<ScoredDetection>, DetectError> {
        let detector = self.classical()?;

        let t = Instant::now();
        let output = detector.detect(frame).map_err(DetectError::Classical)?;
        let (scores, source) = scores_from_weights(output.weights.as_deref(), output.regions.len());
        let candidates: Vec<ScoredDetection> = output
            .regions
            .into_iter()
            .zip(scores)
            .map(|(bbox, score)| ScoredDetection::new(bbox, score))
            .collect();
        let n = candidates.len();
        let ys = suppress(candidates, self.config.classical_iou_threshold);
        debug!(
            "[HOG] {}个候选 (分数: {:?}) → NMS后{}个: {:?}",
            n,
            source,
            ys.len(),
            t.elapsed()
        );
        Ok(ys)
    }
}
