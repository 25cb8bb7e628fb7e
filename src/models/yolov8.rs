// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// YOLOv8 ONNX 推理
// 只负责: 模型加载、前向推理; 预处理与解码在 utils::letterbox / models::decoder

use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use ndarray::{Array4, ArrayD, IxDyn};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use ort::value::Value;
use tracing::{debug, info};

use super::NetworkModel;

/// ONNX Runtime 会话配置
#[derive(Debug, Clone)]
pub struct OrtConfig {
    pub f: PathBuf,
    pub intra_threads: usize,
    /// (height, width)
    pub image_size: (u32, u32),
}

impl OrtConfig {
    pub fn new(f: impl Into<PathBuf>) -> Self {
        Self {
            f: f.into(),
            intra_threads: 4,
            image_size: (640, 640),
        }
    }
}

/// YOLOv8 (COCO 80类) 网络检测器
pub struct YOLOv8 {
    // Session::run 需要 &mut, 多请求共享时串行推理
    session: Mutex<Session>,
    height: u32,
    width: u32,
}

impl YOLOv8 {
    /// 从配置创建 YOLOv8 模型
    pub fn new(config: OrtConfig) -> Result<Self> {
        let t = std::time::Instant::now();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(config.intra_threads.max(1))?
            .commit_from_file(&config.f)
            .with_context(|| format!("failed to load ONNX model {}", config.f.display()))?;

        let (height, width) = config.image_size;
        let model = Self {
            session: Mutex::new(session),
            height,
            width,
        };
        info!(
            "✅ YOLOv8 模型加载完成: {} ({:?})",
            config.f.display(),
            t.elapsed()
        );
        model.summary();
        Ok(model)
    }

    pub fn summary(&self) {
        if let Ok(session) = self.session.lock() {
            let inputs: Vec<&str> = session.inputs.iter().map(|i| i.name.as_str()).collect();
            let outputs: Vec<&str> = session.outputs.iter().map(|o| o.name.as_str()).collect();
            debug!(
                "YOLOv8 summary: inputs={:?} outputs={:?} image_size={}x{}",
                inputs, outputs, self.width, self.height
            );
        }
    }
}

impl NetworkModel for YOLOv8 {
    fn input_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn forward(&self, blob: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        let shape = blob.shape().to_vec();
        let (data, offset) = blob.into_raw_vec_and_offset();
        if offset.unwrap_or(0) != 0 {
            return Err(anyhow!("input tensor is not contiguous"));
        }
        let input = Value::from_array((shape, data))?;

        let t = std::time::Instant::now();
        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX session mutex poisoned"))?;
        let outputs = session.run(ort::inputs![input])?;

        let mut ys = Vec::with_capacity(outputs.len());
        for i in 0..outputs.len() {
            let (shape, data) = outputs[i].try_extract_tensor::<f32>()?;
            let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();
            ys.push(ArrayD::from_shape_vec(IxDyn(&dims), data.to_vec())?);
        }
        debug!("[Model Inference]: {:?}", t.elapsed());
        Ok(ys)
    }
}
