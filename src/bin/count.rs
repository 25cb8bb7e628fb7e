// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 单帧人数统计 (命令行)
///
/// 读取一张图片 → 检测 → 输出 `/count` 格式的 JSON
///
/// 后端:
/// - auto:      YOLOv8 ONNX, 失败时降级到 HOG
/// - classical: 仅 HOG
use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;

use people_counter::models::{ClassicalDetector, HogPeopleDetector};
use people_counter::{Args, DetectError, Detector};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = args.detect_config();
    info!("🚀 检测配置: {:?}", config);

    let builder = Detector::builder(config.clone()).classical(|| {
        Ok(Box::new(HogPeopleDetector::new()?) as Box<dyn ClassicalDetector>)
    });

    #[cfg(feature = "onnx")]
    let builder = {
        use people_counter::models::{ensure_model, ModelSource, NetworkModel, OrtConfig, YOLOv8};

        let source = ModelSource {
            path: args.model_path(),
            url: args.model_url.clone(),
            min_bytes: args.min_model_bytes,
        };
        let threads = args.threads;
        let size = config.effective_input_size();
        builder.network(move || {
            let f = ensure_model(&source)?;
            let model = YOLOv8::new(OrtConfig {
                f,
                intra_threads: threads,
                image_size: (size, size),
            })?;
            Ok(Box::new(model) as Box<dyn NetworkModel>)
        })
    };

    let detector = builder.build();

    let bytes = std::fs::read(&args.source)
        .with_context(|| format!("failed to read {}", args.source.display()))?;
    let body = match detector.detect_bytes(&bytes) {
        Ok(result) => {
            info!("👥 {}人 (后端: {})", result.count(), result.detector);
            result.to_response()
        }
        Err(e @ DetectError::NoImage) => {
            serde_json::json!({ "ok": false, "error": "No image provided", "detail": e.to_string() })
        }
        Err(e) => return Err(e.into()),
    };

    let out = if args.pretty {
        serde_json::to_string_pretty(&body)?
    } else {
        serde_json::to_string(&body)?
    };
    println!("{}", out);
    Ok(())
}
