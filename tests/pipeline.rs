// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Result};
use image::RgbImage;
use ndarray::{Array4, ArrayD, IxDyn};

use people_counter::{
    Backend, Bbox, ClassicalDetector, ClassicalOutput, DetectConfig, DetectError, Detector,
    DetectorKind, NetworkModel,
};

const ANCHORS: usize = 8400;

/// 固定输出的网络检测器, 输出形状 (1, 84, 8400), 其余候选全为 0
struct FakeYolo {
    rows: Vec<[f32; 5]>,
}

impl NetworkModel for FakeYolo {
    fn input_size(&self) -> (u32, u32) {
        (640, 640)
    }

    fn forward(&self, blob: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        assert_eq!(blob.shape(), &[1, 3, 640, 640]);
        let mut y = ArrayD::<f32>::zeros(IxDyn(&[1, 84, ANCHORS]));
        for (i, row) in self.rows.iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                y[[0, c, i]] = *v;
            }
        }
        Ok(vec![y])
    }
}

struct BrokenYolo;

impl NetworkModel for BrokenYolo {
    fn input_size(&self) -> (u32, u32) {
        (640, 640)
    }

    fn forward(&self, _blob: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        Err(anyhow!("output shape mismatch"))
    }
}

/// 输入尺寸为 0 的网络检测器 (配置错误的模型)
struct ZeroSizedYolo;

impl NetworkModel for ZeroSizedYolo {
    fn input_size(&self) -> (u32, u32) {
        (0, 0)
    }

    fn forward(&self, _blob: Array4<f32>) -> Result<Vec<ArrayD<f32>>> {
        Ok(vec![])
    }
}

struct FakeHog;

impl ClassicalDetector for FakeHog {
    fn detect(&self, _image: &RgbImage) -> Result<ClassicalOutput> {
        Ok(ClassicalOutput {
            regions: vec![Bbox::new(10, 10, 40, 80), Bbox::new(12, 12, 40, 80)],
            weights: Some(vec![1.3, 0.7]),
        })
    }
}

fn hog() -> Result<Box<dyn ClassicalDetector>> {
    Ok(Box::new(FakeHog))
}

fn frame(w: u32, h: u32) -> RgbImage {
    RgbImage::from_pixel(w, h, image::Rgb([40, 80, 120]))
}

#[test]
fn network_path_returns_decoded_boxes() {
    let detector = Detector::builder(DetectConfig::default())
        .network(|| {
            Ok(Box::new(FakeYolo {
                rows: vec![
                    [320.0, 320.0, 100.0, 200.0, 0.9],
                    [322.0, 322.0, 100.0, 200.0, 0.8],
                    [100.0, 100.0, 40.0, 40.0, 0.1],
                ],
            }) as Box<dyn NetworkModel>)
        })
        .classical(hog)
        .build();

    let img = frame(640, 640);
    let r = detector.detect(Some(&img)).unwrap();
    assert_eq!(r.detector, DetectorKind::Network);
    assert!(r.warning.is_none());
    assert_eq!(r.count(), 1);
    assert_eq!(r.boxes[0], Bbox::new(270, 220, 100, 200));
    assert_eq!(r.scores, vec![0.9]);
}

#[test]
fn network_boxes_in_working_frame_coordinates() {
    let detector = Detector::builder(DetectConfig::default())
        .network(|| {
            Ok(Box::new(FakeYolo {
                rows: vec![[320.0, 320.0, 64.0, 64.0, 0.7]],
            }) as Box<dyn NetworkModel>)
        })
        .build();

    // 1920x1080 → 960x540, letterbox r=2/3, pad_y=(640-360)/2=140
    let img = frame(1920, 1080);
    let r = detector.detect(Some(&img)).unwrap();
    assert_eq!((r.width, r.height), (960, 540));
    assert_eq!(r.count(), 1);
    let b = r.boxes[0];
    assert!((b.x - 432).abs() <= 1, "{:?}", b);
    assert!((b.y - 222).abs() <= 1, "{:?}", b);
    assert!((b.w - 96).abs() <= 1, "{:?}", b);
}

#[test]
fn inference_failure_falls_back_to_classical() {
    let detector = Detector::builder(DetectConfig::default())
        .network(|| Ok(Box::new(BrokenYolo) as Box<dyn NetworkModel>))
        .classical(hog)
        .build();

    let img = frame(320, 240);
    let r = detector.detect(Some(&img)).unwrap();
    assert_eq!(r.detector, DetectorKind::Classical);
    let warning = r.warning.as_deref().unwrap();
    assert!(warning.contains("inference"), "{}", warning);
    assert_eq!(r.boxes.len(), r.scores.len());
    assert_eq!(r.boxes, vec![Bbox::new(10, 10, 40, 80)]);
    // 未归一化的 SVM 权重原样保留
    assert_eq!(r.scores, vec![1.3]);

    let body = r.to_response();
    assert_eq!(body["detector"], "classical");
    assert_eq!(body["count"], 1);
    assert!(body["warning"].is_string());
}

#[test]
fn zero_input_size_falls_back_to_classical() {
    let detector = Detector::builder(DetectConfig::default())
        .network(|| Ok(Box::new(ZeroSizedYolo) as Box<dyn NetworkModel>))
        .classical(hog)
        .build();

    let r = detector.detect(Some(&RgbImage::new(320, 240))).unwrap();
    assert_eq!(r.detector, DetectorKind::Classical);
    let warning = r.warning.as_deref().unwrap();
    assert!(!warning.is_empty());
    assert!(warning.contains("invalid input size 0x0"), "{}", warning);
    assert_eq!(r.count(), 1);
}

#[test]
fn init_failure_falls_back_and_retries() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = attempts.clone();
    let detector = Detector::builder(DetectConfig::default())
        .network(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("model file missing"))
        })
        .classical(hog)
        .build();

    let img = frame(320, 240);
    for _ in 0..2 {
        let r = detector.detect(Some(&img)).unwrap();
        assert_eq!(r.detector, DetectorKind::Classical);
        assert!(r.warning.as_deref().unwrap().contains("initialization"));
    }
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[test]
fn missing_network_backend_falls_back() {
    let detector = Detector::builder(DetectConfig::default())
        .classical(hog)
        .build();
    let r = detector.detect(Some(&frame(100, 100))).unwrap();
    assert_eq!(r.detector, DetectorKind::Classical);
    assert!(r.warning.is_some());
}

#[test]
fn classical_backend_skips_network() {
    let config = DetectConfig {
        backend: Backend::Classical,
        ..Default::default()
    };
    let detector = Detector::builder(config)
        .network(|| panic!("network backend must not be built"))
        .classical(hog)
        .build();

    let r = detector.detect(Some(&frame(320, 240))).unwrap();
    assert_eq!(r.detector, DetectorKind::Classical);
    assert!(r.warning.is_none());
    assert_eq!(detector.warm_up().unwrap(), DetectorKind::Classical);
}

#[test]
fn no_image_is_rejected() {
    let detector = Detector::builder(DetectConfig::default())
        .classical(hog)
        .build();
    let err = detector.detect(None).unwrap_err();
    assert!(matches!(err, DetectError::NoImage));
    assert!(matches!(
        detector.detect_bytes(&[]),
        Err(DetectError::NoImage)
    ));
}

#[test]
fn detect_bytes_decodes_png() {
    let detector = Detector::builder(DetectConfig::default())
        .network(|| Ok(Box::new(FakeYolo { rows: vec![] }) as Box<dyn NetworkModel>))
        .build();

    let mut png = Vec::new();
    frame(64, 48)
        .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
        .unwrap();
    let r = detector.detect_bytes(&png).unwrap();
    assert_eq!(r.detector, DetectorKind::Network);
    assert_eq!((r.width, r.height), (64, 48));
    assert_eq!(r.count(), 0);
}

#[test]
fn concurrent_first_calls_initialize_once() {
    let builds = Arc::new(AtomicUsize::new(0));
    let counter = builds.clone();
    let detector = Arc::new(
        Detector::builder(DetectConfig::default())
            .network(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(50));
                Ok(Box::new(FakeYolo {
                    rows: vec![[320.0, 320.0, 100.0, 200.0, 0.9]],
                }) as Box<dyn NetworkModel>)
            })
            .build(),
    );

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let detector = detector.clone();
            thread::spawn(move || {
                let img = frame(640, 640);
                detector.detect(Some(&img)).unwrap()
            })
        })
        .collect();

    for h in handles {
        let r = h.join().unwrap();
        assert_eq!(r.detector, DetectorKind::Network);
        assert_eq!(r.count(), 1);
    }
    assert_eq!(builds.load(Ordering::SeqCst), 1);
}

#[test]
fn warm_up_reports_network() {
    let detector = Detector::builder(DetectConfig::default())
        .network(|| Ok(Box::new(FakeYolo { rows: vec![] }) as Box<dyn NetworkModel>))
        .build();
    assert_eq!(detector.warm_up().unwrap(), DetectorKind::Network);
}
