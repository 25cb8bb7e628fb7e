// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//
// 模型文件准备: 本地不存在时从远端下载, 并检查文件大小
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::config::DEFAULT_MIN_MODEL_BYTES;
use crate::error::ProvisionError;

/// 模型文件位置与下载地址
#[derive(Debug, Clone)]
pub struct ModelSource {
    pub path: PathBuf,
    pub url: Option<String>,
    /// 小于该字节数的文件视为损坏或下载不完整
    pub min_bytes: u64,
}

impl ModelSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            url: None,
            min_bytes: DEFAULT_MIN_MODEL_BYTES,
        }
    }

    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn min_bytes(mut self, min_bytes: u64) -> Self {
        self.min_bytes = min_bytes;
        self
    }
}

fn check_size(path: &Path, min: u64) -> Result<(), ProvisionError> {
    let size = fs::metadata(path)?.len();
    if size < min {
        return Err(ProvisionError::TooSmall {
            path: path.to_path_buf(),
            size,
            min,
        });
    }
    Ok(())
}

/// 写入临时文件, 失败时删除残留的 `.part`
fn write_part(part: &Path, reader: &mut impl io::Read) -> Result<(), ProvisionError> {
    let written = fs::File::create(part).and_then(|mut file| {
        io::copy(reader, &mut file)?;
        file.sync_all()
    });
    if let Err(e) = written {
        let _ = fs::remove_file(part);
        return Err(e.into());
    }
    Ok(())
}

/// 确保模型文件可用, 返回其路径
///
/// 已存在且大小合格的文件直接返回; 否则下载到 `<path>.part`, 校验后改名.
pub fn ensure_model(source: &ModelSource) -> Result<PathBuf, ProvisionError> {
    let path = &source.path;
    if path.is_file() && check_size(path, source.min_bytes).is_ok() {
        debug!("模型文件已存在: {}", path.display());
        return Ok(path.clone());
    }

    let Some(url) = &source.url else {
        if path.is_file() {
            check_size(path, source.min_bytes)?;
        }
        return Err(ProvisionError::NoSource { path: path.clone() });
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    info!("⬇️ 下载模型: {} → {}", url, path.display());
    let response = ureq::get(url)
        .call()
        .map_err(|e| ProvisionError::Download {
            url: url.clone(),
            source: Box::new(e),
        })?;

    let part = path.with_extension("part");
    write_part(&part, &mut response.into_reader())?;

    if let Err(e) = check_size(&part, source.min_bytes) {
        let _ = fs::remove_file(&part);
        return Err(match e {
            ProvisionError::TooSmall { size, min, .. } => ProvisionError::TooSmall {
                path: path.clone(),
                size,
                min,
            },
            other => other,
        });
    }
    fs::rename(&part, path)?;
    info!("✅ 模型下载完成: {}", path.display());
    Ok(path.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_existing_model_is_used() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("model.onnx");
        fs::write(&path, vec![0u8; 2048]).unwrap();
        let got = ensure_model(&ModelSource::new(&path).min_bytes(1024)).unwrap();
        assert_eq!(got, path);
    }

    #[test]
    fn test_missing_model_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.onnx");
        let err = ensure_model(&ModelSource::new(&path)).unwrap_err();
        assert!(matches!(err, ProvisionError::NoSource { .. }));
    }

    #[test]
    fn test_truncated_model_without_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.onnx");
        fs::write(&path, b"onnx").unwrap();
        let err = ensure_model(&ModelSource::new(&path).min_bytes(1024)).unwrap_err();
        assert!(matches!(err, ProvisionError::TooSmall { size: 4, min: 1024, .. }));
    }

    /// 读到一半断开的下载流
    struct BrokenStream(usize);

    impl io::Read for BrokenStream {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.0 == 0 {
                return Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset"));
            }
            let n = self.0.min(buf.len());
            buf[..n].fill(0);
            self.0 -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_interrupted_download_removes_part() {
        let dir = tempfile::tempdir().unwrap();
        let part = dir.path().join("model.part");
        let err = write_part(&part, &mut BrokenStream(4096)).unwrap_err();
        assert!(matches!(err, ProvisionError::Io(_)));
        assert!(!part.exists());
    }

    #[test]
    fn test_unreachable_url() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("model.onnx");
        let source = ModelSource::new(&path).url("http://127.0.0.1:9/yolov8n.onnx");
        let err = ensure_model(&source).unwrap_err();
        assert!(matches!(err, ProvisionError::Download { .. }));
        assert!(!path.exists());
    }
}
