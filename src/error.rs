// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 错误类型 (库边界)

use std::path::PathBuf;
use thiserror::Error;

/// 视频提取管线错误
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("video not found: {}", .0.display())]
    VideoNotFound(PathBuf),
    #[error("video source error: {0}")]
    Source(String),
    #[error("model load failed: {0}")]
    ModelLoadFailed(String),
    #[error("failed to spawn inference worker: {0}")]
    WorkerSpawn(std::io::Error),
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
}

/// 描述阶段错误 (单张图片失败不影响批次)
#[derive(Debug, Error)]
pub enum DescribeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("crop directory not found: {}", .0.display())]
    MissingDirectory(PathBuf),
    #[error("no person images in {}", .0.display())]
    NoImages(PathBuf),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("service returned {status}: {message}")]
    Service { status: u16, message: String },
    #[error("response contained no text")]
    EmptyResponse,
    #[error("no JSON object found in response")]
    MissingJson,
    #[error("JSON decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}
