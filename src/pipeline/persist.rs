// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 保存去重后的裁剪图: person_1.jpg, person_2.jpg, ...

use std::fs;
use std::path::{Path, PathBuf};

use image::ImageFormat;
use tracing::info;

use super::selector::BestCrop;
use crate::error::PipelineError;

/// 输出文件名 (序号从1开始)
pub fn person_file_name(n: usize) -> String {
    format!("person_{}.jpg", n)
}

/// 按顺序编号写出 JPEG, 已存在的同名文件被覆盖
pub fn persist_crops(crops: &[&BestCrop], output_dir: &Path) -> Result<Vec<PathBuf>, PipelineError> {
    fs::create_dir_all(output_dir)?;

    let mut files = Vec::with_capacity(crops.len());
    for (i, crop) in crops.iter().enumerate() {
        let path = output_dir.join(person_file_name(i + 1));
        crop.image.save_with_format(&path, ImageFormat::Jpeg)?;
        info!(
            "💾 ID {} → {} ({}x{})",
            crop.track_id,
            path.display(),
            crop.image.width(),
            crop.image.height()
        );
        files.push(path);
    }
    Ok(files)
}
