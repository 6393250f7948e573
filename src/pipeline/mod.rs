// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 人物提取流水线 (Person extraction pipeline)
///
/// 两个并发单元, 通过有界队列通信:
/// - Capture:   读帧 + 裁剪 (主线程)
/// - Inference: 检测 + 跟踪 (独立线程)
///
/// 两者结束后单线程执行: 选优 → 去重 → 保存
pub mod aggregator;
pub mod cancel;
pub mod capture;
pub mod channel;
pub mod dedup;
pub mod inference;
pub mod persist;
pub mod selector;

use std::path::PathBuf;

use tracing::info;

pub use aggregator::{CropCandidate, TrackRegistry};
pub use cancel::StopToken;
pub use capture::{CaptureLoop, CaptureOutcome, FinishReason, FramePacer, Step};
pub use dedup::{dedupe, ImageHasher, PHasher, PerceptualHash};
pub use selector::{select_best, BestCrop};

use crate::config::PipelineConfig;
use crate::error::PipelineError;

// ========== 收尾阶段 ==========

/// 提取结果汇总
#[derive(Debug, Clone, Default)]
pub struct ExtractionReport {
    /// 出现过的跟踪ID数
    pub identities: usize,
    /// 每个ID的最佳裁剪数
    pub best_crops: usize,
    /// 去重后保留数
    pub unique_crops: usize,
    /// 写出的文件
    pub files: Vec<PathBuf>,
}

/// 选优 → 去重 → 保存
pub fn finalize<H: ImageHasher + ?Sized>(
    registry: &TrackRegistry,
    hasher: &H,
    config: &PipelineConfig,
) -> Result<ExtractionReport, PipelineError> {
    let best = select_best(registry);
    let unique = dedupe(&best, hasher, config.dedup_threshold);
    let files = persist::persist_crops(&unique, &config.output_dir)?;

    let report = ExtractionReport {
        identities: registry.len(),
        best_crops: best.len(),
        unique_crops: unique.len(),
        files,
    };
    info!(
        "✅ 完成: ID {} | 最佳裁剪 {} | 去重后 {} | 写出 {} 个文件 → {}",
        report.identities,
        report.best_crops,
        report.unique_crops,
        report.files.len(),
        config.output_dir.display()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    /// 以左上角像素的 RGB 作为 24 位哈希
    struct MarkerHasher;

    impl ImageHasher for MarkerHasher {
        fn hash(&self, image: &RgbImage) -> PerceptualHash {
            let [r, g, b] = image.get_pixel(0, 0).0;
            PerceptualHash(r as u64 | (g as u64) << 8 | (b as u64) << 16)
        }
    }

    fn candidate(area: u64, marker: [u8; 3]) -> CropCandidate {
        CropCandidate {
            image: RgbImage::from_pixel(8, 8, image::Rgb(marker)),
            confidence: 0.7,
            area,
        }
    }

    fn scenario() -> TrackRegistry {
        let mut registry = TrackRegistry::new();
        registry.record(1, candidate(100, [0, 0, 0]));
        registry.record(1, candidate(150, [0, 0, 0]));
        registry.record(2, candidate(200, [255, 255, 0]));
        registry.record(2, candidate(180, [255, 255, 0]));
        registry.record(3, candidate(90, [255, 248, 0]));
        // ID 3 最佳裁剪与 ID 2 距离为 3
        registry.record(3, candidate(95, [255, 248, 0]));
        registry
    }

    #[test]
    fn test_three_identity_scenario() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().join("cropped_persons"),
            ..PipelineConfig::default()
        };
        let registry = scenario();

        let best = select_best(&registry);
        assert_eq!(best.iter().map(|b| b.area).collect::<Vec<_>>(), vec![150, 200, 95]);
        assert_eq!(MarkerHasher.hash(&best[1].image).distance(&MarkerHasher.hash(&best[2].image)), 3);

        let report = finalize(&registry, &MarkerHasher, &config).unwrap();
        assert_eq!(report.identities, 3);
        assert_eq!(report.best_crops, 3);
        assert_eq!(report.unique_crops, 2);
        assert_eq!(report.files.len(), 2);
        assert!(config.output_dir.join("person_1.jpg").exists());
        assert!(config.output_dir.join("person_2.jpg").exists());
        assert!(!config.output_dir.join("person_3.jpg").exists());
    }

    #[test]
    fn test_select_and_dedupe_are_idempotent() {
        let registry = scenario();
        let first = select_best(&registry);
        let second = select_best(&registry);
        let a: Vec<u32> = dedupe(&first, &MarkerHasher, 10).iter().map(|c| c.track_id).collect();
        let b: Vec<u32> = dedupe(&second, &MarkerHasher, 10).iter().map(|c| c.track_id).collect();
        assert_eq!(a, vec![1, 2]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_registry_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig {
            output_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let report = finalize(&TrackRegistry::new(), &PHasher::new(), &config).unwrap();
        assert_eq!(report.unique_crops, 0);
        assert!(report.files.is_empty());
    }
}
