// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 检测器 (Detector)
//! 职责: 单帧 → YOLO检测 → 类别/置信度过滤 → ByteTrack 分配ID

use std::time::Instant;

use anyhow::Result;
use tracing::{debug, info};

use super::bytetrack::ByteTracker;
use super::tracker::Tracker;
use super::types::{Detection, Frame};
use crate::config::{DetectorConfig, TrackerConfig};
use crate::models::{Model, YOLOv8};

/// 带跟踪的检测器
///
/// 推理线程独占其可变跟踪状态。
pub trait TrackingDetector: Send {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>>;
}

/// 检测模型 + 跟踪器
pub struct YoloTracker<M: Model, T: Tracker = ByteTracker> {
    model: M,
    tracker: T,
    class_id: u32,
    conf_threshold: f32,
    persist: bool,

    // 统计
    count: u64,
    last: Instant,
}

impl YoloTracker<YOLOv8, ByteTracker> {
    /// 加载 ONNX 模型并创建 ByteTrack 跟踪器
    pub fn from_config(detector: &DetectorConfig, tracker: &TrackerConfig) -> Result<Self> {
        let model = YOLOv8::new(detector)?;
        model.summary();
        info!("🎯 跟踪器: ByteTrack (高低分分开处理)");
        Ok(Self::new(model, ByteTracker::new(tracker.clone()), detector))
    }
}

impl<M: Model, T: Tracker> YoloTracker<M, T> {
    pub fn new(model: M, tracker: T, config: &DetectorConfig) -> Self {
        Self {
            model,
            tracker,
            class_id: config.class_id,
            conf_threshold: config.conf_threshold,
            persist: config.persist_tracks,
            count: 0,
            last: Instant::now(),
        }
    }
}

impl<M: Model + Send, T: Tracker> TrackingDetector for YoloTracker<M, T> {
    fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
        let bboxes: Vec<_> = self
            .model
            .forward(&frame.image)?
            .into_iter()
            .filter(|b| b.class_id == self.class_id && b.confidence >= self.conf_threshold)
            .collect();

        if !self.persist {
            self.tracker.reset();
        }
        let ids = self.tracker.update(&bboxes);

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            debug!(
                "🔍 检测 {} 帧 | 当前 {} 框 | 活跃轨迹 {}",
                self.count,
                bboxes.len(),
                self.tracker.track_count()
            );
            self.last = Instant::now();
            self.count = 0;
        }

        Ok(bboxes
            .into_iter()
            .zip(ids)
            .map(|(bbox, track_id)| Detection { bbox, track_id })
            .collect())
    }
}
