// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测系统 (Detection System)
///
/// 推理线程独占使用
/// - Detector: 目标检测 + 跟踪
/// - Tracker:  ByteTrack 目标追踪
pub mod bytetrack;
pub mod detector;
pub mod tracker;
pub mod types;

pub use bytetrack::ByteTracker;
pub use detector::{TrackingDetector, YoloTracker};
pub use tracker::{compute_iou, Tracker};
pub use types::{BBox, Detection, DetectionBatch, Frame};
