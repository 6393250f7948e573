// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 检测/跟踪数据结构定义
/// Data structures shared by the capture loop and the inference worker
use image::RgbImage;

// ========== 公共常量 ==========

/// YOLOv8推理输入尺寸
pub const INF_SIZE: u32 = 640;

/// COCO 类别: person
pub const PERSON_CLASS_ID: u32 = 0;

// ========== 数据结构 ==========

/// 检测框 (Detection bounding box)
#[derive(Clone, Debug, PartialEq)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub confidence: f32,
    pub class_id: u32,
}

impl BBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32, confidence: f32, class_id: u32) -> Self {
        Self {
            x1,
            y1,
            x2,
            y2,
            confidence,
            class_id,
        }
    }

    pub fn width(&self) -> f32 {
        (self.x2 - self.x1).max(0.0)
    }

    pub fn height(&self) -> f32 {
        (self.y2 - self.y1).max(0.0)
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }
}

/// 视频帧 (采集线程拥有, 送入帧队列时复制一份)
#[derive(Clone, Debug)]
pub struct Frame {
    /// 帧序号 (按读取顺序)
    pub index: u64,
    /// RGB 像素
    pub image: RgbImage,
}

impl Frame {
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// 单个检测结果: 检测框 + 跟踪ID (未确认的轨迹为 None)
#[derive(Clone, Debug, PartialEq)]
pub struct Detection {
    pub bbox: BBox,
    pub track_id: Option<u32>,
}

impl Detection {
    pub fn confidence(&self) -> f32 {
        self.bbox.confidence
    }
}

/// 推理结果批次 (推理线程 → 主循环)
#[derive(Clone, Debug, Default)]
pub struct DetectionBatch {
    pub frame_index: u64,
    pub detections: Vec<Detection>,
    pub inference_ms: f64,
}

impl DetectionBatch {
    /// 有跟踪ID的检测
    pub fn tracked(&self) -> impl Iterator<Item = (u32, &BBox)> {
        self.detections
            .iter()
            .filter_map(|d| d.track_id.map(|id| (id, &d.bbox)))
    }
}
