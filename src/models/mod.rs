// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 模型统一接口与实现
///
/// ## Model Trait
/// 统一的模型接口: 一帧RGB图像 → 原图坐标系下的检测框 (NMS之后)
///
/// ## 完整模型实现
/// - **YOLOv8**: ONNX Runtime 加载 + letterbox 预处理 + 解码/NMS, 文件: `yolov8.rs`
use anyhow::Result;
use image::RgbImage;

use crate::detection::types::BBox;

pub mod yolov8;

pub use yolov8::{Device, YOLOv8};

pub trait Model {
    /// 预处理 → 推理 → 后处理
    fn forward(&mut self, image: &RgbImage) -> Result<Vec<BBox>>;

    /// 打印模型信息
    fn summary(&self) {}
}
