// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
pub mod config; // 管线配置参数
pub mod describe; // 人物描述 (Gemini)
pub mod detection; // 检测 + 跟踪
pub mod error; // 错误类型
pub mod input; // 视频输入系统
pub mod models; // 模型实现
pub mod pipeline; // 采集/推理/裁剪/去重/保存
pub mod renderer; // 实时显示 (macroquad)
pub mod runner; // 可执行程序共用流程

pub use config::AppConfig;
pub use detection::types::{BBox, Detection, DetectionBatch, Frame};
pub use error::{DescribeError, PipelineError};

/// 非极大值抑制 (类别无关, 按置信度降序保留)
pub fn non_max_suppression(xs: &mut Vec<BBox>, iou_threshold: f32) {
    xs.sort_by(|b1, b2| b2.confidence.total_cmp(&b1.confidence));

    let mut current_index = 0;
    for index in 0..xs.len() {
        let mut drop = false;
        for prev_index in 0..current_index {
            let iou = detection::compute_iou(&xs[prev_index], &xs[index]);
            if iou > iou_threshold {
                drop = true;
                break;
            }
        }
        if !drop {
            xs.swap(current_index, index);
            current_index += 1;
        }
    }
    xs.truncate(current_index);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nms_keeps_highest_and_disjoint() {
        let mut boxes = vec![
            BBox::new(0.0, 0.0, 10.0, 10.0, 0.6, 0),
            BBox::new(1.0, 0.0, 11.0, 10.0, 0.9, 0),
            BBox::new(50.0, 50.0, 60.0, 60.0, 0.5, 0),
        ];
        non_max_suppression(&mut boxes, 0.45);
        assert_eq!(boxes.len(), 2);
        assert!((boxes[0].confidence - 0.9).abs() < 1e-6);
        assert!((boxes[1].confidence - 0.5).abs() < 1e-6);
    }
}
