// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 裁剪聚合: 按跟踪ID累积外扩裁剪候选

use std::collections::HashMap;

use image::RgbImage;

use crate::detection::types::{BBox, DetectionBatch, Frame};

/// 单个裁剪候选
#[derive(Clone, Debug)]
pub struct CropCandidate {
    pub image: RgbImage,
    pub confidence: f32,
    /// 原始 (未外扩) 检测框面积
    pub area: u64,
}

/// 帧内裁剪区域 (已限制在帧内, 面积 > 0)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// 外扩 `padding` 像素并限制在帧内; 面积为0时返回 None
pub fn padded_region(bbox: &BBox, padding: u32, width: u32, height: u32) -> Option<CropRegion> {
    let pad = padding as i64;
    let (w, h) = (width as i64, height as i64);
    let x1 = (bbox.x1 as i64 - pad).clamp(0, w);
    let y1 = (bbox.y1 as i64 - pad).clamp(0, h);
    let x2 = (bbox.x2 as i64 + pad).clamp(0, w);
    let y2 = (bbox.y2 as i64 + pad).clamp(0, h);

    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(CropRegion {
        x: x1 as u32,
        y: y1 as u32,
        width: (x2 - x1) as u32,
        height: (y2 - y1) as u32,
    })
}

/// 检测框面积 (整数坐标)
pub fn box_area(bbox: &BBox) -> u64 {
    let w = (bbox.x2 as i64 - bbox.x1 as i64).max(0);
    let h = (bbox.y2 as i64 - bbox.y1 as i64).max(0);
    (w * h) as u64
}

/// 跟踪ID → 候选列表, 保留ID首次出现顺序
#[derive(Debug, Default)]
pub struct TrackRegistry {
    order: Vec<u32>,
    records: HashMap<u32, Vec<CropCandidate>>,
}

impl TrackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, track_id: u32, candidate: CropCandidate) {
        let list = self.records.entry(track_id).or_insert_with(|| {
            self.order.push(track_id);
            Vec::new()
        });
        list.push(candidate);
    }

    /// 按首次出现顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[CropCandidate])> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).map(|c| (*id, c.as_slice())))
    }

    pub fn candidates(&self, track_id: u32) -> Option<&[CropCandidate]> {
        self.records.get(&track_id).map(Vec::as_slice)
    }

    /// 跟踪ID数量
    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn candidate_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }
}

/// 用最新批次在当前帧上裁剪, 返回新增候选数
///
/// 批次可能来自更早的帧, 坐标仍按当前帧裁剪。
pub fn collect_crops(
    frame: &Frame,
    batch: &DetectionBatch,
    padding: u32,
    registry: &mut TrackRegistry,
) -> usize {
    let mut added = 0;
    for (track_id, bbox) in batch.tracked() {
        let Some(region) = padded_region(bbox, padding, frame.width(), frame.height()) else {
            continue;
        };
        let image = image::imageops::crop_imm(
            &frame.image,
            region.x,
            region.y,
            region.width,
            region.height,
        )
        .to_image();

        registry.record(
            track_id,
            CropCandidate {
                image,
                confidence: bbox.confidence,
                area: box_area(bbox),
            },
        );
        added += 1;
    }
    added
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::Detection;

    fn bbox(x1: f32, y1: f32, x2: f32, y2: f32) -> BBox {
        BBox::new(x1, y1, x2, y2, 0.8, 0)
    }

    fn candidate(area: u64) -> CropCandidate {
        CropCandidate {
            image: RgbImage::new(1, 1),
            confidence: 0.9,
            area,
        }
    }

    #[test]
    fn test_padding_clamped_to_frame() {
        let region = padded_region(&bbox(10.0, 5.0, 100.0, 200.0), 30, 120, 220).unwrap();
        assert_eq!(
            region,
            CropRegion {
                x: 0,
                y: 0,
                width: 120,
                height: 220
            }
        );

        let region = padded_region(&bbox(100.0, 100.0, 150.0, 180.0), 30, 640, 480).unwrap();
        assert_eq!((region.x, region.y, region.width, region.height), (70, 70, 110, 140));
    }

    #[test]
    fn test_outside_or_degenerate_box_yields_nothing() {
        assert!(padded_region(&bbox(700.0, 10.0, 800.0, 50.0), 30, 640, 480).is_none());
        assert!(padded_region(&bbox(-200.0, 10.0, -100.0, 50.0), 30, 640, 480).is_none());
        assert!(padded_region(&bbox(10.0, 10.0, 10.0, 10.0), 0, 640, 480).is_none());
    }

    #[test]
    fn test_crops_are_bounded_and_positive() {
        let frame = Frame::new(0, RgbImage::new(320, 240));
        let batch = DetectionBatch {
            frame_index: 0,
            detections: vec![
                Detection {
                    bbox: bbox(-20.0, -20.0, 40.0, 60.0),
                    track_id: Some(1),
                },
                Detection {
                    bbox: bbox(300.0, 200.0, 330.0, 260.0),
                    track_id: Some(2),
                },
                Detection {
                    bbox: bbox(100.0, 100.0, 150.0, 150.0),
                    track_id: None,
                },
                Detection {
                    bbox: bbox(500.0, 10.0, 600.0, 50.0),
                    track_id: Some(3),
                },
            ],
            inference_ms: 0.0,
        };
        let mut registry = TrackRegistry::new();
        assert_eq!(collect_crops(&frame, &batch, 30, &mut registry), 2);
        assert_eq!(registry.len(), 2);
        for (_, candidates) in registry.iter() {
            for c in candidates {
                assert!(c.image.width() > 0 && c.image.height() > 0);
                assert!(c.image.width() <= 320 && c.image.height() <= 240);
            }
        }
        // 面积使用原始检测框
        assert_eq!(registry.candidates(1).unwrap()[0].area, 60 * 80);
    }

    #[test]
    fn test_registry_keeps_encounter_order() {
        let mut registry = TrackRegistry::new();
        registry.record(7, candidate(1));
        registry.record(3, candidate(2));
        registry.record(7, candidate(3));
        let ids: Vec<u32> = registry.iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec![7, 3]);
        assert_eq!(registry.candidate_count(), 3);
        assert_eq!(registry.candidates(7).unwrap().len(), 2);
    }
}
