// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 每个跟踪ID选出面积最大的裁剪 (面积相同取最早)

use image::RgbImage;

use super::aggregator::TrackRegistry;

#[derive(Clone, Debug)]
pub struct BestCrop {
    pub track_id: u32,
    pub image: RgbImage,
    pub confidence: f32,
    pub area: u64,
}

/// 按ID首次出现顺序输出, 每个ID恰好一个
pub fn select_best(registry: &TrackRegistry) -> Vec<BestCrop> {
    registry
        .iter()
        .filter_map(|(track_id, candidates)| {
            let best = candidates
                .iter()
                .reduce(|best, c| if c.area > best.area { c } else { best })?;
            Some(BestCrop {
                track_id,
                image: best.image.clone(),
                confidence: best.confidence,
                area: best.area,
            })
        })
        .collect()
}
