// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 感知哈希去重
//!
//! pHash: 灰度 → 32x32 → 二维 DCT-II → 左上 8x8 低频系数与中位数比较 → 64 位。
//! 逐个与已接受的哈希比较, 最小汉明距离低于阈值即视为重复。

use std::sync::Arc;

use image::imageops::{self, FilterType};
use image::RgbImage;
use rustdct::{Dct2, DctPlanner, TransformType2And3};

use super::selector::BestCrop;

/// 参与 DCT 的边长
const IMG_SIZE: usize = 32;
/// 保留的低频边长 (8x8 = 64 位)
const HASH_SIZE: usize = 8;

/// 64 位感知哈希
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PerceptualHash(pub u64);

impl PerceptualHash {
    /// 汉明距离
    pub fn distance(&self, other: &PerceptualHash) -> u32 {
        (self.0 ^ other.0).count_ones()
    }
}

/// 图像哈希接口
pub trait ImageHasher {
    fn hash(&self, image: &RgbImage) -> PerceptualHash;
}

/// DCT pHash
pub struct PHasher {
    dct: Arc<dyn TransformType2And3<f32>>,
}

impl PHasher {
    pub fn new() -> Self {
        let mut planner = DctPlanner::new();
        Self {
            dct: planner.plan_dct2(IMG_SIZE),
        }
    }
}

impl Default for PHasher {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageHasher for PHasher {
    fn hash(&self, image: &RgbImage) -> PerceptualHash {
        if image.width() == 0 || image.height() == 0 {
            return PerceptualHash(0);
        }

        let gray = imageops::grayscale(image);
        let small = imageops::resize(&gray, IMG_SIZE as u32, IMG_SIZE as u32, FilterType::Triangle);
        let mut rows: Vec<f32> = small.pixels().map(|p| p[0] as f32).collect();

        // 行变换
        for row in rows.chunks_exact_mut(IMG_SIZE) {
            self.dct.process_dct2(row);
        }
        // 转置后再做一次行变换 = 列变换; 结果 cols[c * N + r] 为系数 (r, c)
        let mut cols = vec![0.0f32; IMG_SIZE * IMG_SIZE];
        for r in 0..IMG_SIZE {
            for c in 0..IMG_SIZE {
                cols[c * IMG_SIZE + r] = rows[r * IMG_SIZE + c];
            }
        }
        for col in cols.chunks_exact_mut(IMG_SIZE) {
            self.dct.process_dct2(col);
        }

        let mut low = Vec::with_capacity(HASH_SIZE * HASH_SIZE);
        for r in 0..HASH_SIZE {
            for c in 0..HASH_SIZE {
                low.push(cols[c * IMG_SIZE + r]);
            }
        }

        let mut sorted = low.clone();
        sorted.sort_by(f32::total_cmp);
        let mid = sorted.len() / 2;
        let median = (sorted[mid - 1] + sorted[mid]) / 2.0;

        let bits = low
            .iter()
            .enumerate()
            .filter(|(_, &v)| v > median)
            .fold(0u64, |acc, (i, _)| acc | (1 << i));
        PerceptualHash(bits)
    }
}

/// 去重: 按输入顺序, 与所有已接受哈希的最小距离 >= `threshold` 才接受
pub fn dedupe<'a, H: ImageHasher + ?Sized>(
    crops: &'a [BestCrop],
    hasher: &H,
    threshold: u32,
) -> Vec<&'a BestCrop> {
    let mut accepted_hashes: Vec<PerceptualHash> = Vec::new();
    let mut unique = Vec::new();

    for crop in crops {
        let hash = hasher.hash(&crop.image);
        let is_duplicate = accepted_hashes
            .iter()
            .any(|h| h.distance(&hash) < threshold);
        if is_duplicate {
            tracing::debug!("🔁 ID {} 与已保存人物重复, 跳过", crop.track_id);
            continue;
        }
        accepted_hashes.push(hash);
        unique.push(crop);
    }

    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    /// 块状纹理图, `offset` 为整体亮度偏移
    fn textured(offset: u8) -> RgbImage {
        RgbImage::from_fn(64, 64, |x, y| {
            let v = (((x / 8) + (y / 8) * 3) % 5) as u8 * 40 + 10 + offset;
            Rgb([v, v, v])
        })
    }

    fn crop(track_id: u32, image: RgbImage) -> BestCrop {
        BestCrop {
            track_id,
            image,
            confidence: 0.9,
            area: 100,
        }
    }

    #[test]
    fn test_hamming_distance() {
        assert_eq!(PerceptualHash(0b0).distance(&PerceptualHash(0b0)), 0);
        assert_eq!(PerceptualHash(0b1111).distance(&PerceptualHash(0b0000)), 4);
        assert_eq!(PerceptualHash(u64::MAX).distance(&PerceptualHash(0)), 64);
    }

    #[test]
    fn test_phash_stable_for_near_duplicates() {
        let hasher = PHasher::new();
        let a = hasher.hash(&textured(0));
        assert_eq!(a, hasher.hash(&textured(0)));
        let brighter = hasher.hash(&textured(10));
        assert!(a.distance(&brighter) < 10, "distance {}", a.distance(&brighter));
    }

    #[test]
    fn test_phash_separates_inverted_image() {
        let hasher = PHasher::new();
        let image = textured(0);
        let mut inverted = image.clone();
        image::imageops::invert(&mut inverted);
        let d = hasher.hash(&image).distance(&hasher.hash(&inverted));
        assert!(d >= 10, "distance {}", d);
    }

    #[test]
    fn test_exactly_one_of_two_near_duplicates_survives() {
        let crops = vec![crop(1, textured(0)), crop(2, textured(10))];
        let unique = dedupe(&crops, &PHasher::new(), 10);
        assert_eq!(unique.len(), 1);
        assert_eq!(unique[0].track_id, 1);
    }

    #[test]
    fn test_accepted_set_is_pairwise_distinct() {
        let hasher = PHasher::new();
        let mut inverted = textured(0);
        image::imageops::invert(&mut inverted);
        let crops = vec![
            crop(1, textured(0)),
            crop(2, inverted),
            crop(3, textured(5)),
        ];
        let unique = dedupe(&crops, &hasher, 10);
        let ids: Vec<u32> = unique.iter().map(|c| c.track_id).collect();
        assert_eq!(ids, vec![1, 2]);
        for (i, a) in unique.iter().enumerate() {
            for b in unique.iter().skip(i + 1) {
                assert!(hasher.hash(&a.image).distance(&hasher.hash(&b.image)) >= 10);
            }
        }
    }
}
