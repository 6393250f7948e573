// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! ByteTrack 算法实现
//! ByteTrack: Simple and effective multi-object tracking
//!
//! 核心思想:
//! 1. 高低分检测框分开处理
//! 2. 高分框优先匹配 (IOU)
//! 3. 低分框救援丢失的轨迹
//! 4. 纯运动模型,无需外观特征
//!
//! 新轨迹需命中 `min_hits` 次才输出ID; 首帧出现的轨迹立即确认。

use super::tracker::{compute_iou, KalmanBoxFilter, KalmanParams, Tracker};
use super::types::BBox;
use crate::config::TrackerConfig;

/// ByteTrack 跟踪对象
#[derive(Clone, Debug)]
pub struct ByteTrackedPerson {
    /// 唯一跟踪ID
    pub id: u32,

    /// 当前边界框 (卡尔曼滤波平滑后)
    pub bbox: BBox,

    kalman: KalmanBoxFilter,

    /// 连续丢失帧数
    pub frames_lost: u32,

    /// 总共被匹配的帧数
    pub hits: u32,

    /// 是否已确认 (确认后才对外输出ID)
    pub confirmed: bool,

    /// 最近一次匹配的检测置信度
    pub score: f32,
}

impl ByteTrackedPerson {
    fn new(id: u32, bbox: &BBox, params: KalmanParams, confirmed: bool) -> Self {
        let kalman = KalmanBoxFilter::new(bbox, params);

        Self {
            id,
            bbox: kalman.state_bbox(),
            kalman,
            frames_lost: 0,
            hits: 1,
            confirmed,
            score: bbox.confidence,
        }
    }

    fn predict(&mut self) {
        self.kalman.predict();
        self.bbox = self.kalman.state_bbox();
    }

    fn update(&mut self, bbox: &BBox, min_hits: u32) {
        self.kalman.update(bbox);
        self.bbox = self.kalman.state_bbox();
        self.frames_lost = 0;
        self.hits += 1;
        self.score = bbox.confidence;
        if self.hits >= min_hits {
            self.confirmed = true;
        }
    }

    fn mark_lost(&mut self) {
        self.frames_lost += 1;
    }
}

/// ByteTrack 追踪器
pub struct ByteTracker {
    tracked_persons: Vec<ByteTrackedPerson>,

    /// 下一个分配的ID
    next_id: u32,

    /// 已处理帧数
    frame_count: u64,

    config: TrackerConfig,
    kalman: KalmanParams,
}

impl ByteTracker {
    pub fn new(config: TrackerConfig) -> Self {
        let kalman = KalmanParams::from(&config);
        Self {
            tracked_persons: Vec::new(),
            next_id: 1,
            frame_count: 0,
            config,
            kalman,
        }
    }

    /// 当前活跃轨迹
    pub fn tracks(&self) -> &[ByteTrackedPerson] {
        &self.tracked_persons
    }

    /// IOU 匹配 (贪心, 按代价排序)
    fn match_detections_to_tracks(
        &self,
        detections: &[(usize, &BBox)],
        track_indices: &[usize],
        iou_threshold: f32,
    ) -> Vec<(usize, usize)> {
        if detections.is_empty() || track_indices.is_empty() {
            return Vec::new();
        }

        let mut candidates = Vec::new();
        for (local_det_idx, (det_idx, detection)) in detections.iter().enumerate() {
            for (local_track_idx, &track_idx) in track_indices.iter().enumerate() {
                let predicted = self.tracked_persons[track_idx].kalman.predicted_bbox();
                let iou = compute_iou(detection, &predicted);

                if iou >= iou_threshold {
                    candidates.push((1.0 - iou, *det_idx, local_det_idx, track_idx, local_track_idx));
                }
            }
        }

        candidates.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut assignments = Vec::new();
        let mut used_det = vec![false; detections.len()];
        let mut used_track = vec![false; track_indices.len()];

        for (_, det_idx, local_det_idx, track_idx, local_track_idx) in candidates {
            if !used_det[local_det_idx] && !used_track[local_track_idx] {
                assignments.push((det_idx, track_idx));
                used_det[local_det_idx] = true;
                used_track[local_track_idx] = true;
            }
        }

        assignments
    }
}

impl Tracker for ByteTracker {
    /// 更新跟踪 (ByteTrack 三步匹配)
    fn update(&mut self, detections: &[BBox]) -> Vec<Option<u32>> {
        self.frame_count += 1;
        let first_frame = self.frame_count == 1;

        // 1. 分离高低分检测框
        let mut high_dets: Vec<(usize, &BBox)> = Vec::new();
        let mut low_dets: Vec<(usize, &BBox)> = Vec::new();
        for (idx, det) in detections.iter().enumerate() {
            if det.confidence >= self.config.high_score_threshold {
                high_dets.push((idx, det));
            } else if det.confidence >= self.config.low_score_threshold {
                low_dets.push((idx, det));
            }
        }

        let mut assigned: Vec<Option<usize>> = vec![None; detections.len()];
        let mut matched_track = vec![false; self.tracked_persons.len()];

        // 2. 第一轮匹配: 高分检测 + 所有轨迹 (基于预测框)
        let all_tracks: Vec<usize> = (0..self.tracked_persons.len()).collect();
        for (det_idx, track_idx) in
            self.match_detections_to_tracks(&high_dets, &all_tracks, self.config.high_iou_threshold)
        {
            assigned[det_idx] = Some(track_idx);
            matched_track[track_idx] = true;
        }

        // 3. 第二轮匹配: 低分检测 + 未匹配的轨迹 (救援)
        let unmatched_tracks: Vec<usize> = (0..self.tracked_persons.len())
            .filter(|&idx| !matched_track[idx])
            .collect();
        for (det_idx, track_idx) in self.match_detections_to_tracks(
            &low_dets,
            &unmatched_tracks,
            self.config.low_iou_threshold,
        ) {
            assigned[det_idx] = Some(track_idx);
            matched_track[track_idx] = true;
        }

        // 4. 轨迹状态推进: 匹配的融合观测, 未匹配的标记丢失
        for track in &mut self.tracked_persons {
            track.predict();
        }
        let min_hits = self.config.min_hits;
        for (det_idx, slot) in assigned.iter().enumerate() {
            if let Some(track_idx) = *slot {
                self.tracked_persons[track_idx].update(&detections[det_idx], min_hits);
            }
        }
        for (track_idx, &matched) in matched_track.iter().enumerate() {
            if !matched {
                self.tracked_persons[track_idx].mark_lost();
            }
        }

        let mut ids: Vec<Option<u32>> = assigned
            .iter()
            .map(|slot| {
                slot.map(|t| &self.tracked_persons[t])
                    .filter(|t| t.confirmed)
                    .map(|t| t.id)
            })
            .collect();

        // 5. 未匹配的高分检测 → 新建轨迹
        for (det_idx, det) in detections.iter().enumerate() {
            if assigned[det_idx].is_none() && det.confidence >= self.config.high_score_threshold {
                let confirmed = first_frame || min_hits <= 1;
                let track = ByteTrackedPerson::new(self.next_id, det, self.kalman, confirmed);
                if confirmed {
                    ids[det_idx] = Some(track.id);
                }
                self.tracked_persons.push(track);
                self.next_id += 1;
            }
        }

        // 6. 删除丢失太久的轨迹
        let max_lost = self.config.max_lost_frames;
        self.tracked_persons.retain(|t| t.frames_lost <= max_lost);

        ids
    }

    fn reset(&mut self) {
        self.tracked_persons.clear();
        self.frame_count = 0;
    }

    fn track_count(&self) -> usize {
        self.tracked_persons.len()
    }
}

impl Default for ByteTracker {
    fn default() -> Self {
        Self::new(TrackerConfig::default())
    }
}
