// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 多目标跟踪公共组件
//! Common components for multi-object tracking

use super::types::BBox;
use crate::config::TrackerConfig;

// ========== 卡尔曼滤波器 ==========

/// 卡尔曼滤波参数
#[derive(Clone, Copy, Debug)]
pub struct KalmanParams {
    /// 过程噪声 (0.1-1.0, 越小越平滑)
    pub q: f32,
    /// 观测噪声 (越大越平滑)
    pub r: f32,
    /// 速度衰减因子 (0.9-0.99)
    pub velocity_decay: f32,
    /// 静止阈值 (像素/帧)
    pub stationary_threshold: f32,
}

impl From<&TrackerConfig> for KalmanParams {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            q: config.kalman_process_noise,
            r: config.kalman_obs_noise,
            velocity_decay: config.kalman_velocity_decay,
            stationary_threshold: config.kalman_stationary_threshold,
        }
    }
}

/// 简化卡尔曼滤波器 (用于单个边界框的位置和尺寸平滑)
/// 状态向量: [x_center, y_center, width, height, vx, vy, vw, vh]
#[derive(Clone, Debug)]
pub struct KalmanBoxFilter {
    state: [f32; 8],
    /// 估计误差协方差 (简化为对角阵)
    p: [f32; 8],
    params: KalmanParams,
    /// 连续静止帧数计数器
    stationary_count: u32,
}

impl KalmanBoxFilter {
    pub fn new(bbox: &BBox, params: KalmanParams) -> Self {
        let cx = (bbox.x1 + bbox.x2) / 2.0;
        let cy = (bbox.y1 + bbox.y2) / 2.0;

        Self {
            state: [cx, cy, bbox.width(), bbox.height(), 0.0, 0.0, 0.0, 0.0], // 初始速度为0
            p: [10.0; 8],
            params,
            stationary_count: 0,
        }
    }

    /// 预测下一帧状态 (匀速运动模型 + 速度衰减)
    pub fn predict(&mut self) {
        let speed = (self.state[4] * self.state[4] + self.state[5] * self.state[5]).sqrt();
        let is_stationary = speed < self.params.stationary_threshold;

        if is_stationary {
            self.stationary_count += 1;
            // 连续静止3帧后,大幅衰减速度
            let decay = if self.stationary_count > 3 {
                0.7
            } else {
                self.params.velocity_decay
            };
            for v in &mut self.state[4..8] {
                *v *= decay;
            }
        } else {
            self.stationary_count = 0;
            self.state[4] *= self.params.velocity_decay;
            self.state[5] *= self.params.velocity_decay;
            self.state[6] *= 0.98; // 尺寸变化更慢
            self.state[7] *= 0.98;
        }

        for i in 0..4 {
            self.state[i] += self.state[i + 4];
        }

        // 协方差预测: P = P + Q (静止时减小过程噪声)
        let q_factor = if is_stationary { 0.5 } else { 1.0 };
        for p in &mut self.p {
            *p += self.params.q * q_factor;
        }
    }

    /// 更新 (融合观测值,自适应噪声调整)
    pub fn update(&mut self, bbox: &BBox) {
        let y = [
            (bbox.x1 + bbox.x2) / 2.0 - self.state[0],
            (bbox.y1 + bbox.y2) / 2.0 - self.state[1],
            bbox.width() - self.state[2],
            bbox.height() - self.state[3],
        ];

        // 根据残差大小自适应调整观测噪声
        let residual_norm = (y[0] * y[0] + y[1] * y[1]).sqrt();
        let stationary = residual_norm < self.params.stationary_threshold;
        let adaptive_r = if stationary {
            self.params.r * 0.3
        } else if residual_norm < 10.0 {
            self.params.r
        } else {
            // 大幅跳变:更信任预测值
            self.params.r * 3.0
        };

        let mut k = [0.0f32; 8];
        for i in 0..8 {
            let r = if i < 4 { adaptive_r } else { adaptive_r * 10.0 };
            k[i] = self.p[i] / (self.p[i] + r);
        }

        for i in 0..4 {
            self.state[i] += k[i] * y[i];
        }

        let velocity_gain = if stationary { 0.3 } else { 1.0 };
        for i in 0..4 {
            self.state[i + 4] += k[i + 4] * y[i] * velocity_gain;
        }

        // 协方差更新: P = (I - K) * P
        for i in 0..8 {
            self.p[i] *= 1.0 - k[i];
        }

        if !stationary {
            self.stationary_count = 0;
        }
    }

    /// 获取当前状态的边界框
    pub fn state_bbox(&self) -> BBox {
        Self::to_bbox(self.state[0], self.state[1], self.state[2], self.state[3])
    }

    /// 获取预测的边界框 (用于匹配)
    pub fn predicted_bbox(&self) -> BBox {
        Self::to_bbox(
            self.state[0] + self.state[4],
            self.state[1] + self.state[5],
            self.state[2] + self.state[6],
            self.state[3] + self.state[7],
        )
    }

    fn to_bbox(cx: f32, cy: f32, w: f32, h: f32) -> BBox {
        let w = w.max(1.0);
        let h = h.max(1.0);
        BBox::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0, 1.0, 0)
    }
}

// ========== 跟踪器统一接口 ==========

/// 多目标跟踪器 Trait
pub trait Tracker: Send {
    /// 更新跟踪器
    ///
    /// 返回值与 `detections` 一一对应: 已确认轨迹的ID, 未确认为 None
    fn update(&mut self, detections: &[BBox]) -> Vec<Option<u32>>;

    /// 重置跟踪器 (清除所有跟踪)
    fn reset(&mut self);

    /// 获取当前跟踪数量
    fn track_count(&self) -> usize;
}

// ========== 工具函数 ==========

/// 计算两个边界框的IOU (Intersection over Union)
pub fn compute_iou(bbox1: &BBox, bbox2: &BBox) -> f32 {
    let x1 = bbox1.x1.max(bbox2.x1);
    let y1 = bbox1.y1.max(bbox2.y1);
    let x2 = bbox1.x2.min(bbox2.x2);
    let y2 = bbox1.y2.min(bbox2.y2);

    if x2 <= x1 || y2 <= y1 {
        return 0.0;
    }

    let intersection = (x2 - x1) * (y2 - y1);
    let union = bbox1.area() + bbox2.area() - intersection;

    if union <= 0.0 {
        return 0.0;
    }

    intersection / union
}

/// 根据ID生成不同颜色
pub fn id_to_color(id: u32) -> (u8, u8, u8) {
    let hue = (id as f32 * 137.508) % 360.0; // 黄金角度采样
    hsv_to_rgb(hue, 0.8, 0.9)
}

fn hsv_to_rgb(h: f32, s: f32, v: f32) -> (u8, u8, u8) {
    let c = v * s;
    let x = c * (1.0 - ((h / 60.0) % 2.0 - 1.0).abs());
    let m = v - c;

    let (r, g, b) = match h as u32 {
        0..=59 => (c, x, 0.0),
        60..=119 => (x, c, 0.0),
        120..=179 => (0.0, c, x),
        180..=239 => (0.0, x, c),
        240..=299 => (x, 0.0, c),
        _ => (c, 0.0, x),
    };

    (
        ((r + m) * 255.0) as u8,
        ((g + m) * 255.0) as u8,
        ((b + m) * 255.0) as u8,
    )
}
