// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 管线配置 - 通过JSON文件调整参数
//!
//! 所有字段都有默认值, JSON 中缺失的字段自动补齐。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::detection::types::{INF_SIZE, PERSON_CLASS_ID};
use crate::error::PipelineError;

/// 顶层配置
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub pipeline: PipelineConfig,
    pub detector: DetectorConfig,
    pub tracker: TrackerConfig,
    pub describe: DescribeConfig,
}

/// 采集/推理管线参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub frame_queue_capacity: usize,  // 帧队列容量 (满则丢帧)
    pub result_queue_capacity: usize, // 结果队列容量
    pub worker_poll_timeout_ms: u64,  // 推理线程取帧超时
    pub crop_padding: u32,            // 裁剪外扩像素
    pub dedup_threshold: u32,         // pHash 汉明距离阈值
    pub output_dir: PathBuf,          // 裁剪图输出目录
    pub realtime: bool,               // 按视频标称帧率节流
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            frame_queue_capacity: 2,
            result_queue_capacity: 2,
            worker_poll_timeout_ms: 1000,
            crop_padding: 30,
            dedup_threshold: 10,
            output_dir: PathBuf::from("cropped_persons"),
            realtime: true,
        }
    }
}

impl PipelineConfig {
    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.worker_poll_timeout_ms)
    }
}

/// 检测模型参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    pub model_path: PathBuf,
    pub input_size: u32,
    pub class_id: u32, // COCO 0 = person
    pub conf_threshold: f32,
    pub iou_threshold: f32,
    pub device: String, // cpu | cuda[:N] | trt[:N]
    pub persist_tracks: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/yolov8n.onnx"),
            input_size: INF_SIZE,
            class_id: PERSON_CLASS_ID,
            conf_threshold: 0.55,
            iou_threshold: 0.45,
            device: "cuda:0".to_string(),
            persist_tracks: true,
        }
    }
}

/// 跟踪器参数配置
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    // === ByteTrack参数 ===
    pub max_lost_frames: u32,      // 最大丢失帧数
    pub high_score_threshold: f32, // 高分阈值
    pub low_score_threshold: f32,  // 低分阈值
    pub high_iou_threshold: f32,   // 高分IOU阈值
    pub low_iou_threshold: f32,    // 低分IOU阈值
    pub min_hits: u32,             // 确认轨迹所需命中次数

    // === 卡尔曼滤波参数 ===
    pub kalman_process_noise: f32,        // 过程噪声 q
    pub kalman_obs_noise: f32,            // 观测噪声 r
    pub kalman_velocity_decay: f32,       // 速度衰减
    pub kalman_stationary_threshold: f32, // 静止判定阈值(像素)
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            max_lost_frames: 30,
            high_score_threshold: 0.4,
            low_score_threshold: 0.1,
            high_iou_threshold: 0.4,
            low_iou_threshold: 0.3,
            min_hits: 2,

            kalman_process_noise: 0.1,
            kalman_obs_noise: 0.5,
            kalman_velocity_decay: 0.95,
            kalman_stationary_threshold: 2.0,
        }
    }
}

/// 描述服务参数
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct DescribeConfig {
    pub model: String,
    pub endpoint: String,
    pub limit: usize,
    pub timeout_secs: u64,
    pub results_json: PathBuf,
    pub results_csv: Option<PathBuf>,
}

impl Default for DescribeConfig {
    fn default() -> Self {
        Self {
            model: "gemini-1.5-pro-latest".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            limit: 10,
            timeout_secs: 60,
            results_json: PathBuf::from("results.json"),
            results_csv: Some(PathBuf::from("results.csv")),
        }
    }
}

impl AppConfig {
    /// 从JSON文件加载配置
    ///
    /// 文件不存在时写出一份默认配置; 解析失败时使用默认值。
    pub fn load(path: &Path) -> Self {
        match fs::read_to_string(path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(config) => {
                    info!("✅ 配置已从 {} 加载", path.display());
                    config
                }
                Err(e) => {
                    warn!("⚠️  配置文件解析失败: {}, 使用默认值", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("📝 配置文件不存在,创建默认配置...");
                let config = Self::default();
                if let Err(e) = config.save(path) {
                    warn!("❌ 保存配置失败: {}", e);
                }
                config
            }
        }
    }

    /// 保存配置到JSON文件
    pub fn save(&self, path: &Path) -> Result<(), PipelineError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        info!("💾 配置已保存到 {}", path.display());
        Ok(())
    }

    /// 打印当前配置
    pub fn log_summary(&self) {
        info!("🎛️  当前配置:");
        info!(
            "  检测: {} | 置信度 {:.2} | 设备 {}",
            self.detector.model_path.display(),
            self.detector.conf_threshold,
            self.detector.device
        );
        info!(
            "  队列容量: 帧 {} / 结果 {} | 外扩 {}px | 去重阈值 {}",
            self.pipeline.frame_queue_capacity,
            self.pipeline.result_queue_capacity,
            self.pipeline.crop_padding,
            self.pipeline.dedup_threshold
        );
        info!(
            "  ByteTrack最大丢失帧: {} | 确认命中: {}",
            self.tracker.max_lost_frames, self.tracker.min_hits
        );
    }
}
