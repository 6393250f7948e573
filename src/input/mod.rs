// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频输入系统 (Video Input System)
///
/// - FrameSource: 顺序取帧接口, 读完即流结束
/// - FfmpegSource: FFmpeg 解码视频文件
/// - DecodeFilter: 帧过滤与 YUV → RGB 转换
use crate::detection::types::Frame;

pub mod decode_filter;
pub mod decoder;

pub use decode_filter::DecodeFilter;
pub use decoder::{FfmpegSource, FALLBACK_FPS};

/// 帧源
pub trait FrameSource {
    /// 下一帧; `None` 表示流结束 (包括读取失败)
    fn next_frame(&mut self) -> Option<Frame>;

    /// 标称帧率
    fn fps(&self) -> f64;
}
