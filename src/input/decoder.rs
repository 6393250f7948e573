// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频文件解码器
/// Video file decoder backed by FFmpeg
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam_channel::Receiver;
use ez_ffmpeg::core::context::null_output::create_null_output;
use ez_ffmpeg::filter::frame_pipeline_builder::FramePipelineBuilder;
use ez_ffmpeg::stream_info::{find_video_stream_info, StreamInfo};
use ez_ffmpeg::{AVMediaType, FfmpegContext};
use image::RgbImage;
use tracing::{error, info, warn};

use super::decode_filter::DecodeFilter;
use super::FrameSource;
use crate::detection::types::Frame;
use crate::error::PipelineError;

/// 帧率探测失败时的默认值
pub const FALLBACK_FPS: f64 = 30.0;

/// 解码线程 → 主循环 的缓冲帧数
const DECODE_BUFFER: usize = 4;

/// FFmpeg 视频源: 后台线程解码, `next_frame` 按顺序取帧
pub struct FfmpegSource {
    fps: f64,
    next_index: u64,
    rx: Option<Receiver<RgbImage>>,
    abort: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl FfmpegSource {
    /// 打开视频文件并启动解码线程
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        if !path.exists() {
            return Err(PipelineError::VideoNotFound(path.to_path_buf()));
        }
        let url = path.to_string_lossy().to_string();
        let fps = probe_fps(&url);

        let (tx, rx) = crossbeam_channel::bounded(DECODE_BUFFER);
        let abort = Arc::new(AtomicBool::new(false));
        let filter = DecodeFilter::new(tx, Arc::clone(&abort));

        let handle = std::thread::Builder::new()
            .name("ffmpeg-decode".to_string())
            .spawn(move || {
                if let Err(e) = decode_file(&url, filter) {
                    error!("❌ 解码失败: {}", e);
                }
            })
            .map_err(PipelineError::Io)?;

        info!("🎬 视频源: {} ({:.2} fps)", path.display(), fps);
        Ok(Self {
            fps,
            next_index: 0,
            rx: Some(rx),
            abort,
            handle: Some(handle),
        })
    }
}

impl FrameSource for FfmpegSource {
    fn next_frame(&mut self) -> Option<Frame> {
        // 解码线程结束后发送端被释放, recv 返回 Err 即视为流结束
        let image = self.rx.as_ref()?.recv().ok()?;
        let frame = Frame::new(self.next_index, image);
        self.next_index += 1;
        Some(frame)
    }

    fn fps(&self) -> f64 {
        self.fps
    }
}

impl Drop for FfmpegSource {
    fn drop(&mut self) {
        self.abort.store(true, Ordering::Relaxed);
        // 先关闭接收端, 解除解码线程的阻塞发送
        self.rx.take();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("⚠️ 解码线程异常退出");
            }
        }
    }
}

/// 读取视频流平均帧率
fn probe_fps(url: &str) -> f64 {
    match find_video_stream_info(url) {
        Ok(Some(StreamInfo::Video { avg_frame_rate, .. }))
            if avg_frame_rate.num > 0 && avg_frame_rate.den > 0 =>
        {
            avg_frame_rate.num as f64 / avg_frame_rate.den as f64
        }
        Ok(_) => {
            warn!("⚠️ 未能获取帧率, 使用默认 {} fps", FALLBACK_FPS);
            FALLBACK_FPS
        }
        Err(e) => {
            warn!("⚠️ 读取流信息失败: {}, 使用默认 {} fps", e, FALLBACK_FPS);
            FALLBACK_FPS
        }
    }
}

/// CPU软件解码, 统一转为 YUV420P 交给过滤器
fn decode_file(url: &str, filter: DecodeFilter) -> Result<(), Box<dyn std::error::Error>> {
    let pipe: FramePipelineBuilder = AVMediaType::AVMEDIA_TYPE_VIDEO.into();
    let pipe = pipe.filter("decode", Box::new(filter));
    let out = create_null_output().add_frame_pipeline(pipe);

    let ctx = FfmpegContext::builder()
        .input(url)
        .filter_desc("format=yuv420p")
        .output(out)
        .build()
        .map_err(|e| format!("构建失败: {}", e))?;

    let sch = ctx.start().map_err(|e| format!("启动失败: {}", e))?;
    // 过滤器主动中止时 wait 返回错误, 属于正常退出路径
    if let Err(e) = sch.wait() {
        info!("🛑 解码结束: {}", e);
    }
    Ok(())
}
