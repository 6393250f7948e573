// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// FFmpeg解码过滤器模块
/// FFmpeg decode filter: YUV420P 帧 → RGB 图像 → 采集队列
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crossbeam_channel::Sender;
use ez_ffmpeg::filter::frame_filter::FrameFilter;
use ez_ffmpeg::filter::frame_filter_context::FrameFilterContext;
use ez_ffmpeg::{AVMediaType, Frame};
use image::RgbImage;
use tracing::{debug, info, warn};

/// FFmpeg解码过滤器
///
/// 发送端阻塞: 视频文件按顺序读完, 不丢帧。接收端关闭或 `abort` 置位时终止解码。
pub struct DecodeFilter {
    tx: Sender<RgbImage>,
    abort: Arc<AtomicBool>,
    count: usize,
    last: Instant,
    pub dropped_frames: usize, // 丢弃的帧数
    pub total_frames: usize,   // 总帧数
}

impl DecodeFilter {
    pub fn new(tx: Sender<RgbImage>, abort: Arc<AtomicBool>) -> Self {
        Self {
            tx,
            abort,
            count: 0,
            last: Instant::now(),
            dropped_frames: 0,
            total_frames: 0,
        }
    }

    fn drop_frame(&mut self, reason: &str) {
        self.dropped_frames += 1;
        if self.total_frames <= 10 {
            warn!("⚠️ 丢弃帧 #{}: {}", self.total_frames, reason);
        }
    }
}

impl FrameFilter for DecodeFilter {
    fn media_type(&self) -> AVMediaType {
        AVMediaType::AVMEDIA_TYPE_VIDEO
    }

    fn init(&mut self, _ctx: &FrameFilterContext) -> Result<(), String> {
        info!("✅ 解码线程启动");
        Ok(())
    }

    fn filter_frame(
        &mut self,
        frame: Frame,
        _ctx: &FrameFilterContext,
    ) -> Result<Option<Frame>, String> {
        if self.abort.load(Ordering::Relaxed) {
            return Err("decode aborted".to_string());
        }

        self.total_frames += 1;

        // SAFETY: 指针非空已检查, 读取的平面范围受 width/height/linesize 约束
        let image = unsafe {
            if frame.as_ptr().is_null() || frame.is_empty() || frame.is_corrupt() {
                self.drop_frame("空帧/损坏帧");
                return Ok(None);
            }

            let raw = &*frame.as_ptr();
            let w = raw.width.max(0) as usize;
            let h = raw.height.max(0) as usize;
            if w == 0 || h == 0 {
                self.drop_frame("非法分辨率");
                return Ok(None);
            }

            let y_plane = raw.data[0];
            let u_plane = raw.data[1];
            let v_plane = raw.data[2];
            let y_stride = raw.linesize[0].max(0) as usize;
            let uv_stride = raw.linesize[1].max(0) as usize;

            if y_plane.is_null() || u_plane.is_null() || v_plane.is_null() {
                self.drop_frame("YUV指针为空");
                return Ok(None);
            }
            if y_stride < w || uv_stride < w.div_ceil(2) {
                self.drop_frame("步长异常");
                return Ok(None);
            }

            let mut buffer = vec![0u8; w * h * 3];
            yuv420p_to_rgb(
                y_plane, u_plane, v_plane, y_stride, uv_stride, &mut buffer, w, h,
            );
            match RgbImage::from_raw(w as u32, h as u32, buffer) {
                Some(image) => image,
                None => {
                    self.drop_frame("RGB缓冲区尺寸不符");
                    return Ok(None);
                }
            }
        };

        self.count += 1;
        if self.last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = self.last.elapsed().as_secs_f64();
            debug!(
                "📺 解码统计: {:.1}fps | 总帧{} | 丢弃{}",
                self.count as f64 / elapsed,
                self.total_frames,
                self.dropped_frames
            );
            self.last = Instant::now();
            self.count = 0;
        }

        // 接收端已关闭 → 停止解码
        if self.tx.send(image).is_err() {
            return Err("frame receiver closed".to_string());
        }

        Ok(Some(frame))
    }

    fn uninit(&mut self, _ctx: &FrameFilterContext) {
        info!(
            "✅ 解码线程退出 (总帧{} | 丢弃{})",
            self.total_frames, self.dropped_frames
        );
    }
}

/// YUV420P → RGB (BT.601, 定点运算)
#[inline]
#[allow(clippy::too_many_arguments)]
unsafe fn yuv420p_to_rgb(
    y_plane: *const u8,
    u_plane: *const u8,
    v_plane: *const u8,
    y_stride: usize,
    uv_stride: usize,
    buffer: &mut [u8],
    width: usize,
    height: usize,
) {
    let mut out_idx = 0;
    for y in 0..height {
        let y_row = y * y_stride;
        let uv_row = (y >> 1) * uv_stride;

        for x in 0..width {
            let y_val = *y_plane.add(y_row + x) as i32;
            let u_val = *u_plane.add(uv_row + (x >> 1)) as i32 - 128;
            let v_val = *v_plane.add(uv_row + (x >> 1)) as i32 - 128;

            buffer[out_idx] = (y_val + ((v_val * 179) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 1] =
                (y_val - ((u_val * 44) >> 7) - ((v_val * 91) >> 7)).clamp(0, 255) as u8;
            buffer[out_idx + 2] = (y_val + ((u_val * 227) >> 7)).clamp(0, 255) as u8;
            out_idx += 3;
        }
    }
}
