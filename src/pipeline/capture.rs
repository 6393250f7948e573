// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 采集主循环 (Capture loop)
///
/// 每次迭代: 读帧 → 非阻塞入队 → 取最新检测批次 → 按跟踪ID裁剪。
/// 推理线程始终在帧源释放前 join。
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use super::aggregator::{collect_crops, TrackRegistry};
use super::cancel::StopToken;
use super::channel::{bounded, Consumer, Producer};
use super::inference::{join_inference, spawn_inference, WorkerReport};
use crate::config::PipelineConfig;
use crate::detection::types::{DetectionBatch, Frame};
use crate::detection::TrackingDetector;
use crate::error::PipelineError;
use crate::input::FrameSource;

/// 主循环结束原因
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FinishReason {
    /// 帧源读完
    EndOfStream,
    /// 推理线程置位停止 (空闲超时或推理失败)
    Stopped,
    /// 用户按键退出
    Quit,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    Continue,
    Finished(FinishReason),
}

/// 采集计数
#[derive(Clone, Debug, Default)]
pub struct CaptureStats {
    pub frames_read: u64,
    pub frames_enqueued: u64,
    pub frames_dropped: u64,
    pub batches_consumed: u64,
    pub crops_collected: u64,
}

/// 主循环结束后的全部产物
#[derive(Debug)]
pub struct CaptureOutcome {
    pub registry: TrackRegistry,
    pub stats: CaptureStats,
    pub reason: FinishReason,
    pub worker: WorkerReport,
}

/// 按标称帧率节流
pub struct FramePacer {
    interval: Option<Duration>,
    next: Instant,
}

impl FramePacer {
    pub fn new(fps: f64, enabled: bool) -> Self {
        let interval = (enabled && fps > 0.0).then(|| Duration::from_secs_f64(1.0 / fps));
        Self {
            interval,
            next: Instant::now(),
        }
    }

    /// 不节流
    pub fn unpaced() -> Self {
        Self::new(0.0, false)
    }

    /// 睡眠到下一帧时刻; 落后时不补睡
    pub fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
        }
        self.next = self.next.max(now) + interval;
    }
}

pub struct CaptureLoop<S: FrameSource> {
    source: Option<S>,
    fps: f64,
    frames: Producer<Frame>,
    results: Consumer<DetectionBatch>,
    worker: Option<JoinHandle<WorkerReport>>,
    stop: StopToken,
    padding: u32,
    registry: TrackRegistry,
    /// 最近一次收到的批次; 没有新批次时继续沿用
    latest: Option<DetectionBatch>,
    current: Option<Frame>,
    finished: Option<FinishReason>,
    stats: CaptureStats,
    window_start: Instant,
    window_frames: u64,
}

impl<S: FrameSource> CaptureLoop<S> {
    /// 创建队列并启动推理线程
    pub fn start<D: TrackingDetector + 'static>(
        source: S,
        detector: D,
        config: &PipelineConfig,
    ) -> Result<Self, PipelineError> {
        let stop = StopToken::new();
        let (frame_tx, frame_rx) = bounded(config.frame_queue_capacity);
        let (result_tx, result_rx) = bounded(config.result_queue_capacity);
        let worker = spawn_inference(
            frame_rx,
            result_tx,
            detector,
            stop.clone(),
            config.poll_timeout(),
        )?;

        let fps = source.fps();
        info!(
            "🎬 采集启动: {:.1}fps | 帧队列 {} | 结果队列 {} | 外扩 {}px",
            fps,
            frame_tx.capacity(),
            config.result_queue_capacity,
            config.crop_padding
        );

        Ok(Self {
            source: Some(source),
            fps,
            frames: frame_tx,
            results: result_rx,
            worker: Some(worker),
            stop,
            padding: config.crop_padding,
            registry: TrackRegistry::new(),
            latest: None,
            current: None,
            finished: None,
            stats: CaptureStats::default(),
            window_start: Instant::now(),
            window_frames: 0,
        })
    }

    /// 执行一次迭代
    pub fn step(&mut self) -> Step {
        if let Some(reason) = self.finished {
            return Step::Finished(reason);
        }
        if self.stop.is_cancelled() {
            info!("⏹️ 收到停止信号, 结束采集");
            return self.end(FinishReason::Stopped);
        }

        let Some(frame) = self.source.as_mut().and_then(|s| s.next_frame()) else {
            info!("🏁 视频读取完毕 (共 {} 帧)", self.stats.frames_read);
            self.stop.cancel();
            return self.end(FinishReason::EndOfStream);
        };
        self.stats.frames_read += 1;
        self.window_frames += 1;

        if self.frames.try_put(frame.clone()) {
            self.stats.frames_enqueued += 1;
        } else {
            self.stats.frames_dropped += 1;
        }

        if let Some(batch) = self.results.drain_latest() {
            self.stats.batches_consumed += 1;
            self.latest = Some(batch);
        }
        if let Some(batch) = &self.latest {
            if batch.frame_index != frame.index {
                debug!("批次来自帧 {}, 当前帧 {}", batch.frame_index, frame.index);
            }
            let added = collect_crops(&frame, batch, self.padding, &mut self.registry);
            self.stats.crops_collected += added as u64;
        }
        self.current = Some(frame);

        self.log_stats();
        Step::Continue
    }

    /// 用户退出
    pub fn request_quit(&mut self) {
        if self.finished.is_none() {
            info!("👋 用户退出");
            self.stop.cancel();
            self.finished = Some(FinishReason::Quit);
        }
    }

    /// 一直运行到结束
    pub fn run_to_end(mut self, mut pacer: FramePacer) -> CaptureOutcome {
        loop {
            pacer.wait();
            if let Step::Finished(_) = self.step() {
                break;
            }
        }
        self.finish()
    }

    /// 置位停止, join 推理线程, 再释放帧源
    pub fn finish(mut self) -> CaptureOutcome {
        self.stop.cancel();
        let worker = self.worker.take().map(join_inference).unwrap_or_default();
        drop(self.source.take());

        if let Some(failure) = &worker.failure {
            warn!("⚠️ 推理线程异常退出: {}, 仅保存已收集的结果", failure);
        }
        info!(
            "📊 采集结束: 读取{}帧 | 入队{} | 丢弃{} | 批次{} | 裁剪{} | ID{}",
            self.stats.frames_read,
            self.stats.frames_enqueued,
            self.stats.frames_dropped,
            self.stats.batches_consumed,
            self.stats.crops_collected,
            self.registry.len()
        );

        CaptureOutcome {
            registry: std::mem::take(&mut self.registry),
            stats: self.stats.clone(),
            reason: self.finished.unwrap_or(FinishReason::Stopped),
            worker,
        }
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn latest_batch(&self) -> Option<&DetectionBatch> {
        self.latest.as_ref()
    }

    pub fn registry(&self) -> &TrackRegistry {
        &self.registry
    }

    pub fn stats(&self) -> &CaptureStats {
        &self.stats
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn stop_token(&self) -> StopToken {
        self.stop.clone()
    }

    fn end(&mut self, reason: FinishReason) -> Step {
        self.finished = Some(reason);
        Step::Finished(reason)
    }

    fn log_stats(&mut self) {
        let elapsed = self.window_start.elapsed().as_secs_f64();
        if elapsed >= 1.0 {
            info!(
                "📊 采集统计: {:.1}fps | 入队{} | 丢弃{} | 批次{} | ID{}",
                self.window_frames as f64 / elapsed,
                self.stats.frames_enqueued,
                self.stats.frames_dropped,
                self.stats.batches_consumed,
                self.registry.len()
            );
            self.window_start = Instant::now();
            self.window_frames = 0;
        }
    }
}

impl<S: FrameSource> Drop for CaptureLoop<S> {
    fn drop(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.worker.take() {
            join_inference(handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, Detection};
    use anyhow::{bail, Result};
    use image::RgbImage;

    struct VecSource {
        remaining: u64,
        next_index: u64,
        delay: Duration,
    }

    impl VecSource {
        fn new(frames: u64, delay_ms: u64) -> Self {
            Self {
                remaining: frames,
                next_index: 0,
                delay: Duration::from_millis(delay_ms),
            }
        }
    }

    impl FrameSource for VecSource {
        fn next_frame(&mut self) -> Option<Frame> {
            if self.remaining == 0 {
                return None;
            }
            std::thread::sleep(self.delay);
            self.remaining -= 1;
            let frame = Frame::new(self.next_index, RgbImage::new(160, 120));
            self.next_index += 1;
            Some(frame)
        }

        fn fps(&self) -> f64 {
            25.0
        }
    }

    struct OnePerson;

    impl TrackingDetector for OnePerson {
        fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            Ok(vec![Detection {
                bbox: BBox::new(40.0, 20.0, 80.0, 100.0, 0.9, 0),
                track_id: Some(1),
            }])
        }
    }

    struct Broken;

    impl TrackingDetector for Broken {
        fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            bail!("session lost")
        }
    }

    fn config() -> PipelineConfig {
        PipelineConfig {
            worker_poll_timeout_ms: 50,
            ..PipelineConfig::default()
        }
    }

    #[test]
    fn test_runs_to_end_of_stream() {
        let capture = CaptureLoop::start(VecSource::new(20, 10), OnePerson, &config()).unwrap();
        let stop = capture.stop_token();
        let outcome = capture.run_to_end(FramePacer::unpaced());

        assert!(stop.is_cancelled());
        assert_eq!(outcome.reason, FinishReason::EndOfStream);
        assert_eq!(outcome.stats.frames_read, 20);
        assert_eq!(
            outcome.stats.frames_enqueued + outcome.stats.frames_dropped,
            20
        );
        assert!(outcome.worker.failure.is_none());
        assert_eq!(outcome.registry.len(), 1);
        let candidates = outcome.registry.candidates(1).unwrap();
        assert!(!candidates.is_empty());
        // 40x80 外扩 30 → 100x120 (高度被帧截断)
        assert_eq!(
            (candidates[0].image.width(), candidates[0].image.height()),
            (100, 120)
        );
        assert_eq!(candidates[0].area, 40 * 80);
    }

    #[test]
    fn test_latest_batch_is_reused_between_results() {
        let mut capture =
            CaptureLoop::start(VecSource::new(50, 10), OnePerson, &config()).unwrap();
        let mut steps = 0;
        while capture.latest_batch().is_none() && steps < 50 {
            capture.step();
            steps += 1;
        }
        assert!(capture.latest_batch().is_some());
        // 批次被沿用, 每帧都产生裁剪
        let before = capture.registry().candidate_count();
        capture.step();
        assert!(capture.registry().candidate_count() > before);
        assert!(capture.current_frame().is_some());
        capture.finish();
    }

    #[test]
    fn test_quit_stops_loop() {
        let mut capture = CaptureLoop::start(VecSource::new(100, 1), OnePerson, &config()).unwrap();
        assert_eq!(capture.step(), Step::Continue);
        capture.request_quit();
        assert_eq!(capture.step(), Step::Finished(FinishReason::Quit));
        let outcome = capture.finish();
        assert_eq!(outcome.reason, FinishReason::Quit);
        assert!(outcome.stats.frames_read < 100);
    }

    #[test]
    fn test_inference_failure_stops_capture() {
        let mut capture = CaptureLoop::start(VecSource::new(500, 5), Broken, &config()).unwrap();
        let mut reason = None;
        for _ in 0..500 {
            if let Step::Finished(r) = capture.step() {
                reason = Some(r);
                break;
            }
        }
        assert_eq!(reason, Some(FinishReason::Stopped));
        let outcome = capture.finish();
        assert!(outcome.worker.failure.unwrap().contains("session lost"));
        assert!(outcome.registry.is_empty());
    }

    #[test]
    fn test_pacer_spaces_frames() {
        let mut pacer = FramePacer::new(50.0, true);
        let start = Instant::now();
        for _ in 0..4 {
            pacer.wait();
        }
        // 第一次不等待, 之后每次 20ms
        assert!(start.elapsed() >= Duration::from_millis(55));

        let mut unpaced = FramePacer::unpaced();
        let start = Instant::now();
        for _ in 0..100 {
            unpaced.wait();
        }
        assert!(start.elapsed() < Duration::from_millis(50));
    }
}
