// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 推理线程模块
/// Inference worker: 帧队列 → 检测 + 跟踪 → 结果队列
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{error, info, warn};

use super::cancel::{CancelOnDrop, StopToken};
use super::channel::{Consumer, Producer, Received};
use crate::detection::types::{DetectionBatch, Frame};
use crate::detection::TrackingDetector;
use crate::error::PipelineError;

/// 推理线程退出时的汇总
#[derive(Debug, Default, Clone)]
pub struct WorkerReport {
    /// 已处理帧数
    pub frames_processed: u64,
    /// 推理失败信息 (失败后线程立即退出)
    pub failure: Option<String>,
}

/// 推理线程: 取帧 → 检测/跟踪 → 推送结果批次
///
/// 取帧超时且帧队列为空时置位停止信号; 推理出错时记录、置位并退出。
pub fn inference_thread<D: TrackingDetector>(
    frames: Consumer<Frame>,
    results: Producer<DetectionBatch>,
    mut detector: D,
    stop: StopToken,
    poll_timeout: Duration,
) -> WorkerReport {
    let _guard = CancelOnDrop::new(stop.clone());
    let mut report = WorkerReport::default();

    let mut count = 0u64;
    let mut last = Instant::now();
    let mut total_ms = 0.0;

    info!("✅ 推理线程启动");

    while !stop.is_cancelled() {
        let frame = match frames.get_timeout(poll_timeout) {
            Received::Item(frame) => frame,
            Received::Empty => {
                if frames.is_empty() {
                    info!("⏹️ 帧队列空闲超时, 通知停止");
                    stop.cancel();
                    break;
                }
                continue;
            }
            Received::Closed => break,
        };

        let start = Instant::now();
        let detections = match detector.track(&frame) {
            Ok(detections) => detections,
            Err(e) => {
                error!("❌ 推理失败 (帧 {}): {:#}", frame.index, e);
                report.failure = Some(format!("{:#}", e));
                break;
            }
        };
        let inference_ms = start.elapsed().as_secs_f64() * 1000.0;

        report.frames_processed += 1;
        count += 1;
        total_ms += inference_ms;
        if last.elapsed().as_secs_f64() >= 1.0 {
            let elapsed = last.elapsed().as_secs_f64();
            info!(
                "📊 推理统计: 处理{}帧 | 实际{:.1}fps | 每帧{:.1}ms",
                count,
                count as f64 / elapsed,
                total_ms / count as f64
            );
            last = Instant::now();
            count = 0;
            total_ms = 0.0;
        }

        let mut batch = DetectionBatch {
            frame_index: frame.index,
            detections,
            inference_ms,
        };

        // 结果队列满时等待主循环消费, 期间仍响应停止信号
        loop {
            match results.put_timeout(batch, poll_timeout) {
                Ok(()) => break,
                Err(returned) => {
                    if stop.is_cancelled() {
                        return report;
                    }
                    batch = returned;
                }
            }
        }
    }

    info!(
        "✅ 推理线程退出 (共处理 {} 帧)",
        report.frames_processed
    );
    report
}

/// 启动推理线程
pub fn spawn_inference<D: TrackingDetector + 'static>(
    frames: Consumer<Frame>,
    results: Producer<DetectionBatch>,
    detector: D,
    stop: StopToken,
    poll_timeout: Duration,
) -> Result<JoinHandle<WorkerReport>, PipelineError> {
    std::thread::Builder::new()
        .name("inference".to_string())
        .spawn(move || inference_thread(frames, results, detector, stop, poll_timeout))
        .map_err(PipelineError::WorkerSpawn)
}

/// 等待推理线程结束; panic 视为推理失败
pub fn join_inference(handle: JoinHandle<WorkerReport>) -> WorkerReport {
    match handle.join() {
        Ok(report) => report,
        Err(_) => {
            warn!("⚠️ 推理线程 panic");
            WorkerReport {
                frames_processed: 0,
                failure: Some("inference worker panicked".to_string()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::types::{BBox, Detection};
    use crate::pipeline::channel::bounded;
    use anyhow::{bail, Result};
    use image::RgbImage;

    struct EchoDetector;

    impl TrackingDetector for EchoDetector {
        fn track(&mut self, frame: &Frame) -> Result<Vec<Detection>> {
            Ok(vec![Detection {
                bbox: BBox::new(0.0, 0.0, 10.0, 10.0, 0.9, 0),
                track_id: Some(frame.index as u32),
            }])
        }
    }

    struct FailingDetector;

    impl TrackingDetector for FailingDetector {
        fn track(&mut self, _frame: &Frame) -> Result<Vec<Detection>> {
            bail!("cuda out of memory")
        }
    }

    fn frame(index: u64) -> Frame {
        Frame::new(index, RgbImage::new(4, 4))
    }

    const POLL: Duration = Duration::from_millis(50);

    #[test]
    fn test_processes_in_order_then_stops_when_idle() {
        let (frame_tx, frame_rx) = bounded(2);
        let (result_tx, result_rx) = bounded(4);
        let stop = StopToken::new();
        assert!(frame_tx.try_put(frame(0)));
        assert!(frame_tx.try_put(frame(1)));

        let handle =
            spawn_inference(frame_rx, result_tx, EchoDetector, stop.clone(), POLL).unwrap();
        let report = join_inference(handle);

        assert_eq!(report.frames_processed, 2);
        assert!(report.failure.is_none());
        assert!(stop.is_cancelled());
        assert_eq!(result_rx.try_get().unwrap().frame_index, 0);
        assert_eq!(result_rx.try_get().unwrap().frame_index, 1);
    }

    #[test]
    fn test_failure_sets_stop_and_reports() {
        let (frame_tx, frame_rx) = bounded(2);
        let (result_tx, result_rx) = bounded(2);
        let stop = StopToken::new();
        assert!(frame_tx.try_put(frame(0)));

        let report = inference_thread(frame_rx, result_tx, FailingDetector, stop.clone(), POLL);
        assert!(stop.is_cancelled());
        assert!(report.failure.unwrap().contains("out of memory"));
        assert!(result_rx.try_get().is_none());
    }

    #[test]
    fn test_full_result_queue_does_not_block_shutdown() {
        let (frame_tx, frame_rx) = bounded(2);
        let (result_tx, _result_rx) = bounded(1);
        let stop = StopToken::new();
        assert!(frame_tx.try_put(frame(0)));
        assert!(frame_tx.try_put(frame(1)));

        let handle =
            spawn_inference(frame_rx, result_tx, EchoDetector, stop.clone(), POLL).unwrap();
        std::thread::sleep(Duration::from_millis(100));
        stop.cancel();
        let report = join_inference(handle);
        assert_eq!(report.frames_processed, 2);
    }

    #[test]
    fn test_pre_cancelled_worker_exits_immediately() {
        let (_frame_tx, frame_rx) = bounded::<Frame>(2);
        let (result_tx, _result_rx) = bounded(2);
        let stop = StopToken::new();
        stop.cancel();
        let report = inference_thread(frame_rx, result_tx, EchoDetector, stop, POLL);
        assert_eq!(report.frames_processed, 0);
    }
}
