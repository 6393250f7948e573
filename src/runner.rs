// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
//! 可执行程序共用流程: 日志初始化, 提取, 描述

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::{AppConfig, PipelineConfig};
use crate::describe::{run_describe, DescribeSummary, GeminiClient};
use crate::detection::YoloTracker;
use crate::error::PipelineError;
use crate::input::{FfmpegSource, FrameSource};
use crate::pipeline::{
    finalize, CaptureLoop, CaptureOutcome, ExtractionReport, FinishReason, FramePacer, PHasher,
};
use crate::renderer::display_loop;

/// 初始化日志 (RUST_LOG 覆盖, 默认 info)
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

fn log_outcome(outcome: &CaptureOutcome) {
    match outcome.reason {
        FinishReason::EndOfStream => info!("🏁 视频处理完成"),
        FinishReason::Stopped => info!("⏹️ 推理线程已停止"),
        FinishReason::Quit => info!("👋 用户中止, 保存已收集的人物"),
    }
    if outcome.worker.failure.is_some() {
        warn!("⚠️ 推理中途失败, 结果可能不完整");
    }
}

/// 视频 → 去重后的人物裁剪图
pub fn extract(video: &Path, config: &AppConfig, headless: bool) -> Result<ExtractionReport> {
    if !video.exists() {
        return Err(PipelineError::VideoNotFound(video.to_path_buf()).into());
    }
    config.log_summary();

    let source = FfmpegSource::open(video)
        .with_context(|| format!("无法打开视频 {}", video.display()))?;
    let detector = YoloTracker::from_config(&config.detector, &config.tracker)
        .context("加载检测模型失败")?;
    let capture = CaptureLoop::start(source, detector, &config.pipeline)?;
    let pacer = FramePacer::new(capture.fps(), config.pipeline.realtime);

    if headless {
        info!("🖥️ 无窗口模式");
        let outcome = capture.run_to_end(pacer);
        log_outcome(&outcome);
        return Ok(finalize(&outcome.registry, &PHasher::new(), &config.pipeline)?);
    }

    let title = format!("person-profiler - {}", video.display());
    run_windowed(capture, pacer, title, config.pipeline.clone())
}

/// 在 macroquad 窗口中运行; 收尾也在窗口任务内完成
fn run_windowed<S: FrameSource + 'static>(
    capture: CaptureLoop<S>,
    pacer: FramePacer,
    title: String,
    pipeline: PipelineConfig,
) -> Result<ExtractionReport> {
    let slot: Rc<RefCell<Option<Result<ExtractionReport, PipelineError>>>> =
        Rc::new(RefCell::new(None));
    let out = slot.clone();

    let conf = macroquad::window::Conf {
        window_title: title,
        window_width: 1280,
        window_height: 720,
        window_resizable: true,
        ..Default::default()
    };
    macroquad::Window::from_config(conf, async move {
        let outcome = display_loop(capture, pacer).await;
        log_outcome(&outcome);
        let report = finalize(&outcome.registry, &PHasher::new(), &pipeline);
        *out.borrow_mut() = Some(report);
    });

    let report = slot
        .borrow_mut()
        .take()
        .ok_or_else(|| anyhow!("显示窗口在处理完成前关闭"))?;
    Ok(report?)
}

/// 裁剪图 → results.json / results.csv
pub fn describe(config: &AppConfig, api_key: &str) -> Result<DescribeSummary> {
    if api_key.trim().is_empty() {
        return Err(anyhow!("缺少 API key (--api-key 或 GEMINI_API_KEY)"));
    }
    info!(
        "🧠 描述服务: {} | 目录 {} | 最多 {} 张",
        config.describe.model,
        config.pipeline.output_dir.display(),
        config.describe.limit
    );

    let client = GeminiClient::new(api_key, &config.describe);
    let summary = run_describe(&client, &config.pipeline.output_dir, &config.describe)
        .context("人物描述失败")?;

    info!(
        "✅ 描述汇总: {}/{} 成功 → {}{}",
        summary.succeeded,
        summary.attempted,
        summary.json_path.display(),
        summary
            .csv_path
            .as_ref()
            .map(|p| format!(", {}", p.display()))
            .unwrap_or_default()
    );
    Ok(summary)
}

// ========== 命令行参数 ==========

/// 配置文件与输出目录 (各程序共用)
#[derive(clap::Args, Debug, Clone)]
pub struct ConfigArgs {
    /// JSON 配置文件 (不存在时写出默认配置)
    #[arg(long, default_value = "profiler.json")]
    pub config: PathBuf,

    /// 裁剪图目录
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,
}

impl ConfigArgs {
    pub fn load(&self) -> AppConfig {
        let mut config = AppConfig::load(&self.config);
        if let Some(dir) = &self.output_dir {
            config.pipeline.output_dir = dir.clone();
        }
        config
    }
}

/// 提取阶段参数
#[derive(clap::Args, Debug, Clone)]
pub struct ExtractArgs {
    /// ONNX 检测模型
    #[arg(short, long)]
    pub model: Option<PathBuf>,

    /// 推理设备: cpu | cuda[:N] | trt[:N]
    #[arg(long)]
    pub device: Option<String>,

    /// 置信度阈值
    #[arg(long)]
    pub conf: Option<f32>,

    /// 不打开窗口
    #[arg(long)]
    pub headless: bool,

    /// 不按视频帧率节流
    #[arg(long)]
    pub no_realtime: bool,
}

impl ExtractArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(model) = &self.model {
            config.detector.model_path = model.clone();
        }
        if let Some(device) = &self.device {
            config.detector.device = device.clone();
        }
        if let Some(conf) = self.conf {
            config.detector.conf_threshold = conf;
        }
        if self.no_realtime {
            config.pipeline.realtime = false;
        }
    }
}

/// 描述阶段参数
#[derive(clap::Args, Debug, Clone)]
pub struct DescribeArgs {
    /// Gemini API key
    #[arg(long, env = "GEMINI_API_KEY", hide_env_values = true)]
    pub api_key: String,

    /// 最多描述的图片数
    #[arg(long)]
    pub limit: Option<usize>,

    /// Gemini 模型名
    #[arg(long)]
    pub gemini_model: Option<String>,
}

impl DescribeArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(limit) = self.limit {
            config.describe.limit = limit;
        }
        if let Some(model) = &self.gemini_model {
            config.describe.model = model.clone();
        }
    }
}
