// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 视频人物提取
///
/// 1. 采集线程: 读帧 + 按跟踪ID裁剪 (主线程, 可选窗口显示)
/// 2. 推理线程: YOLOv8 检测 + ByteTrack 跟踪
/// 3. 收尾:     每个ID选最大裁剪 → pHash 去重 → person_<n>.jpg
use std::path::PathBuf;

use clap::Parser;
use person_profiler::runner::{self, ConfigArgs, ExtractArgs};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "视频人物提取 - 检测、跟踪、裁剪、去重", long_about = None)]
struct Args {
    /// 视频文件
    video: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    extract: ExtractArgs,
}

fn main() -> anyhow::Result<()> {
    runner::init_tracing();
    let args = Args::parse();

    let mut config = args.config.load();
    args.extract.apply(&mut config);

    tracing::info!("🚀 人物提取启动: {}", args.video.display());
    let report = runner::extract(&args.video, &config, args.extract.headless)?;
    if report.files.is_empty() {
        tracing::warn!("⚠️ 未保存任何人物");
    }
    Ok(())
}
