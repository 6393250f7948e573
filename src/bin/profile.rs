// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 提取 + 描述 一次完成
///
/// 视频不存在时直接退出, 不会调用描述服务。
use std::path::PathBuf;

use anyhow::bail;
use clap::Parser;
use person_profiler::runner::{self, ConfigArgs, DescribeArgs, ExtractArgs};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "视频人物画像 - 提取并描述", long_about = None)]
struct Args {
    /// 视频文件
    video: PathBuf,

    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    extract: ExtractArgs,

    #[command(flatten)]
    describe: DescribeArgs,
}

fn main() -> anyhow::Result<()> {
    runner::init_tracing();
    let args = Args::parse();

    if !args.video.exists() {
        bail!("视频文件不存在: {}", args.video.display());
    }

    let mut config = args.config.load();
    args.extract.apply(&mut config);
    args.describe.apply(&mut config);

    tracing::info!("🚀 第一步: 人物提取");
    let report = runner::extract(&args.video, &config, args.extract.headless)?;
    if report.files.is_empty() {
        bail!("没有可描述的人物图片");
    }

    tracing::info!("🚀 第二步: 人物描述");
    runner::describe(&config, &args.describe.api_key)?;
    Ok(())
}
