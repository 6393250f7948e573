// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license
/// 人物描述 (Gemini)
///
/// 读取 person_<n>.jpg → 描述服务 → results.json / results.csv
use clap::Parser;
use person_profiler::runner::{self, ConfigArgs, DescribeArgs};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser, Debug)]
#[command(author, version, about = "人物描述 - 年龄、性别、人群与消费者画像", long_about = None)]
struct Args {
    #[command(flatten)]
    config: ConfigArgs,

    #[command(flatten)]
    describe: DescribeArgs,
}

fn main() -> anyhow::Result<()> {
    runner::init_tracing();
    let args = Args::parse();

    let mut config = args.config.load();
    args.describe.apply(&mut config);

    runner::describe(&config, &args.describe.api_key)?;
    Ok(())
}
