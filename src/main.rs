use std::path::PathBuf;

use autoprompter_lib::config::AppConfig;
use clap::Parser;

#[derive(Parser)]
#[command(
    name = "autoprompter",
    version,
    about = "AutoPrompter coordinator daemon (newline-delimited JSON on stdin/stdout)"
)]
struct Args {
    /// Directory for the persisted settings and usage records
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Seconds between session time-limit checks
    #[arg(long)]
    check_interval_secs: Option<u64>,

    /// Keep all state in memory; nothing is written to disk
    #[arg(long)]
    memory: bool,

    /// Write the effective configuration to config.json before starting
    #[arg(long)]
    save_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    autoprompter_lib::init_logging()?;

    let args = Args::parse();
    let mut config = AppConfig::load();
    if let Some(dir) = args.data_dir {
        config.data_dir = Some(dir);
    }
    if let Some(secs) = args.check_interval_secs {
        config.quota_check_interval_secs = secs;
    }

    if args.save_config {
        let path = config.save().map_err(anyhow::Error::msg)?;
        tracing::info!("Saved configuration to {}", path.display());
    }

    autoprompter_lib::run(config, args.memory).await
}
