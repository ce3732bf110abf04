//! `spacesync plan`: a read-only pass that reports what `run` would do.

use clap::Args;
use std::path::PathBuf;

use spacesync_engine::PassMode;

use crate::config::AppConfig;
use crate::error::CliResult;

#[derive(Args)]
pub struct PlanArgs {
    /// Path to the configuration file
    #[arg(long, env = "SPACESYNC_CONFIG", default_value = "spacesync.json")]
    pub config: PathBuf,
}

pub async fn execute(args: PlanArgs) -> CliResult<()> {
    let config = AppConfig::load(&args.config)?;
    super::run_pass(&config, PassMode::Plan).await
}
