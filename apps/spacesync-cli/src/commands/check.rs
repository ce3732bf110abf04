//! `spacesync check`: validate configuration and connectivity without
//! touching any Space.

use clap::Args;
use std::path::PathBuf;

use spacesync_engine::Catalog;
use tracing::info;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

#[derive(Args)]
pub struct CheckArgs {
    /// Path to the configuration file
    #[arg(long, env = "SPACESYNC_CONFIG", default_value = "spacesync.json")]
    pub config: PathBuf,

    /// Skip the live token exchange and only validate local files
    #[arg(long)]
    pub offline: bool,
}

pub async fn execute(args: CheckArgs) -> CliResult<()> {
    let config = AppConfig::load(&args.config)?;
    info!(path = %args.config.display(), "Configuration is valid");

    let catalog = Catalog::load(&config.catalog_path)
        .map_err(|e| CliError::CheckFailed(e.to_string()))?;
    info!(
        path = %config.catalog_path.display(),
        entries = catalog.len(),
        "Catalog is readable"
    );

    let auth = super::build_auth(&config)?;
    if args.offline {
        info!("Offline check passed (token exchange skipped)");
        return Ok(());
    }

    auth.token()
        .await
        .map_err(|e| CliError::CheckFailed(format!("token exchange: {e}")))?;
    info!(admin = %config.admin_user, "Obtained an access token via delegation");
    Ok(())
}
