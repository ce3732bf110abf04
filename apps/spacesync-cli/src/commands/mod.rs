//! Subcommand implementations.

pub mod check;
pub mod plan;
pub mod run;

use std::sync::Arc;

use spacesync_connector::auth::{GoogleAuth, ServiceAccountKey};
use spacesync_connector::google::{GoogleChat, GoogleDirectory};
use spacesync_connector::UserId;
use spacesync_engine::{Catalog, PassConfig, PassMode, PassOutcome, SyncOrchestrator};
use tracing::info;

use crate::config::AppConfig;
use crate::error::{CliError, CliResult};

/// Build the token provider from the configured service-account key.
fn build_auth(config: &AppConfig) -> CliResult<Arc<GoogleAuth>> {
    let key = ServiceAccountKey::from_file(&config.service_account_file)
        .map_err(|e| CliError::Config(e.to_string()))?;
    let auth = GoogleAuth::new(key, &config.admin_user, config.scopes.clone())
        .map_err(|e| CliError::Config(e.to_string()))?;
    Ok(Arc::new(auth))
}

/// Wire the Google connectors and the engine together for one pass.
fn build_orchestrator(config: &AppConfig, mode: PassMode) -> CliResult<SyncOrchestrator> {
    let auth = build_auth(config)?;
    let directory = Arc::new(GoogleDirectory::new(auth.clone()));
    let chat = Arc::new(GoogleChat::new(auth));

    let mut pass_config = PassConfig::new(&config.ou_root_path, &config.traversal_role_id);
    pass_config.admin_user_id = config.admin_user_id.clone().map(UserId::new);
    pass_config.concurrency = config.concurrency;
    pass_config.catalog_path = Some(config.catalog_path.clone());
    pass_config.mode = mode;

    Ok(SyncOrchestrator::new(directory, chat.clone(), chat, pass_config))
}

/// Load the catalog, run one pass, and translate the report into an exit
/// status.
async fn run_pass(config: &AppConfig, mode: PassMode) -> CliResult<()> {
    let orchestrator = build_orchestrator(config, mode)?;
    let mut catalog = Catalog::load(&config.catalog_path)?;

    let report = orchestrator.run_pass(&mut catalog).await?;

    for failure in &report.failures {
        tracing::warn!(failure = %failure, "Unresolved item");
    }
    match report.outcome() {
        PassOutcome::CompletedClean => {
            info!(
                created = report.spaces_created,
                renamed = report.spaces_renamed,
                added = report.members_added,
                removed = report.members_removed,
                "Pass completed clean"
            );
            Ok(())
        }
        PassOutcome::CompletedWithErrors => Err(CliError::PassIncomplete {
            failures: report.failures.len()
                + report.workers_lost
                + usize::from(report.persist_error.is_some()),
        }),
    }
}
