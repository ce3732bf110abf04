//! The pass orchestrator.
//!
//! Drives one full reconciliation pass: fetch directory state, prune the
//! catalog, resolve traversal roles, fan per-OU work out over a bounded
//! pool, then persist the catalog. All directory reads happen before the
//! first external mutation, so a transport abort always leaves the Chat
//! side untouched.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use spacesync_connector::traits::{DirectorySource, MembershipOps, SpaceOps};
use spacesync_connector::{OrgUnitId, UserId};

use crate::catalog::{Catalog, CatalogEntry};
use crate::diff;
use crate::error::{ApplyFailure, Stage, SyncError, SyncResult};
use crate::reconcile::{self, SpaceAction};
use crate::roles;
use crate::tree::{OrgTree, OrgUnit};

/// Default bound on concurrent per-OU workers.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Whether a pass mutates external state or only reports what it would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassMode {
    /// Create, rename, add, and remove for real.
    Apply,
    /// Read-only: compute every action and report it without applying.
    Plan,
}

/// Configuration for one pass.
#[derive(Debug, Clone)]
pub struct PassConfig {
    /// Root OU path scoping the sync (`/Company`).
    pub root_path: String,
    /// Directory role id whose holders get subtree-wide visibility.
    pub traversal_role_id: String,
    /// The administrator the mutations run as; excluded from every diff.
    pub admin_user_id: Option<UserId>,
    /// Bound on concurrent per-OU workers.
    pub concurrency: usize,
    /// Where to persist the catalog; `None` skips persistence.
    pub catalog_path: Option<PathBuf>,
    pub mode: PassMode,
}

impl PassConfig {
    pub fn new(root_path: impl Into<String>, traversal_role_id: impl Into<String>) -> Self {
        Self {
            root_path: root_path.into(),
            traversal_role_id: traversal_role_id.into(),
            admin_user_id: None,
            concurrency: DEFAULT_CONCURRENCY,
            catalog_path: None,
            mode: PassMode::Apply,
        }
    }
}

/// Terminal state of a pass that ran to completion.
///
/// An aborted pass is the `Err` side of [`SyncOrchestrator::run_pass`] and
/// never produces a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every OU converged with no failures.
    CompletedClean,
    /// The pass ran to the end but some items failed; the next pass retries
    /// them by re-deriving the same deltas.
    CompletedWithErrors,
}

impl std::fmt::Display for PassOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PassOutcome::CompletedClean => f.write_str("completed_clean"),
            PassOutcome::CompletedWithErrors => f.write_str("completed_with_errors"),
        }
    }
}

/// Aggregated result of one pass.
#[derive(Debug)]
pub struct PassReport {
    pub mode: PassMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// OUs in the fetched tree.
    pub ous_total: usize,
    /// OUs whose membership work was skipped after a failed create.
    pub ous_skipped: usize,
    /// Directory records dropped while building the tree.
    pub records_dropped: usize,
    /// Catalog entries pruned for vanished OUs.
    pub entries_pruned: usize,
    pub spaces_created: usize,
    pub spaces_renamed: usize,
    pub spaces_unchanged: usize,
    pub members_added: usize,
    pub members_removed: usize,
    pub failures: Vec<ApplyFailure>,
    /// Workers that terminated abnormally (panic or cancellation); the
    /// state of their OUs is unknown until the next pass re-derives it.
    pub workers_lost: usize,
    /// Set when the final catalog save failed; the catalog in memory is
    /// still correct and the next successful save catches up.
    pub persist_error: Option<String>,
}

impl PassReport {
    #[must_use]
    pub fn outcome(&self) -> PassOutcome {
        if self.failures.is_empty() && self.workers_lost == 0 && self.persist_error.is_none() {
            PassOutcome::CompletedClean
        } else {
            PassOutcome::CompletedWithErrors
        }
    }
}

/// What one per-OU worker produced.
#[derive(Debug, Default)]
struct OuOutcome {
    catalog_update: Option<(OrgUnitId, CatalogEntry)>,
    created: bool,
    renamed: bool,
    unchanged: bool,
    skipped: bool,
    added: usize,
    removed: usize,
    failures: Vec<ApplyFailure>,
}

/// Drives reconciliation passes against the three collaborators.
pub struct SyncOrchestrator {
    directory: Arc<dyn DirectorySource>,
    spaces: Arc<dyn SpaceOps>,
    members: Arc<dyn MembershipOps>,
    config: PassConfig,
}

impl SyncOrchestrator {
    pub fn new(
        directory: Arc<dyn DirectorySource>,
        spaces: Arc<dyn SpaceOps>,
        members: Arc<dyn MembershipOps>,
        config: PassConfig,
    ) -> Self {
        Self {
            directory,
            spaces,
            members,
            config,
        }
    }

    /// Run one pass. `Err` means the pass aborted before any external
    /// mutation; `Ok` carries the report, whose [`PassReport::outcome`]
    /// distinguishes a clean pass from one with collected failures.
    ///
    /// The catalog is mutated only here, never inside workers.
    pub async fn run_pass(&self, catalog: &mut Catalog) -> SyncResult<PassReport> {
        let started_at = Utc::now();
        info!(
            root = %self.config.root_path,
            mode = ?self.config.mode,
            "Starting reconciliation pass"
        );

        let (tree, traversal) = self.fetch_directory_state().await?;
        let entries_pruned = catalog.prune(&tree).len();

        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut handles = Vec::with_capacity(tree.len());
        for ou in tree.iter() {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| SyncError::internal("worker semaphore closed"))?;
            let worker = OuWorker {
                spaces: Arc::clone(&self.spaces),
                members: Arc::clone(&self.members),
                ou: ou.clone(),
                recorded: catalog.get(&ou.id).cloned(),
                traversal: traversal.for_ou(&ou.id).clone(),
                admin: self.config.admin_user_id.clone(),
                mode: self.config.mode,
            };
            handles.push((
                ou.id.clone(),
                tokio::spawn(async move {
                    let outcome = worker.run().await;
                    drop(permit);
                    outcome
                }),
            ));
        }

        let mut report = PassReport {
            mode: self.config.mode,
            started_at,
            finished_at: started_at,
            ous_total: tree.len(),
            ous_skipped: 0,
            records_dropped: tree.dropped(),
            entries_pruned,
            spaces_created: 0,
            spaces_renamed: 0,
            spaces_unchanged: 0,
            members_added: 0,
            members_removed: 0,
            failures: Vec::new(),
            workers_lost: 0,
            persist_error: None,
        };

        for (ou_id, handle) in handles {
            match handle.await {
                Ok(outcome) => {
                    if let Some((ou, entry)) = outcome.catalog_update {
                        catalog.insert(ou, entry);
                    }
                    report.spaces_created += usize::from(outcome.created);
                    report.spaces_renamed += usize::from(outcome.renamed);
                    report.spaces_unchanged += usize::from(outcome.unchanged);
                    report.ous_skipped += usize::from(outcome.skipped);
                    report.members_added += outcome.added;
                    report.members_removed += outcome.removed;
                    report.failures.extend(outcome.failures);
                }
                Err(err) => {
                    error!(ou = %ou_id, error = %err, "Per-OU worker task failed");
                    report.ous_skipped += 1;
                    report.workers_lost += 1;
                }
            }
        }

        if self.config.mode == PassMode::Apply {
            if let Some(path) = &self.config.catalog_path {
                if let Err(err) = catalog.save(path) {
                    error!(error = %err, "Failed to persist catalog");
                    report.persist_error = Some(err.to_string());
                }
            }
        }

        report.finished_at = Utc::now();
        info!(
            outcome = %report.outcome(),
            ous = report.ous_total,
            created = report.spaces_created,
            renamed = report.spaces_renamed,
            added = report.members_added,
            removed = report.members_removed,
            pruned = report.entries_pruned,
            failures = report.failures.len(),
            "Pass finished"
        );
        Ok(report)
    }

    /// Fetch everything the pass reads: the OU listing, per-OU direct
    /// members, and the traversal role assignments. Any transport failure
    /// here aborts before a single mutation has happened.
    async fn fetch_directory_state(&self) -> SyncResult<(OrgTree, roles::TraversalSets)> {
        let records = self
            .directory
            .list_org_units(&self.config.root_path)
            .await
            .map_err(|err| SyncError::transport(Stage::FetchTree, err))?;
        let mut tree = OrgTree::build(&self.config.root_path, records)?;
        debug!(ous = tree.len(), dropped = tree.dropped(), "Built org unit tree");

        let ids: Vec<OrgUnitId> = tree.iter().map(|ou| ou.id.clone()).collect();
        for id in ids {
            let members = self
                .directory
                .list_ou_members(&id)
                .await
                .map_err(|err| SyncError::transport(Stage::FetchTree, err))?;
            tree.set_members(&id, members.into_iter().collect());
        }

        let assignments = self
            .directory
            .list_traversal_role_holders(&self.config.traversal_role_id)
            .await
            .map_err(|err| SyncError::transport(Stage::ResolveRoles, err))?;
        let traversal = roles::resolve(&tree, &assignments);

        Ok((tree, traversal))
    }
}

/// One OU's reconciliation, run inside the bounded pool.
struct OuWorker {
    spaces: Arc<dyn SpaceOps>,
    members: Arc<dyn MembershipOps>,
    ou: OrgUnit,
    recorded: Option<CatalogEntry>,
    traversal: BTreeSet<UserId>,
    admin: Option<UserId>,
    mode: PassMode,
}

impl OuWorker {
    async fn run(self) -> OuOutcome {
        let mut outcome = OuOutcome::default();
        let action = reconcile::decide(&self.ou, self.recorded.as_ref());
        let desired = diff::desired_members(&self.ou, &self.traversal, self.admin.as_ref());

        if self.mode == PassMode::Plan {
            self.plan(action, &desired, &mut outcome).await;
            return outcome;
        }

        let space = match reconcile::apply(self.spaces.as_ref(), &self.ou, action.clone()).await {
            Ok(result) => {
                outcome.created = result.created;
                outcome.renamed = result.renamed;
                outcome.unchanged = !result.created && !result.renamed;
                outcome.catalog_update = result
                    .catalog_update
                    .map(|entry| (self.ou.id.clone(), entry));
                result.space
            }
            Err(failure) => {
                outcome.failures.push(failure);
                match action {
                    // No Space exists, so membership work is impossible.
                    SpaceAction::Create { .. } => {
                        outcome.skipped = true;
                        return outcome;
                    }
                    // The Space still exists under its old name; keep the
                    // old record and reconcile membership anyway.
                    SpaceAction::Rename { space, .. } | SpaceAction::Noop { space } => space,
                }
            }
        };

        let delta = match diff::delta_for_space(
            self.spaces.as_ref(),
            &self.ou,
            &space,
            &desired,
            self.admin.as_ref(),
        )
        .await
        {
            Ok(delta) => delta,
            Err(failure) => {
                outcome.failures.push(failure);
                return outcome;
            }
        };
        if delta.is_empty() {
            return outcome;
        }

        let stats = diff::apply_delta(self.members.as_ref(), &self.ou, &space, &delta).await;
        outcome.added = stats.added;
        outcome.removed = stats.removed;
        outcome.failures.extend(stats.failures);
        outcome
    }

    /// Plan mode: report what apply would do, using reads only. For an OU
    /// with no Space yet the whole desired set counts as planned additions.
    async fn plan(
        &self,
        action: SpaceAction,
        desired: &BTreeSet<UserId>,
        outcome: &mut OuOutcome,
    ) {
        let space = match action {
            SpaceAction::Create { display_name } => {
                info!(ou = %self.ou.id, name = %display_name, "Would create space");
                outcome.created = true;
                outcome.added = desired.len();
                return;
            }
            SpaceAction::Rename { space, from, to } => {
                info!(ou = %self.ou.id, space = %space, from = %from, to = %to, "Would rename space");
                outcome.renamed = true;
                space
            }
            SpaceAction::Noop { space } => {
                outcome.unchanged = true;
                space
            }
        };

        match diff::delta_for_space(
            self.spaces.as_ref(),
            &self.ou,
            &space,
            desired,
            self.admin.as_ref(),
        )
        .await
        {
            Ok(delta) => {
                for user in &delta.add {
                    info!(ou = %self.ou.id, space = %space, user = %user, "Would add member");
                }
                for user in &delta.remove {
                    info!(ou = %self.ou.id, space = %space, user = %user, "Would remove member");
                }
                outcome.added = delta.add.len();
                outcome.removed = delta.remove.len();
            }
            Err(failure) => {
                warn!(ou = %self.ou.id, error = %failure, "Could not read space membership");
                outcome.failures.push(failure);
            }
        }
    }
}
