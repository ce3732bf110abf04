//! Per-OU Space reconciliation: CREATE, RENAME, or NOOP.

use tracing::{debug, info};

use spacesync_connector::traits::SpaceOps;
use spacesync_connector::SpaceId;

use crate::catalog::CatalogEntry;
use crate::error::{ApplyFailure, ApplyOperation};
use crate::tree::OrgUnit;

/// The action an OU's Space needs this pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpaceAction {
    /// No catalog entry: a Space must be created.
    Create { display_name: String },
    /// The recorded display name is stale: the Space must be renamed.
    Rename {
        space: SpaceId,
        from: String,
        to: String,
    },
    /// The recorded display name already matches.
    Noop { space: SpaceId },
}

/// Result of applying a [`SpaceAction`].
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// The Space now backing this OU.
    pub space: SpaceId,
    /// Catalog update to record, if the external state changed.
    pub catalog_update: Option<CatalogEntry>,
    pub created: bool,
    pub renamed: bool,
}

/// Decide what the OU's Space needs, comparing the catalog record against
/// the name the OU path dictates. The live Space is not consulted; the
/// catalog record is authoritative for what was last applied.
#[must_use]
pub fn decide(ou: &OrgUnit, recorded: Option<&CatalogEntry>) -> SpaceAction {
    let desired = ou.display_name().to_string();
    match recorded {
        None => SpaceAction::Create {
            display_name: desired,
        },
        Some(entry) if entry.display_name == desired => SpaceAction::Noop {
            space: entry.space.clone(),
        },
        Some(entry) => SpaceAction::Rename {
            space: entry.space.clone(),
            from: entry.display_name.clone(),
            to: desired,
        },
    }
}

/// Apply the action against the Space backend.
///
/// A failed create leaves no catalog update, so the next pass retries from
/// scratch. A failed rename is reported but keeps the old recorded name, so
/// the next pass retries the rename rather than believing it happened.
pub async fn apply(
    spaces: &dyn SpaceOps,
    ou: &OrgUnit,
    action: SpaceAction,
) -> Result<ReconcileOutcome, ApplyFailure> {
    match action {
        SpaceAction::Create { display_name } => {
            let space = spaces
                .create_space(&display_name)
                .await
                .map_err(|err| ApplyFailure::new(ApplyOperation::CreateSpace, ou.id.clone(), &err))?;
            info!(ou = %ou.id, space = %space, name = %display_name, "Created space");
            Ok(ReconcileOutcome {
                space: space.clone(),
                catalog_update: Some(CatalogEntry {
                    space,
                    display_name,
                }),
                created: true,
                renamed: false,
            })
        }
        SpaceAction::Rename { space, from, to } => {
            spaces.rename_space(&space, &to).await.map_err(|err| {
                ApplyFailure::new(ApplyOperation::RenameSpace, ou.id.clone(), &err)
                    .with_space(space.clone())
            })?;
            info!(ou = %ou.id, space = %space, from = %from, to = %to, "Renamed space");
            Ok(ReconcileOutcome {
                space: space.clone(),
                catalog_update: Some(CatalogEntry {
                    space,
                    display_name: to,
                }),
                created: false,
                renamed: true,
            })
        }
        SpaceAction::Noop { space } => {
            debug!(ou = %ou.id, space = %space, "Space up to date");
            Ok(ReconcileOutcome {
                space,
                catalog_update: None,
                created: false,
                renamed: false,
            })
        }
    }
}
