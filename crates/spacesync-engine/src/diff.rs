//! Membership diffing and delta application.
//!
//! The desired member set of an OU's Space is the union of the OU's direct
//! members and the effective traversal set, minus the administrator whose
//! credentials the mutations run under. Both sides of the comparison exclude
//! that administrator, so their implicit presence in every Space is never
//! fought over.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use spacesync_connector::traits::{MembershipOps, SpaceOps};
use spacesync_connector::{SpaceId, UserId};

use crate::error::{ApplyFailure, ApplyOperation};
use crate::tree::OrgUnit;

/// The additions and removals one Space needs.
///
/// Both sides are sorted sets, so application order is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipDelta {
    pub add: BTreeSet<UserId>,
    pub remove: BTreeSet<UserId>,
}

impl MembershipDelta {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && self.remove.is_empty()
    }
}

/// The desired member set: direct members plus traversal users, minus the
/// administrator.
#[must_use]
pub fn desired_members(
    ou: &OrgUnit,
    traversal: &BTreeSet<UserId>,
    admin: Option<&UserId>,
) -> BTreeSet<UserId> {
    let mut desired: BTreeSet<UserId> = ou.members.union(traversal).cloned().collect();
    if let Some(admin) = admin {
        desired.remove(admin);
    }
    desired
}

/// Compare desired against current membership. The administrator is filtered
/// from the current set as well, so they are never scheduled for removal.
#[must_use]
pub fn diff(
    desired: &BTreeSet<UserId>,
    current: &[UserId],
    admin: Option<&UserId>,
) -> MembershipDelta {
    let current: BTreeSet<UserId> = current
        .iter()
        .filter(|u| admin != Some(*u))
        .cloned()
        .collect();
    MembershipDelta {
        add: desired.difference(&current).cloned().collect(),
        remove: current.difference(desired).cloned().collect(),
    }
}

/// Tally of one delta application.
#[derive(Debug, Default)]
pub struct ApplyStats {
    pub added: usize,
    pub removed: usize,
    pub failures: Vec<ApplyFailure>,
}

/// Apply a delta one member at a time. Each failed add or remove is
/// collected and the rest of the delta still runs; a missed removal or
/// addition converges on the next pass.
pub async fn apply_delta(
    members: &dyn MembershipOps,
    ou: &OrgUnit,
    space: &SpaceId,
    delta: &MembershipDelta,
) -> ApplyStats {
    let mut stats = ApplyStats::default();
    for user in &delta.add {
        match members.add_member(space, user).await {
            Ok(()) => {
                info!(ou = %ou.id, space = %space, user = %user, "Added member");
                stats.added += 1;
            }
            Err(err) => {
                warn!(ou = %ou.id, space = %space, user = %user, error = %err, "Failed to add member");
                stats.failures.push(
                    ApplyFailure::new(ApplyOperation::AddMember, ou.id.clone(), &err)
                        .with_space(space.clone())
                        .with_user(user.clone()),
                );
            }
        }
    }
    for user in &delta.remove {
        match members.remove_member(space, user).await {
            Ok(()) => {
                info!(ou = %ou.id, space = %space, user = %user, "Removed member");
                stats.removed += 1;
            }
            Err(err) => {
                warn!(ou = %ou.id, space = %space, user = %user, error = %err, "Failed to remove member");
                stats.failures.push(
                    ApplyFailure::new(ApplyOperation::RemoveMember, ou.id.clone(), &err)
                        .with_space(space.clone())
                        .with_user(user.clone()),
                );
            }
        }
    }
    stats
}

/// Fetch current membership and compute the delta for one Space.
pub async fn delta_for_space(
    spaces: &dyn SpaceOps,
    ou: &OrgUnit,
    space: &SpaceId,
    desired: &BTreeSet<UserId>,
    admin: Option<&UserId>,
) -> Result<MembershipDelta, ApplyFailure> {
    let current = spaces.get_space_members(space).await.map_err(|err| {
        ApplyFailure::new(ApplyOperation::FetchMembers, ou.id.clone(), &err)
            .with_space(space.clone())
    })?;
    let delta = diff(desired, &current, admin);
    debug!(
        ou = %ou.id,
        space = %space,
        add = delta.add.len(),
        remove = delta.remove.len(),
        "Computed membership delta"
    );
    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use spacesync_connector::OrgUnitId;

    fn ou_with(members: &[&str]) -> OrgUnit {
        OrgUnit {
            id: OrgUnitId::new("ou_1"),
            path: "/Company/Eng".to_string(),
            parent_id: None,
            name: "Eng".to_string(),
            members: members.iter().map(|u| UserId::new(*u)).collect(),
        }
    }

    fn users(ids: &[&str]) -> BTreeSet<UserId> {
        ids.iter().map(|u| UserId::new(*u)).collect()
    }

    #[test]
    fn desired_is_union_minus_admin() {
        let ou = ou_with(&["u1", "admin"]);
        let traversal = users(&["u2", "u1"]);
        let admin = UserId::new("admin");

        let desired = desired_members(&ou, &traversal, Some(&admin));
        assert_eq!(desired, users(&["u1", "u2"]));
    }

    #[test]
    fn diff_splits_adds_and_removes() {
        let desired = users(&["u1", "u2"]);
        let current = vec![UserId::new("u2"), UserId::new("u3")];

        let delta = diff(&desired, &current, None);
        assert_eq!(delta.add, users(&["u1"]));
        assert_eq!(delta.remove, users(&["u3"]));
    }

    #[test]
    fn admin_in_space_is_never_removed() {
        let desired = users(&["u1"]);
        let current = vec![UserId::new("u1"), UserId::new("admin")];
        let admin = UserId::new("admin");

        let delta = diff(&desired, &current, Some(&admin));
        assert!(delta.is_empty());
    }

    #[test]
    fn converged_space_has_empty_delta() {
        let desired = users(&["u1", "u2"]);
        let current = vec![UserId::new("u1"), UserId::new("u2")];
        assert!(diff(&desired, &current, None).is_empty());
    }
}
