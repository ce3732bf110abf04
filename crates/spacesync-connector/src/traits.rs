//! Collaborator contracts.
//!
//! Capability traits for the three external systems the reconciler drives.
//! The engine depends only on these; the Google implementations live in
//! [`crate::google`].

use async_trait::async_trait;

use crate::error::ConnectorResult;
use crate::ids::{OrgUnitId, SpaceId, UserId};

/// One organizational unit as returned by the directory listing.
///
/// `parent_id` is `None` only for the configured root. Paths are
/// slash-delimited ancestry strings (`/Company/Eng`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUnitRecord {
    /// Provider-assigned unique identifier.
    pub id: OrgUnitId,
    /// Slash-delimited path, unique within the customer.
    pub path: String,
    /// Identifier of the parent OU, if any.
    pub parent_id: Option<OrgUnitId>,
    /// Human-readable OU name (last path segment).
    pub name: String,
}

/// A traversal-role assignment: a user and their home OU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    /// The role holder.
    pub user_id: UserId,
    /// The holder's home OU; visibility extends over its whole subtree.
    pub ou_id: OrgUnitId,
}

/// Read-only view of the Admin Console directory.
///
/// Any failure here during tree fetch aborts the pass; the engine never
/// mutates directory state.
#[async_trait]
pub trait DirectorySource: Send + Sync {
    /// List all org units scoped under `root_path`, including the root OU
    /// itself. Implementations synthesize the root record when the backing
    /// API omits it from the listing.
    async fn list_org_units(&self, root_path: &str) -> ConnectorResult<Vec<OrgUnitRecord>>;

    /// List the direct members of one OU (users whose own OU is exactly
    /// this one, not a descendant).
    async fn list_ou_members(&self, ou_id: &OrgUnitId) -> ConnectorResult<Vec<UserId>>;

    /// List holders of the tree-traversal role together with their home OU.
    async fn list_traversal_role_holders(
        &self,
        role_id: &str,
    ) -> ConnectorResult<Vec<RoleAssignment>>;
}

/// Chat Space lifecycle operations.
#[async_trait]
pub trait SpaceOps: Send + Sync {
    /// Create a new Space with the given display name.
    ///
    /// Returns the provider-assigned resource name. Not idempotent: a retry
    /// after an ambiguous failure may create a duplicate, so callers only
    /// record the Space after a confirmed success.
    async fn create_space(&self, display_name: &str) -> ConnectorResult<SpaceId>;

    /// Change a Space's display name.
    async fn rename_space(&self, space: &SpaceId, new_name: &str) -> ConnectorResult<()>;

    /// List current (non-deleted) members of a Space.
    async fn get_space_members(&self, space: &SpaceId) -> ConnectorResult<Vec<UserId>>;
}

/// Chat Space membership mutation.
#[async_trait]
pub trait MembershipOps: Send + Sync {
    /// Add a user to a Space.
    async fn add_member(&self, space: &SpaceId, user: &UserId) -> ConnectorResult<()>;

    /// Remove a user from a Space.
    async fn remove_member(&self, space: &SpaceId, user: &UserId) -> ConnectorResult<()>;
}
