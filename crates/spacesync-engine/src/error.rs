//! Engine error taxonomy.
//!
//! Four failure classes with distinct propagation rules:
//!
//! - [`SyncError::Transport`] while fetching directory state aborts the pass
//! - [`SyncError::InvalidHierarchy`] on the root is fatal; on a single node
//!   the node is dropped and logged instead
//! - [`SyncError::InvalidOuRecord`] is always recovered locally (skip the OU)
//! - [`ApplyFailure`] is collected per item and surfaced at end of pass

use std::fmt;
use thiserror::Error;

use spacesync_connector::{ConnectorError, OrgUnitId, SpaceId, UserId};

/// Pre-mutation fetch stage, used to attribute pass-aborting transport
/// failures. Failures past these stages are per-item [`ApplyFailure`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FetchTree,
    ResolveRoles,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::FetchTree => "fetch_tree",
            Stage::ResolveRoles => "resolve_roles",
        };
        f.write_str(s)
    }
}

/// Errors that can occur during a reconciliation pass.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A collaborator call failed at the network/HTTP level.
    #[error("transport failure during {stage}: {source}")]
    Transport {
        stage: Stage,
        #[source]
        source: ConnectorError,
    },

    /// Structurally broken OU data that cannot be recovered from.
    #[error("invalid hierarchy: {message}")]
    InvalidHierarchy { message: String },

    /// A single OU record is missing required fields.
    #[error("invalid org unit record '{ou}': {message}")]
    InvalidOuRecord { ou: String, message: String },

    /// Catalog load or save failed.
    #[error("catalog error: {message}")]
    Catalog { message: String },

    /// An orchestrator invariant was violated.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    /// Wrap a connector error as a pass-aborting transport failure.
    pub fn transport(stage: Stage, source: ConnectorError) -> Self {
        SyncError::Transport { stage, source }
    }

    /// Create a catalog error.
    pub fn catalog(message: impl Into<String>) -> Self {
        SyncError::Catalog {
            message: message.into(),
        }
    }

    /// Create an internal orchestration error.
    pub fn internal(message: impl Into<String>) -> Self {
        SyncError::Internal {
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// The apply step that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOperation {
    CreateSpace,
    RenameSpace,
    FetchMembers,
    AddMember,
    RemoveMember,
}

impl fmt::Display for ApplyOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApplyOperation::CreateSpace => "create space",
            ApplyOperation::RenameSpace => "rename space",
            ApplyOperation::FetchMembers => "fetch members",
            ApplyOperation::AddMember => "add member",
            ApplyOperation::RemoveMember => "remove member",
        };
        f.write_str(s)
    }
}

/// One failed apply operation, identifying the OU, Space, and user involved.
///
/// Collected into the pass report rather than propagated; the next scheduled
/// pass re-derives the same delta from current external state, so no retry
/// happens within a pass.
#[derive(Debug, Clone)]
pub struct ApplyFailure {
    pub operation: ApplyOperation,
    pub ou_id: OrgUnitId,
    pub space: Option<SpaceId>,
    pub user: Option<UserId>,
    pub message: String,
}

impl ApplyFailure {
    /// Record a failure for an OU-level operation.
    pub fn new(operation: ApplyOperation, ou_id: OrgUnitId, error: &ConnectorError) -> Self {
        Self {
            operation,
            ou_id,
            space: None,
            user: None,
            message: error.to_string(),
        }
    }

    /// Attach the Space the operation targeted.
    #[must_use]
    pub fn with_space(mut self, space: SpaceId) -> Self {
        self.space = Some(space);
        self
    }

    /// Attach the user the operation targeted.
    #[must_use]
    pub fn with_user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }
}

impl fmt::Display for ApplyFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed for ou {}", self.operation, self.ou_id)?;
        if let Some(space) = &self.space {
            write!(f, " (space {space})")?;
        }
        if let Some(user) = &self.user {
            write!(f, " (user {user})")?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for ApplyFailure {}
