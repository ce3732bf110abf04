//! # spacesync connector layer
//!
//! Contracts for the external systems the reconciler talks to, plus the
//! Google Workspace implementations.
//!
//! The engine never constructs HTTP requests itself; it consumes three
//! capability traits:
//!
//! - [`DirectorySource`] - the Admin SDK Directory view: org units, per-OU
//!   membership, traversal-role assignments
//! - [`SpaceOps`] - Chat Space lifecycle: create, rename, member listing
//! - [`MembershipOps`] - Chat Space membership mutation
//!
//! [`GoogleDirectory`] and [`GoogleChat`] implement these against the real
//! APIs with service-account authentication ([`auth::GoogleAuth`]) and
//! bounded exponential-backoff retries ([`resilience::RetryExecutor`]).
//!
//! [`DirectorySource`]: traits::DirectorySource
//! [`SpaceOps`]: traits::SpaceOps
//! [`MembershipOps`]: traits::MembershipOps
//! [`GoogleDirectory`]: google::GoogleDirectory
//! [`GoogleChat`]: google::GoogleChat

pub mod auth;
pub mod error;
pub mod google;
pub mod ids;
pub mod paths;
pub mod resilience;
pub mod traits;

pub use error::{ConnectorError, ConnectorResult};
pub use ids::{OrgUnitId, SpaceId, UserId};
pub use traits::{
    DirectorySource, MembershipOps, OrgUnitRecord, RoleAssignment, SpaceOps,
};
