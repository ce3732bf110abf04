//! # spacesync engine
//!
//! The reconciliation core: keeps one Chat Space per organizational unit,
//! mirrors OU membership into each Space, and grants traversal-role holders
//! membership across their home OU's subtree.
//!
//! ## Architecture
//!
//! One pass is a linear pipeline:
//!
//! ```text
//! FETCH_TREE -> PRUNE_CATALOG -> RESOLVE_ROLES
//!     -> (per OU, bounded pool: RECONCILE_SPACE -> DIFF_MEMBERS -> APPLY_MEMBERS)
//!     -> PERSIST_CATALOG
//! ```
//!
//! - [`tree`] builds the in-memory OU tree from the flat directory listing
//! - [`catalog`] is the persisted OU -> Space mapping, the only durable state
//! - [`roles`] precomputes effective traversal sets per OU
//! - [`reconcile`] decides CREATE / RENAME / NOOP per OU and applies it
//! - [`diff`] computes and applies membership deltas
//! - [`pass`] drives the whole pipeline and aggregates per-item failures
//!
//! Per-item failures never abort a pass; only a transport failure while
//! fetching directory state does, before any external mutation begins.

pub mod catalog;
pub mod diff;
pub mod error;
pub mod pass;
pub mod reconcile;
pub mod roles;
pub mod tree;

pub use catalog::{Catalog, CatalogEntry};
pub use error::{ApplyFailure, ApplyOperation, Stage, SyncError, SyncResult};
pub use pass::{PassConfig, PassMode, PassOutcome, PassReport, SyncOrchestrator};
pub use tree::{OrgTree, OrgUnit};
