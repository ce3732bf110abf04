//! Traversal role resolution.
//!
//! A traversal role holder whose home OU is `h` belongs in the Space of
//! every OU in the subtree rooted at `h`. This module precomputes that
//! expansion once per pass, so the per-OU workers only do set lookups.

use std::collections::{BTreeSet, HashMap};
use tracing::{debug, warn};

use spacesync_connector::traits::RoleAssignment;
use spacesync_connector::{OrgUnitId, UserId};

use crate::tree::OrgTree;

/// Effective traversal membership per OU.
#[derive(Debug, Default)]
pub struct TraversalSets {
    sets: HashMap<OrgUnitId, BTreeSet<UserId>>,
    empty: BTreeSet<UserId>,
}

impl TraversalSets {
    /// The traversal users that belong in the given OU's Space.
    #[must_use]
    pub fn for_ou(&self, ou: &OrgUnitId) -> &BTreeSet<UserId> {
        self.sets.get(ou).unwrap_or(&self.empty)
    }

    /// Number of OUs with at least one traversal user.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Expand role assignments into per-OU effective sets.
///
/// Assignments whose home OU is not in the tree are skipped with a warning;
/// a user listed with more than one home keeps the last one seen. The
/// resulting sets are monotone down the tree: a child's set always contains
/// its parent's.
#[must_use]
pub fn resolve(tree: &OrgTree, assignments: &[RoleAssignment]) -> TraversalSets {
    // Dedupe to one home per user.
    let mut home: HashMap<&UserId, &OrgUnitId> = HashMap::new();
    for assignment in assignments {
        if let Some(previous) = home.insert(&assignment.user_id, &assignment.ou_id) {
            if previous != &assignment.ou_id {
                warn!(
                    user = %assignment.user_id,
                    kept = %assignment.ou_id,
                    discarded = %previous,
                    "User holds the traversal role in multiple org units; keeping last"
                );
            }
        }
    }

    // Group holders by home node index.
    let mut holders_at: HashMap<usize, Vec<&UserId>> = HashMap::new();
    for (user, ou) in home {
        match tree.node_index(ou) {
            Some(idx) => holders_at.entry(idx).or_default().push(user),
            None => {
                warn!(
                    user = %user,
                    ou = %ou,
                    "Traversal role holder's home org unit is not in the tree; skipping"
                );
            }
        }
    }

    // Walk the tree from the root, carrying the accumulated set down. The
    // explicit stack keeps this iterative on arbitrarily deep trees.
    let mut sets: HashMap<OrgUnitId, BTreeSet<UserId>> = HashMap::new();
    let root_idx = tree
        .node_index(&tree.root().id)
        .unwrap_or_default();
    let mut stack: Vec<(usize, BTreeSet<UserId>)> = vec![(root_idx, BTreeSet::new())];
    while let Some((idx, mut inherited)) = stack.pop() {
        if let Some(holders) = holders_at.get(&idx) {
            inherited.extend(holders.iter().map(|u| (*u).clone()));
        }
        for &child in tree.children_idx(idx) {
            stack.push((child, inherited.clone()));
        }
        if !inherited.is_empty() {
            sets.insert(tree.node(idx).id.clone(), inherited);
        }
    }

    debug!(
        populated_ous = sets.len(),
        "Resolved traversal role expansion"
    );
    TraversalSets {
        sets,
        empty: BTreeSet::new(),
    }
}
