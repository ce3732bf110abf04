//! In-memory OU tree model.
//!
//! Built from the flat listing the directory source returns. Stored
//! arena-style: nodes in a flat vector (BFS order from the root) plus a
//! child-adjacency index, so subtree traversals are iterative and never
//! recurse on deep trees.

use std::collections::{BTreeSet, HashMap};
use tracing::warn;

use spacesync_connector::paths;
use spacesync_connector::traits::OrgUnitRecord;
use spacesync_connector::{OrgUnitId, UserId};

use crate::error::{SyncError, SyncResult};

/// One organizational unit with its direct members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgUnit {
    /// Provider-assigned unique identifier.
    pub id: OrgUnitId,
    /// Normalized slash-delimited path; defines the tree position.
    pub path: String,
    /// Parent OU id; `None` only for the root.
    pub parent_id: Option<OrgUnitId>,
    /// Human-readable name (last path segment).
    pub name: String,
    /// Direct member user ids (users whose own OU is exactly this one).
    pub members: BTreeSet<UserId>,
}

impl OrgUnit {
    /// Desired Space display name: the OU path with the leading `/` stripped.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.path.trim_start_matches('/')
    }
}

/// The OU hierarchy: acyclic, single root, every node reachable from it.
#[derive(Debug, Clone)]
pub struct OrgTree {
    root_path: String,
    /// Nodes in BFS order; index 0 is the root.
    nodes: Vec<OrgUnit>,
    index: HashMap<OrgUnitId, usize>,
    children: Vec<Vec<usize>>,
    /// Count of listing records dropped as invalid or unreachable.
    dropped: usize,
}

impl OrgTree {
    /// Build a tree from a flat OU listing scoped under `root_path`.
    ///
    /// Records missing required fields, declaring an absent parent, or
    /// unreachable from the root are dropped with a warning; partial trees
    /// are valid. Fails only when the root itself is missing, since nothing
    /// can be anchored without it.
    pub fn build(root_path: &str, records: Vec<OrgUnitRecord>) -> SyncResult<Self> {
        let root_path = paths::normalize(root_path).to_string();
        let mut dropped = 0usize;

        // Validate individual records.
        let mut kept: Vec<OrgUnitRecord> = Vec::with_capacity(records.len());
        let mut seen_ids: HashMap<OrgUnitId, ()> = HashMap::new();
        for mut record in records {
            record.path = paths::normalize(&record.path).to_string();
            if record.id.as_str().is_empty() || record.path.is_empty() {
                let err = SyncError::InvalidOuRecord {
                    ou: if record.id.as_str().is_empty() {
                        record.path.clone()
                    } else {
                        record.id.to_string()
                    },
                    message: "missing required id or path field".to_string(),
                };
                warn!(error = %err, "Skipping org unit record");
                dropped += 1;
                continue;
            }
            if !paths::is_under(&record.path, &root_path) {
                warn!(
                    ou = %record.id,
                    path = %record.path,
                    root = %root_path,
                    "Skipping org unit outside the configured root"
                );
                dropped += 1;
                continue;
            }
            if seen_ids.insert(record.id.clone(), ()).is_some() {
                warn!(ou = %record.id, "Duplicate org unit id in listing; keeping first");
                dropped += 1;
                continue;
            }
            if record.name.is_empty() {
                record.name = paths::leaf(&record.path).to_string();
            }
            kept.push(record);
        }

        let Some(root_pos) = kept.iter().position(|r| r.path == root_path) else {
            return Err(SyncError::InvalidHierarchy {
                message: format!("root OU '{root_path}' not present in listing"),
            });
        };

        let id_index: HashMap<&OrgUnitId, usize> =
            kept.iter().enumerate().map(|(i, r)| (&r.id, i)).collect();
        let path_index: HashMap<&str, usize> = kept
            .iter()
            .enumerate()
            .map(|(i, r)| (r.path.as_str(), i))
            .collect();

        // Link each non-root node to its parent: by declared parent id when
        // that id is in the listing, by path ancestry otherwise (the listing
        // may reference the real root by an id it never includes).
        let mut parent_of: Vec<Option<usize>> = vec![None; kept.len()];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); kept.len()];
        for (i, record) in kept.iter().enumerate() {
            if i == root_pos {
                continue;
            }
            let by_id = record
                .parent_id
                .as_ref()
                .and_then(|pid| id_index.get(pid).copied());
            let by_path = paths::parent(&record.path)
                .and_then(|pp| path_index.get(pp).copied());
            match by_id.or(by_path) {
                Some(parent) if parent != i => {
                    parent_of[i] = Some(parent);
                    children[parent].push(i);
                }
                _ => {
                    warn!(
                        ou = %record.id,
                        path = %record.path,
                        "Dropping org unit whose parent is absent from the listing"
                    );
                    dropped += 1;
                }
            }
        }

        // Keep only nodes reachable from the root; this also guarantees the
        // result is acyclic.
        let mut order: Vec<usize> = Vec::with_capacity(kept.len());
        let mut queue = std::collections::VecDeque::from([root_pos]);
        let mut reached = vec![false; kept.len()];
        reached[root_pos] = true;
        while let Some(i) = queue.pop_front() {
            order.push(i);
            for &child in &children[i] {
                if !reached[child] {
                    reached[child] = true;
                    queue.push_back(child);
                }
            }
        }
        for (i, record) in kept.iter().enumerate() {
            if !reached[i] && parent_of[i].is_some() {
                warn!(
                    ou = %record.id,
                    path = %record.path,
                    "Dropping org unit unreachable from the root"
                );
                dropped += 1;
            }
        }

        // Compact into BFS order.
        let new_pos: HashMap<usize, usize> =
            order.iter().enumerate().map(|(new, &old)| (old, new)).collect();
        let mut nodes: Vec<OrgUnit> = Vec::with_capacity(order.len());
        let mut new_children: Vec<Vec<usize>> = vec![Vec::new(); order.len()];
        for (new, &old) in order.iter().enumerate() {
            let record = &kept[old];
            let parent_id = parent_of[old].map(|p| kept[p].id.clone());
            nodes.push(OrgUnit {
                id: record.id.clone(),
                path: record.path.clone(),
                parent_id,
                name: record.name.clone(),
                members: BTreeSet::new(),
            });
            new_children[new] = children[old]
                .iter()
                .filter_map(|c| new_pos.get(c).copied())
                .collect();
        }
        let index = nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.clone(), i))
            .collect();

        Ok(Self {
            root_path,
            nodes,
            index,
            children: new_children,
            dropped,
        })
    }

    /// The configured root path.
    #[must_use]
    pub fn root_path(&self) -> &str {
        &self.root_path
    }

    /// The root OU.
    #[must_use]
    pub fn root(&self) -> &OrgUnit {
        &self.nodes[0]
    }

    /// Number of OUs in the tree.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree has no nodes. Never true for a built tree.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Count of listing records dropped during build.
    #[must_use]
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    /// Look up an OU by id.
    #[must_use]
    pub fn get(&self, id: &OrgUnitId) -> Option<&OrgUnit> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    /// Whether an OU id is present.
    #[must_use]
    pub fn contains(&self, id: &OrgUnitId) -> bool {
        self.index.contains_key(id)
    }

    /// Iterate over all OUs in BFS order (root first).
    pub fn iter(&self) -> impl Iterator<Item = &OrgUnit> {
        self.nodes.iter()
    }

    /// Attach the direct member set for an OU. Returns false if unknown.
    pub fn set_members(&mut self, id: &OrgUnitId, members: BTreeSet<UserId>) -> bool {
        match self.index.get(id) {
            Some(&i) => {
                self.nodes[i].members = members;
                true
            }
            None => false,
        }
    }

    pub(crate) fn node_index(&self, id: &OrgUnitId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn node(&self, idx: usize) -> &OrgUnit {
        &self.nodes[idx]
    }

    pub(crate) fn children_idx(&self, idx: usize) -> &[usize] {
        &self.children[idx]
    }
}
