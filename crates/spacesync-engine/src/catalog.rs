//! Persisted OU to Space catalog.
//!
//! The only durable state the engine keeps. Every other input is re-fetched
//! each pass, so a lost catalog degrades to duplicate Space creation, never
//! to data loss. Stored as a JSON object keyed by OU id; keys are kept in
//! sorted order so successive saves diff cleanly.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use spacesync_connector::{OrgUnitId, SpaceId};

use crate::error::{SyncError, SyncResult};
use crate::tree::OrgTree;

/// What the catalog remembers about one Space.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    /// Chat Space resource id.
    pub space: SpaceId,
    /// Display name recorded at the last successful create or rename.
    pub display_name: String,
}

/// Mapping from OU id to its managed Space.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: BTreeMap<OrgUnitId, CatalogEntry>,
}

impl Catalog {
    /// Load a catalog from disk. A missing file is an empty catalog; a
    /// present but unreadable or malformed file is an error, since treating
    /// it as empty would re-create every Space.
    pub fn load(path: &Path) -> SyncResult<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "No catalog file; starting empty");
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(SyncError::catalog(format!(
                    "failed to read {}: {err}",
                    path.display()
                )));
            }
        };
        let catalog: Catalog = serde_json::from_str(&raw).map_err(|err| {
            SyncError::catalog(format!("failed to parse {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), entries = catalog.len(), "Loaded catalog");
        Ok(catalog)
    }

    /// Persist the catalog atomically: write a sibling temp file, then
    /// rename it over the target so a crash never leaves a torn file.
    pub fn save(&self, path: &Path) -> SyncResult<()> {
        let tmp = temp_sibling(path);
        let result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, self)
                .map_err(|err| std::io::Error::new(std::io::ErrorKind::Other, err))?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            fs::rename(&tmp, path)
        })();
        if result.is_err() {
            // Leftover temp files are harmless but untidy.
            let _ = fs::remove_file(&tmp);
        }
        result.map_err(|err| {
            SyncError::catalog(format!("failed to write {}: {err}", path.display()))
        })?;
        debug!(path = %path.display(), entries = self.len(), "Saved catalog");
        Ok(())
    }

    #[must_use]
    pub fn get(&self, ou: &OrgUnitId) -> Option<&CatalogEntry> {
        self.entries.get(ou)
    }

    pub fn insert(&mut self, ou: OrgUnitId, entry: CatalogEntry) {
        self.entries.insert(ou, entry);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OrgUnitId, &CatalogEntry)> {
        self.entries.iter()
    }

    /// Drop entries whose OU no longer exists in the tree. The Spaces
    /// themselves are left untouched; only the local mapping is forgotten.
    pub fn prune(&mut self, tree: &OrgTree) -> Vec<OrgUnitId> {
        let stale: Vec<OrgUnitId> = self
            .entries
            .keys()
            .filter(|ou| !tree.contains(ou))
            .cloned()
            .collect();
        for ou in &stale {
            if let Some(entry) = self.entries.remove(ou) {
                warn!(
                    ou = %ou,
                    space = %entry.space,
                    "Org unit no longer exists; dropping catalog entry (space is not deleted)"
                );
            }
        }
        stale
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "catalog".into());
    name.push(".tmp");
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::OrgTree;
    use spacesync_connector::traits::OrgUnitRecord;

    fn entry(space: &str, name: &str) -> CatalogEntry {
        CatalogEntry {
            space: SpaceId::new(space),
            display_name: name.to_string(),
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::load(&dir.path().join("absent.json")).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            Catalog::load(&path),
            Err(SyncError::Catalog { .. })
        ));
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = Catalog::default();
        catalog.insert(OrgUnitId::new("ou_1"), entry("spaces/A", "Company/Eng"));
        catalog.save(&path).unwrap();

        let reloaded = Catalog::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(
            reloaded.get(&OrgUnitId::new("ou_1")).unwrap().space,
            SpaceId::new("spaces/A")
        );
        // No temp file left behind.
        assert!(!dir.path().join("catalog.json.tmp").exists());
    }

    #[test]
    fn save_overwrites_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = Catalog::default();
        catalog.insert(OrgUnitId::new("ou_1"), entry("spaces/A", "Eng"));
        catalog.save(&path).unwrap();

        let mut catalog = Catalog::default();
        catalog.insert(OrgUnitId::new("ou_2"), entry("spaces/B", "Sales"));
        catalog.save(&path).unwrap();

        let reloaded = Catalog::load(&path).unwrap();
        assert!(reloaded.get(&OrgUnitId::new("ou_1")).is_none());
        assert!(reloaded.get(&OrgUnitId::new("ou_2")).is_some());
    }

    #[test]
    fn failed_save_keeps_previous_file_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("catalog.json");

        let mut catalog = Catalog::default();
        catalog.insert(OrgUnitId::new("ou_1"), entry("spaces/A", "Company/Eng"));
        catalog.save(&path).unwrap();

        // Occupying the temp sibling makes the next write fail before the
        // rename can touch the real file.
        fs::create_dir(dir.path().join("catalog.json.tmp")).unwrap();

        let mut updated = Catalog::default();
        updated.insert(OrgUnitId::new("ou_2"), entry("spaces/B", "Company/Sales"));
        assert!(matches!(
            updated.save(&path),
            Err(SyncError::Catalog { .. })
        ));

        let reloaded = Catalog::load(&path).unwrap();
        assert!(reloaded.get(&OrgUnitId::new("ou_1")).is_some());
        assert!(reloaded.get(&OrgUnitId::new("ou_2")).is_none());
    }

    #[test]
    fn prune_drops_stale_entries_only() {
        let tree = OrgTree::build(
            "/Company",
            vec![OrgUnitRecord {
                id: OrgUnitId::new("root"),
                path: "/Company".to_string(),
                parent_id: None,
                name: "Company".to_string(),
            }],
        )
        .unwrap();

        let mut catalog = Catalog::default();
        catalog.insert(OrgUnitId::new("root"), entry("spaces/A", "Company"));
        catalog.insert(OrgUnitId::new("gone"), entry("spaces/B", "Old"));

        let removed = catalog.prune(&tree);
        assert_eq!(removed, vec![OrgUnitId::new("gone")]);
        assert_eq!(catalog.len(), 1);
        assert!(catalog.get(&OrgUnitId::new("root")).is_some());
    }
}
