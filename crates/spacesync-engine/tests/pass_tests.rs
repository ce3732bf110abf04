//! Full-pass tests against in-memory collaborators.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use spacesync_connector::traits::{
    DirectorySource, MembershipOps, OrgUnitRecord, RoleAssignment, SpaceOps,
};
use spacesync_connector::{ConnectorError, ConnectorResult, OrgUnitId, SpaceId, UserId};
use spacesync_engine::{
    Catalog, CatalogEntry, PassConfig, PassMode, PassOutcome, SyncOrchestrator,
};

#[derive(Default)]
struct MockDirectory {
    ous: Vec<OrgUnitRecord>,
    members: HashMap<OrgUnitId, Vec<UserId>>,
    roles: Vec<RoleAssignment>,
    fail_listing: bool,
}

#[async_trait]
impl DirectorySource for MockDirectory {
    async fn list_org_units(&self, _root_path: &str) -> ConnectorResult<Vec<OrgUnitRecord>> {
        if self.fail_listing {
            return Err(ConnectorError::connection_failed("directory unreachable"));
        }
        Ok(self.ous.clone())
    }

    async fn list_ou_members(&self, ou_id: &OrgUnitId) -> ConnectorResult<Vec<UserId>> {
        Ok(self.members.get(ou_id).cloned().unwrap_or_default())
    }

    async fn list_traversal_role_holders(
        &self,
        _role_id: &str,
    ) -> ConnectorResult<Vec<RoleAssignment>> {
        Ok(self.roles.clone())
    }
}

#[derive(Debug, Default, Clone)]
struct SpaceState {
    name: String,
    members: BTreeSet<UserId>,
}

#[derive(Default)]
struct ChatState {
    spaces: HashMap<SpaceId, SpaceState>,
    fail_create_names: HashSet<String>,
    panic_create_names: HashSet<String>,
    fail_rename_spaces: HashSet<SpaceId>,
}

#[derive(Default)]
struct MockChat {
    state: Arc<Mutex<ChatState>>,
    next_id: AtomicUsize,
}

impl MockChat {
    fn seed_space(&self, id: &str, name: &str, members: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state.spaces.insert(
            SpaceId::new(id),
            SpaceState {
                name: name.to_string(),
                members: members.iter().map(|u| UserId::new(*u)).collect(),
            },
        );
    }

    fn space(&self, id: &str) -> Option<SpaceState> {
        self.state.lock().unwrap().spaces.get(&SpaceId::new(id)).cloned()
    }

    fn space_count(&self) -> usize {
        self.state.lock().unwrap().spaces.len()
    }

    fn space_named(&self, name: &str) -> Option<(SpaceId, SpaceState)> {
        let state = self.state.lock().unwrap();
        state
            .spaces
            .iter()
            .find(|(_, s)| s.name == name)
            .map(|(id, s)| (id.clone(), s.clone()))
    }
}

#[async_trait]
impl SpaceOps for MockChat {
    async fn create_space(&self, display_name: &str) -> ConnectorResult<SpaceId> {
        // Release the lock before panicking so sibling workers proceed.
        let should_panic = {
            let state = self.state.lock().unwrap();
            state.panic_create_names.contains(display_name)
        };
        if should_panic {
            panic!("create_space died mid-flight");
        }
        let mut state = self.state.lock().unwrap();
        if state.fail_create_names.contains(display_name) {
            return Err(ConnectorError::Api {
                status: 500,
                message: "backend error".to_string(),
            });
        }
        let id = SpaceId::new(format!(
            "spaces/mock-{}",
            self.next_id.fetch_add(1, Ordering::SeqCst)
        ));
        state.spaces.insert(
            id.clone(),
            SpaceState {
                name: display_name.to_string(),
                members: BTreeSet::new(),
            },
        );
        Ok(id)
    }

    async fn rename_space(&self, space: &SpaceId, new_name: &str) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        if state.fail_rename_spaces.contains(space) {
            return Err(ConnectorError::Api {
                status: 500,
                message: "backend error".to_string(),
            });
        }
        match state.spaces.get_mut(space) {
            Some(s) => {
                s.name = new_name.to_string();
                Ok(())
            }
            None => Err(ConnectorError::ObjectNotFound {
                identifier: space.to_string(),
            }),
        }
    }

    async fn get_space_members(&self, space: &SpaceId) -> ConnectorResult<Vec<UserId>> {
        let state = self.state.lock().unwrap();
        match state.spaces.get(space) {
            Some(s) => Ok(s.members.iter().cloned().collect()),
            None => Err(ConnectorError::ObjectNotFound {
                identifier: space.to_string(),
            }),
        }
    }
}

#[async_trait]
impl MembershipOps for MockChat {
    async fn add_member(&self, space: &SpaceId, user: &UserId) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.spaces.get_mut(space) {
            Some(s) => {
                s.members.insert(user.clone());
                Ok(())
            }
            None => Err(ConnectorError::ObjectNotFound {
                identifier: space.to_string(),
            }),
        }
    }

    async fn remove_member(&self, space: &SpaceId, user: &UserId) -> ConnectorResult<()> {
        let mut state = self.state.lock().unwrap();
        match state.spaces.get_mut(space) {
            Some(s) => {
                s.members.remove(user);
                Ok(())
            }
            None => Err(ConnectorError::ObjectNotFound {
                identifier: space.to_string(),
            }),
        }
    }
}

fn record(id: &str, path: &str, parent: Option<&str>) -> OrgUnitRecord {
    OrgUnitRecord {
        id: OrgUnitId::new(id),
        path: path.to_string(),
        parent_id: parent.map(OrgUnitId::new),
        name: String::new(),
    }
}

fn members(entries: &[(&str, &[&str])]) -> HashMap<OrgUnitId, Vec<UserId>> {
    entries
        .iter()
        .map(|(ou, users)| {
            (
                OrgUnitId::new(*ou),
                users.iter().map(|u| UserId::new(*u)).collect(),
            )
        })
        .collect()
}

fn orchestrator(
    directory: MockDirectory,
    chat: Arc<MockChat>,
    config: PassConfig,
) -> SyncOrchestrator {
    SyncOrchestrator::new(Arc::new(directory), chat.clone(), chat, config)
}

fn config(catalog_path: Option<PathBuf>) -> PassConfig {
    let mut config = PassConfig::new("/Company", "role_traversal");
    config.concurrency = 4;
    config.catalog_path = catalog_path;
    config
}

#[tokio::test]
async fn first_pass_creates_spaces_and_mirrors_members() {
    let directory = MockDirectory {
        ous: vec![
            record("root", "/Company", None),
            record("eng", "/Company/Eng", Some("root")),
        ],
        members: members(&[("root", &["u1"]), ("eng", &["u2", "u3"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.outcome(), PassOutcome::CompletedClean);
    assert_eq!(report.spaces_created, 2);
    assert_eq!(report.members_added, 3);
    assert_eq!(catalog.len(), 2);

    let (_, eng) = chat.space_named("Company/Eng").unwrap();
    assert_eq!(
        eng.members,
        [UserId::new("u2"), UserId::new("u3")].into_iter().collect()
    );
}

#[tokio::test]
async fn converged_state_makes_second_pass_a_noop() {
    let directory = || MockDirectory {
        ous: vec![
            record("root", "/Company", None),
            record("eng", "/Company/Eng", Some("root")),
        ],
        members: members(&[("root", &["u1"]), ("eng", &["u2"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    let mut catalog = Catalog::default();

    let sync = orchestrator(directory(), chat.clone(), config(None));
    sync.run_pass(&mut catalog).await.unwrap();

    let sync = orchestrator(directory(), chat.clone(), config(None));
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.outcome(), PassOutcome::CompletedClean);
    assert_eq!(report.spaces_created, 0);
    assert_eq!(report.spaces_renamed, 0);
    assert_eq!(report.spaces_unchanged, 2);
    assert_eq!(report.members_added, 0);
    assert_eq!(report.members_removed, 0);
}

#[tokio::test]
async fn traversal_role_reaches_whole_subtree() {
    let directory = MockDirectory {
        ous: vec![
            record("root", "/Company", None),
            record("eng", "/Company/Eng", Some("root")),
        ],
        members: members(&[("root", &["u1"]), ("eng", &["u2"])]),
        roles: vec![RoleAssignment {
            user_id: UserId::new("lead"),
            ou_id: OrgUnitId::new("root"),
        }],
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    sync.run_pass(&mut catalog).await.unwrap();

    let (_, root_space) = chat.space_named("Company").unwrap();
    let (_, eng_space) = chat.space_named("Company/Eng").unwrap();
    assert!(root_space.members.contains(&UserId::new("lead")));
    assert!(eng_space.members.contains(&UserId::new("lead")));
    assert!(eng_space.members.contains(&UserId::new("u2")));
}

#[tokio::test]
async fn failed_create_records_no_entry_and_siblings_proceed() {
    let directory = MockDirectory {
        ous: vec![
            record("root", "/Company", None),
            record("eng", "/Company/Eng", Some("root")),
            record("sales", "/Company/Sales", Some("root")),
        ],
        members: members(&[("sales", &["u5"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    chat.state
        .lock()
        .unwrap()
        .fail_create_names
        .insert("Company/Eng".to_string());
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.outcome(), PassOutcome::CompletedWithErrors);
    assert_eq!(report.spaces_created, 2);
    assert_eq!(report.ous_skipped, 1);
    assert_eq!(report.failures.len(), 1);
    // The failed OU has no catalog entry, so the next pass retries the
    // create from scratch.
    assert!(catalog.get(&OrgUnitId::new("eng")).is_none());
    assert!(catalog.get(&OrgUnitId::new("sales")).is_some());
    let (_, sales) = chat.space_named("Company/Sales").unwrap();
    assert!(sales.members.contains(&UserId::new("u5")));
}

#[tokio::test]
async fn lost_worker_marks_pass_with_errors() {
    let directory = MockDirectory {
        ous: vec![
            record("root", "/Company", None),
            record("eng", "/Company/Eng", Some("root")),
        ],
        members: members(&[("root", &["u1"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    chat.state
        .lock()
        .unwrap()
        .panic_create_names
        .insert("Company/Eng".to_string());
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    let report = sync.run_pass(&mut catalog).await.unwrap();

    // A worker that never reported back must not look like a clean pass.
    assert_eq!(report.workers_lost, 1);
    assert_eq!(report.outcome(), PassOutcome::CompletedWithErrors);
    // The sibling OU still converged.
    assert_eq!(report.spaces_created, 1);
    assert!(catalog.get(&OrgUnitId::new("root")).is_some());
    assert!(catalog.get(&OrgUnitId::new("eng")).is_none());
}

#[tokio::test]
async fn failed_rename_keeps_old_recorded_name_but_syncs_members() {
    let directory = MockDirectory {
        ous: vec![record("root", "/Company", None)],
        members: members(&[("root", &["u1"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    chat.seed_space("spaces/s1", "Old Name", &[]);
    chat.state
        .lock()
        .unwrap()
        .fail_rename_spaces
        .insert(SpaceId::new("spaces/s1"));
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    catalog.insert(
        OrgUnitId::new("root"),
        CatalogEntry {
            space: SpaceId::new("spaces/s1"),
            display_name: "Old Name".to_string(),
        },
    );
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.outcome(), PassOutcome::CompletedWithErrors);
    assert_eq!(report.spaces_renamed, 0);
    // The old name stays recorded, so the next pass retries the rename.
    assert_eq!(
        catalog.get(&OrgUnitId::new("root")).unwrap().display_name,
        "Old Name"
    );
    // Membership still converged on the existing space.
    assert!(chat
        .space("spaces/s1")
        .unwrap()
        .members
        .contains(&UserId::new("u1")));
}

#[tokio::test]
async fn vanished_ou_is_pruned_without_deleting_its_space() {
    let directory = MockDirectory {
        ous: vec![record("root", "/Company", None)],
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    chat.seed_space("spaces/old", "Company/Gone", &["u9"]);
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    catalog.insert(
        OrgUnitId::new("gone"),
        CatalogEntry {
            space: SpaceId::new("spaces/old"),
            display_name: "Company/Gone".to_string(),
        },
    );
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.entries_pruned, 1);
    assert!(catalog.get(&OrgUnitId::new("gone")).is_none());
    // The space itself is untouched, members included.
    let old = chat.space("spaces/old").unwrap();
    assert!(old.members.contains(&UserId::new("u9")));
}

#[tokio::test]
async fn transport_failure_aborts_before_any_mutation() {
    let directory = MockDirectory {
        fail_listing: true,
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    let sync = orchestrator(directory, chat.clone(), config(None));

    let mut catalog = Catalog::default();
    catalog.insert(
        OrgUnitId::new("gone"),
        CatalogEntry {
            space: SpaceId::new("spaces/old"),
            display_name: "Company/Gone".to_string(),
        },
    );
    let result = sync.run_pass(&mut catalog).await;

    assert!(result.is_err());
    // Nothing pruned, nothing created.
    assert_eq!(catalog.len(), 1);
    assert_eq!(chat.space_count(), 0);
}

#[tokio::test]
async fn admin_is_never_added_or_removed() {
    let directory = MockDirectory {
        ous: vec![record("root", "/Company", None)],
        members: members(&[("root", &["u1", "admin_id"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    chat.seed_space("spaces/s1", "Company", &["admin_id"]);
    let mut cfg = config(None);
    cfg.admin_user_id = Some(UserId::new("admin_id"));
    let sync = orchestrator(directory, chat.clone(), cfg);

    let mut catalog = Catalog::default();
    catalog.insert(
        OrgUnitId::new("root"),
        CatalogEntry {
            space: SpaceId::new("spaces/s1"),
            display_name: "Company".to_string(),
        },
    );
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.outcome(), PassOutcome::CompletedClean);
    assert_eq!(report.members_added, 1);
    assert_eq!(report.members_removed, 0);
    // The admin stays, by way of never being touched.
    let space = chat.space("spaces/s1").unwrap();
    assert!(space.members.contains(&UserId::new("admin_id")));
    assert!(space.members.contains(&UserId::new("u1")));
}

#[tokio::test]
async fn plan_mode_reports_without_mutating() {
    let directory = MockDirectory {
        ous: vec![
            record("root", "/Company", None),
            record("eng", "/Company/Eng", Some("root")),
        ],
        members: members(&[("root", &["u1"]), ("eng", &["u2"])]),
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    let mut cfg = config(Some(catalog_path.clone()));
    cfg.mode = PassMode::Plan;
    let sync = orchestrator(directory, chat.clone(), cfg);

    let mut catalog = Catalog::default();
    let report = sync.run_pass(&mut catalog).await.unwrap();

    assert_eq!(report.spaces_created, 2);
    assert_eq!(report.members_added, 2);
    // Nothing actually happened.
    assert_eq!(chat.space_count(), 0);
    assert!(catalog.is_empty());
    assert!(!catalog_path.exists());
}

#[tokio::test]
async fn apply_pass_persists_the_catalog() {
    let directory = MockDirectory {
        ous: vec![record("root", "/Company", None)],
        ..Default::default()
    };
    let chat = Arc::new(MockChat::default());
    let dir = tempfile::tempdir().unwrap();
    let catalog_path = dir.path().join("catalog.json");
    let sync = orchestrator(directory, chat, config(Some(catalog_path.clone())));

    let mut catalog = Catalog::default();
    sync.run_pass(&mut catalog).await.unwrap();

    let reloaded = Catalog::load(&catalog_path).unwrap();
    assert_eq!(reloaded.len(), 1);
    assert!(reloaded.get(&OrgUnitId::new("root")).is_some());
}
