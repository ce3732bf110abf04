//! Configuration file handling.
//!
//! One JSON file describes a deployment: the service-account credentials,
//! the admin to impersonate, the OU root to scope the sync to, and where
//! the catalog lives. The path comes from `--config` or the
//! `SPACESYNC_CONFIG` environment variable.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{CliError, CliResult};

fn default_scopes() -> Vec<String> {
    [
        "https://www.googleapis.com/auth/admin.directory.orgunit.readonly",
        "https://www.googleapis.com/auth/admin.directory.user.readonly",
        "https://www.googleapis.com/auth/admin.directory.rolemanagement.readonly",
        "https://www.googleapis.com/auth/chat.spaces",
        "https://www.googleapis.com/auth/chat.memberships",
    ]
    .map(String::from)
    .to_vec()
}

fn default_catalog_path() -> PathBuf {
    PathBuf::from("ou_space_map.json")
}

fn default_concurrency() -> usize {
    spacesync_engine::pass::DEFAULT_CONCURRENCY
}

/// Deployment configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    /// Path to the service-account key JSON.
    pub service_account_file: PathBuf,
    /// Admin email the service account impersonates.
    pub admin_user: String,
    /// Directory user id of that admin; excluded from membership diffs.
    /// Optional because some deployments let the diff manage the admin too.
    #[serde(default)]
    pub admin_user_id: Option<String>,
    /// Directory role id whose holders get subtree-wide visibility.
    pub traversal_role_id: String,
    /// Root OU path scoping the sync (`/Company`).
    pub ou_root_path: String,
    /// Where the OU to Space catalog is persisted.
    #[serde(default = "default_catalog_path")]
    pub catalog_path: PathBuf,
    /// Bound on concurrent per-OU workers.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// OAuth scopes to request; the defaults cover everything the sync uses.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl AppConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> CliResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CliError::Config(format!("cannot read {}: {e}", path.display()))
        })?;
        let config: AppConfig = serde_json::from_str(&raw).map_err(|e| {
            CliError::Config(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.admin_user.is_empty() {
            return Err(CliError::Config("admin_user must not be empty".into()));
        }
        if self.traversal_role_id.is_empty() {
            return Err(CliError::Config(
                "traversal_role_id must not be empty".into(),
            ));
        }
        if !self.ou_root_path.starts_with('/') {
            return Err(CliError::Config(format!(
                "ou_root_path must start with '/', got '{}'",
                self.ou_root_path
            )));
        }
        if self.concurrency == 0 {
            return Err(CliError::Config("concurrency must be at least 1".into()));
        }
        if self.scopes.is_empty() {
            return Err(CliError::Config("scopes must not be empty".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(body: &str) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, body).unwrap();
        (dir, path)
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let (_dir, path) = write_config(
            r#"{
                "service_account_file": "/etc/spacesync/key.json",
                "admin_user": "admin@example.com",
                "traversal_role_id": "role_123",
                "ou_root_path": "/Company"
            }"#,
        );
        let config = AppConfig::load(&path).unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("ou_space_map.json"));
        assert_eq!(config.concurrency, default_concurrency());
        assert_eq!(config.scopes.len(), 5);
        assert!(config.admin_user_id.is_none());
    }

    #[test]
    fn relative_root_path_is_rejected() {
        let (_dir, path) = write_config(
            r#"{
                "service_account_file": "key.json",
                "admin_user": "admin@example.com",
                "traversal_role_id": "role_123",
                "ou_root_path": "Company"
            }"#,
        );
        assert!(matches!(AppConfig::load(&path), Err(CliError::Config(_))));
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let (_dir, path) = write_config(
            r#"{
                "service_account_file": "key.json",
                "admin_user": "admin@example.com",
                "traversal_role_id": "role_123",
                "ou_root_path": "/Company",
                "typo_field": true
            }"#,
        );
        assert!(matches!(AppConfig::load(&path), Err(CliError::Config(_))));
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let (_dir, path) = write_config(
            r#"{
                "service_account_file": "key.json",
                "admin_user": "admin@example.com",
                "traversal_role_id": "role_123",
                "ou_root_path": "/Company",
                "concurrency": 0
            }"#,
        );
        assert!(matches!(AppConfig::load(&path), Err(CliError::Config(_))));
    }
}
