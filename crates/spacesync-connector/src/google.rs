//! Google Workspace implementations of the collaborator traits.
//!
//! [`GoogleDirectory`] reads org units, users, and role assignments from the
//! Admin SDK Directory API. [`GoogleChat`] drives Chat Spaces and their
//! memberships. Both authenticate through a [`TokenProvider`] and retry
//! transient failures with bounded exponential backoff.
//!
//! The directory connector caches the full user listing for its lifetime;
//! one connector instance serves one reconciliation pass.

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, instrument, warn};

use crate::auth::TokenProvider;
use crate::error::{ConnectorError, ConnectorResult};
use crate::ids::{OrgUnitId, SpaceId, UserId};
use crate::paths;
use crate::resilience::RetryExecutor;
use crate::traits::{
    DirectorySource, MembershipOps, OrgUnitRecord, RoleAssignment, SpaceOps,
};

const DIRECTORY_BASE_URL: &str = "https://admin.googleapis.com";
const CHAT_BASE_URL: &str = "https://chat.googleapis.com";

/// Identifier given to the synthesized root OU record.
///
/// The Directory API lists the org units *under* a path but never the root
/// itself, so the connector appends one with a stable id.
pub const ROOT_OU_ID: &str = "root";

/// Page size for user and membership listings.
const PAGE_SIZE: u32 = 500;

/// Send an authorized request and decode the JSON body.
///
/// Mutating Chat calls can return an empty body; that decodes to `Null`.
async fn authorized_json(
    client: &Client,
    auth: &dyn TokenProvider,
    method: Method,
    url: String,
    query: &[(&str, String)],
    body: Option<&Value>,
) -> ConnectorResult<Value> {
    let token = auth.token().await?;

    let mut request = client
        .request(method, &url)
        .bearer_auth(token)
        .query(query);
    if let Some(body) = body {
        request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status();

    if status == StatusCode::TOO_MANY_REQUESTS {
        let retry_after_secs = response
            .headers()
            .get(reqwest::header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse().ok());
        return Err(ConnectorError::RateLimited { retry_after_secs });
    }

    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(ConnectorError::from_status(
            status.as_u16(),
            format!("{url}: {message}"),
        ));
    }

    let text = response.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_str(&text)
        .map_err(|e| ConnectorError::invalid_response(format!("{url}: {e}")))
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, context: &str) -> ConnectorResult<T> {
    serde_json::from_value(value)
        .map_err(|e| ConnectorError::invalid_response(format!("{context}: {e}")))
}

// ---------------------------------------------------------------------------
// Directory
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct OrgUnitsResponse {
    #[serde(default, rename = "organizationUnits")]
    organization_units: Vec<ApiOrgUnit>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiOrgUnit {
    org_unit_id: String,
    org_unit_path: String,
    #[serde(default)]
    parent_org_unit_id: Option<String>,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsersResponse {
    #[serde(default)]
    users: Vec<ApiUser>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiUser {
    id: String,
    #[serde(default)]
    org_unit_path: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RoleAssignmentsResponse {
    #[serde(default)]
    items: Vec<ApiRoleAssignment>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiRoleAssignment {
    #[serde(default)]
    role_id: String,
    #[serde(default)]
    assigned_to: String,
}

#[derive(Debug, Default)]
struct DirectoryCache {
    /// OU id -> normalized path, from the last org-unit listing.
    ou_paths: HashMap<OrgUnitId, String>,
    /// Full user listing: user id -> normalized home OU path.
    users: Option<Vec<(UserId, String)>>,
}

/// Admin SDK Directory connector.
pub struct GoogleDirectory {
    client: Client,
    auth: Arc<dyn TokenProvider>,
    base_url: String,
    retry: RetryExecutor,
    cache: RwLock<DirectoryCache>,
}

impl std::fmt::Debug for GoogleDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleDirectory")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoogleDirectory {
    /// Create a connector against the production API.
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(auth, DIRECTORY_BASE_URL)
    }

    /// Create a connector with a custom endpoint. Used in tests.
    pub fn with_base_url(auth: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryExecutor::with_defaults(),
            cache: RwLock::new(DirectoryCache::default()),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> ConnectorResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.retry
            .execute(|| {
                authorized_json(
                    &self.client,
                    self.auth.as_ref(),
                    Method::GET,
                    url.clone(),
                    query,
                    None,
                )
            })
            .await
    }

    /// Fetch (or reuse) the full user listing.
    async fn users(&self) -> ConnectorResult<Vec<(UserId, String)>> {
        {
            let cache = self.cache.read().await;
            if let Some(users) = cache.users.as_ref() {
                return Ok(users.clone());
            }
        }

        let mut users = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![
                ("customer", "my_customer".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = page_token.as_ref() {
                query.push(("pageToken", token.clone()));
            }

            let value = self.get_json("/admin/directory/v1/users", &query).await?;
            let page: UsersResponse = decode(value, "users listing")?;
            for user in page.users {
                users.push((
                    UserId::new(user.id),
                    paths::normalize(&user.org_unit_path).to_string(),
                ));
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        debug!(count = users.len(), "Fetched directory users");

        let mut cache = self.cache.write().await;
        cache.users = Some(users.clone());
        Ok(users)
    }
}

#[async_trait]
impl DirectorySource for GoogleDirectory {
    #[instrument(skip(self))]
    async fn list_org_units(&self, root_path: &str) -> ConnectorResult<Vec<OrgUnitRecord>> {
        let value = self
            .get_json(
                "/admin/directory/v1/customer/my_customer/orgunits",
                &[("type", "all".to_string())],
            )
            .await?;
        let listing: OrgUnitsResponse = decode(value, "org unit listing")?;

        let root = paths::normalize(root_path);
        let mut records: Vec<OrgUnitRecord> = listing
            .organization_units
            .into_iter()
            .filter(|ou| paths::is_under(&ou.org_unit_path, root))
            .map(|ou| OrgUnitRecord {
                id: OrgUnitId::new(ou.org_unit_id),
                path: paths::normalize(&ou.org_unit_path).to_string(),
                parent_id: ou.parent_org_unit_id.map(OrgUnitId::new),
                name: ou.name,
            })
            .collect();

        // The API lists org units under the root but not the root itself.
        if !records.iter().any(|r| r.path == root) {
            records.push(OrgUnitRecord {
                id: OrgUnitId::new(ROOT_OU_ID),
                path: root.to_string(),
                parent_id: None,
                name: paths::leaf(root).to_string(),
            });
        }

        let mut cache = self.cache.write().await;
        cache.ou_paths = records
            .iter()
            .map(|r| (r.id.clone(), r.path.clone()))
            .collect();

        Ok(records)
    }

    #[instrument(skip(self))]
    async fn list_ou_members(&self, ou_id: &OrgUnitId) -> ConnectorResult<Vec<UserId>> {
        let ou_path = {
            let cache = self.cache.read().await;
            cache.ou_paths.get(ou_id).cloned()
        }
        .ok_or_else(|| ConnectorError::ObjectNotFound {
            identifier: format!("org unit {ou_id} (not in last listing)"),
        })?;

        let users = self.users().await?;
        Ok(users
            .into_iter()
            .filter(|(_, path)| *path == ou_path)
            .map(|(id, _)| id)
            .collect())
    }

    #[instrument(skip(self))]
    async fn list_traversal_role_holders(
        &self,
        role_id: &str,
    ) -> ConnectorResult<Vec<RoleAssignment>> {
        let mut holder_ids = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("roleId", role_id.to_string())];
            if let Some(token) = page_token.as_ref() {
                query.push(("pageToken", token.clone()));
            }

            let value = self
                .get_json(
                    "/admin/directory/v1/customer/my_customer/roleassignments",
                    &query,
                )
                .await?;
            let page: RoleAssignmentsResponse = decode(value, "role assignments")?;
            for item in page.items {
                if item.role_id == role_id && !item.assigned_to.is_empty() {
                    holder_ids.push(UserId::new(item.assigned_to));
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        // A role assignment carries the user only; the home OU comes from
        // the user's own directory record.
        let users = self.users().await?;
        let home_paths: HashMap<UserId, String> = users.into_iter().collect();
        let ou_by_path: HashMap<String, OrgUnitId> = {
            let cache = self.cache.read().await;
            cache
                .ou_paths
                .iter()
                .map(|(id, path)| (path.clone(), id.clone()))
                .collect()
        };

        let mut assignments = Vec::new();
        for user_id in holder_ids {
            let Some(path) = home_paths.get(&user_id) else {
                warn!(user = %user_id, "Role holder not found in user listing; skipping");
                continue;
            };
            let Some(ou_id) = ou_by_path.get(path) else {
                debug!(
                    user = %user_id,
                    path = %path,
                    "Role holder's home OU is outside the synced subtree; skipping"
                );
                continue;
            };
            assignments.push(RoleAssignment {
                user_id,
                ou_id: ou_id.clone(),
            });
        }
        Ok(assignments)
    }
}

// ---------------------------------------------------------------------------
// Chat
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSpace {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MembershipsResponse {
    #[serde(default)]
    memberships: Vec<ApiMembership>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMembership {
    #[serde(default)]
    name: String,
    #[serde(default)]
    member: Option<ApiMember>,
    /// Set when the membership is pending deletion; such members are
    /// treated as already gone.
    #[serde(default)]
    deletion_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMember {
    #[serde(default)]
    name: String,
}

/// Google Chat connector.
pub struct GoogleChat {
    client: Client,
    auth: Arc<dyn TokenProvider>,
    base_url: String,
    retry: RetryExecutor,
}

impl std::fmt::Debug for GoogleChat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleChat")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl GoogleChat {
    /// Create a connector against the production API.
    pub fn new(auth: Arc<dyn TokenProvider>) -> Self {
        Self::with_base_url(auth, CHAT_BASE_URL)
    }

    /// Create a connector with a custom endpoint. Used in tests.
    pub fn with_base_url(auth: Arc<dyn TokenProvider>, base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            auth,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            retry: RetryExecutor::with_defaults(),
        }
    }

    /// Replace the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    async fn request_json(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<Value>,
    ) -> ConnectorResult<Value> {
        let url = format!("{}{}", self.base_url, path);
        self.retry
            .execute(|| {
                authorized_json(
                    &self.client,
                    self.auth.as_ref(),
                    method.clone(),
                    url.clone(),
                    query,
                    body.as_ref(),
                )
            })
            .await
    }
}

/// Extract a user id from a membership record.
///
/// Prefers `member.name` (`users/{id}`); falls back to the last segment of
/// the membership resource name.
fn membership_user_id(membership: &ApiMembership) -> Option<UserId> {
    if let Some(member) = membership.member.as_ref() {
        if let Some(id) = member.name.strip_prefix("users/") {
            if !id.is_empty() {
                return Some(UserId::new(id));
            }
        }
    }
    membership
        .name
        .rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .map(UserId::new)
}

#[async_trait]
impl SpaceOps for GoogleChat {
    #[instrument(skip(self))]
    async fn create_space(&self, display_name: &str) -> ConnectorResult<SpaceId> {
        let body = json!({
            "displayName": display_name,
            "spaceType": "SPACE",
            "externalUserAllowed": false,
        });
        let value = self
            .request_json(Method::POST, "/v1/spaces", &[], Some(body))
            .await?;
        let space: ApiSpace = decode(value, "create space response")?;
        Ok(SpaceId::new(space.name))
    }

    #[instrument(skip(self))]
    async fn rename_space(&self, space: &SpaceId, new_name: &str) -> ConnectorResult<()> {
        let path = format!("/v1/{}", space.as_str());
        let body = json!({ "displayName": new_name });
        self.request_json(
            Method::PATCH,
            &path,
            &[("updateMask", "displayName".to_string())],
            Some(body),
        )
        .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_space_members(&self, space: &SpaceId) -> ConnectorResult<Vec<UserId>> {
        let path = format!("/v1/{}/members", space.as_str());
        let mut members = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("pageSize", PAGE_SIZE.to_string())];
            if let Some(token) = page_token.as_ref() {
                query.push(("pageToken", token.clone()));
            }

            let value = self
                .request_json(Method::GET, &path, &query, None)
                .await?;
            let page: MembershipsResponse = decode(value, "membership listing")?;
            for membership in &page.memberships {
                if membership.deletion_time.is_some() {
                    continue;
                }
                if let Some(user) = membership_user_id(membership) {
                    members.push(user);
                }
            }

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        Ok(members)
    }
}

#[async_trait]
impl MembershipOps for GoogleChat {
    #[instrument(skip(self))]
    async fn add_member(&self, space: &SpaceId, user: &UserId) -> ConnectorResult<()> {
        let path = format!("/v1/{}/members", space.as_str());
        let body = json!({
            "member": {
                "name": format!("users/{}", user.as_str()),
                "type": "HUMAN",
            }
        });
        self.request_json(Method::POST, &path, &[], Some(body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn remove_member(&self, space: &SpaceId, user: &UserId) -> ConnectorResult<()> {
        let path = format!("/v1/{}/members/{}", space.as_str(), user.as_str());
        self.request_json(Method::DELETE, &path, &[], None).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn membership_user_id_prefers_member_name() {
        let membership = ApiMembership {
            name: "spaces/AAA/members/999".to_string(),
            member: Some(ApiMember {
                name: "users/123".to_string(),
            }),
            deletion_time: None,
        };
        assert_eq!(membership_user_id(&membership), Some(UserId::new("123")));
    }

    #[test]
    fn membership_user_id_falls_back_to_resource_name() {
        let membership = ApiMembership {
            name: "spaces/AAA/members/999".to_string(),
            member: None,
            deletion_time: None,
        };
        assert_eq!(membership_user_id(&membership), Some(UserId::new("999")));
    }
}
