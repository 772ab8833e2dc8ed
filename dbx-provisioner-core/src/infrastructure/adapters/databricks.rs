// dbx-provisioner-core/src/infrastructure/adapters/databricks.rs
//
// Workspace REST APIs: repos, jobs, pipelines, object permissions and
// Unity Catalog table grants.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::descriptor::{Principal, ResourceSpec};
use crate::domain::error::ApiError;
use crate::domain::git::GitProvider;
use crate::domain::permission::{Grant, PermissionLevel, ResourceKind};
use crate::domain::workspace::WorkspaceHandle;
use crate::infrastructure::adapters::token::TokenProvider;
use crate::infrastructure::http::{HttpTransport, id_field, str_field};
use crate::ports::{DatabricksApi, ObjectRef};

const SERVICE: &str = "databricks";

pub struct DatabricksRestClient {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenProvider>,
    git_provider: GitProvider,
    base_url_override: Option<String>,
}

impl DatabricksRestClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenProvider>,
        git_provider: GitProvider,
    ) -> Self {
        Self {
            transport,
            tokens,
            git_provider,
            base_url_override: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url_override = base_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    fn base(&self, workspace: &WorkspaceHandle) -> String {
        self.base_url_override
            .clone()
            .unwrap_or_else(|| workspace.url())
    }

    async fn call(
        &self,
        workspace: &WorkspaceHandle,
        method: Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let token = self.tokens.token().await?;
        let url = format!("{}{}", self.base(workspace), path);
        self.transport.send(method, &url, query, &token, body).await
    }

    /// POST without transport retry: Databricks creates are not idempotent.
    async fn create(&self, workspace: &WorkspaceHandle, path: &str, body: &Value) -> Result<Value, ApiError> {
        let token = self.tokens.token().await?;
        let url = format!("{}{}", self.base(workspace), path);
        self.transport
            .send_once(Method::POST, &url, &[], &token, Some(body))
            .await
    }

    // --- LOOKUPS ---

    async fn find_repo(&self, ws: &WorkspaceHandle, repo_path: &str) -> Result<Option<String>, ApiError> {
        let page = self
            .call(ws, Method::GET, "/api/2.0/repos", &[("path_prefix", repo_path)], None)
            .await?;
        Ok(page
            .get("repos")
            .and_then(Value::as_array)
            .and_then(|repos| {
                repos
                    .iter()
                    .find(|r| str_field(r, "/path") == Some(repo_path))
                    .and_then(|r| id_field(r, "id"))
            }))
    }

    async fn find_job(&self, ws: &WorkspaceHandle, name: &str) -> Result<Option<String>, ApiError> {
        let page = self
            .call(ws, Method::GET, "/api/2.1/jobs/list", &[("name", name)], None)
            .await?;
        let ids: Vec<String> = page
            .get("jobs")
            .and_then(Value::as_array)
            .map(|jobs| {
                jobs.iter()
                    .filter(|j| str_field(j, "/settings/name") == Some(name))
                    .filter_map(|j| id_field(j, "job_id"))
                    .collect()
            })
            .unwrap_or_default();
        Ok(oldest(ids, "job", name))
    }

    async fn find_pipeline(&self, ws: &WorkspaceHandle, name: &str) -> Result<Option<String>, ApiError> {
        let filter = format!("name LIKE '{}'", name.replace('\'', "''"));
        let page = self
            .call(ws, Method::GET, "/api/2.0/pipelines", &[("filter", filter.as_str())], None)
            .await?;
        let ids: Vec<String> = page
            .get("statuses")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter(|p| str_field(p, "/name") == Some(name))
                    .filter_map(|p| id_field(p, "pipeline_id"))
                    .collect()
            })
            .unwrap_or_default();
        Ok(oldest(ids, "pipeline", name))
    }

    async fn table_exists(&self, ws: &WorkspaceHandle, table: &str) -> Result<bool, ApiError> {
        let path = format!("/api/2.1/unity-catalog/tables/{}", table);
        match self.call(ws, Method::GET, &path, &[], None).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    // --- CREATION ---

    async fn create_repo(&self, ws: &WorkspaceHandle, repo_path: &str, git_url: &str) -> Result<String, ApiError> {
        let body = json!({
            "url": git_url,
            "provider": self.git_provider.as_api_name(),
            "path": repo_path,
        });
        match self.create(ws, "/api/2.0/repos", &body).await {
            Ok(value) => id_field(&value, "id").ok_or_else(|| missing_id("repo", repo_path)),
            // Created concurrently or by a previous, interrupted run.
            Err(e) if e.status == Some(400) && e.message.to_lowercase().contains("already exists") => self
                .find_repo(ws, repo_path)
                .await?
                .ok_or(e),
            Err(e) => Err(e),
        }
    }

    async fn create_job(&self, ws: &WorkspaceHandle, name: &str) -> Result<String, ApiError> {
        let body = json!({ "name": name, "max_concurrent_runs": 1 });
        let value = self.create(ws, "/api/2.1/jobs/create", &body).await?;
        id_field(&value, "job_id").ok_or_else(|| missing_id("job", name))
    }

    async fn create_pipeline(&self, ws: &WorkspaceHandle, name: &str) -> Result<String, ApiError> {
        let body = json!({ "name": name, "development": true });
        let value = self.create(ws, "/api/2.0/pipelines", &body).await?;
        id_field(&value, "pipeline_id").ok_or_else(|| missing_id("pipeline", name))
    }

    // --- ACL ---

    fn permissions_path(object: &ObjectRef) -> Option<String> {
        let collection = match object.kind {
            ResourceKind::Repo => "repos",
            ResourceKind::Job => "jobs",
            ResourceKind::Pipeline => "pipelines",
            ResourceKind::OutputPort => return None,
        };
        Some(format!("/api/2.0/permissions/{}/{}", collection, object.id))
    }

    fn uc_path(object: &ObjectRef) -> String {
        format!("/api/2.1/unity-catalog/permissions/table/{}", object.id)
    }

    async fn object_acl(&self, ws: &WorkspaceHandle, path: &str) -> Result<Vec<Value>, ApiError> {
        let value = self.call(ws, Method::GET, path, &[], None).await?;
        Ok(value
            .get("access_control_list")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }

    async fn uc_privileges(&self, ws: &WorkspaceHandle, object: &ObjectRef) -> Result<Vec<(String, Vec<String>)>, ApiError> {
        let value = self.call(ws, Method::GET, &Self::uc_path(object), &[], None).await?;
        Ok(value
            .get("privilege_assignments")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|a| {
                        let principal = str_field(a, "/principal")?.to_string();
                        let privileges = a
                            .get("privileges")
                            .and_then(Value::as_array)
                            .map(|p| p.iter().filter_map(Value::as_str).map(str::to_string).collect())
                            .unwrap_or_default();
                        Some((principal, privileges))
                    })
                    .collect()
            })
            .unwrap_or_default())
    }
}

/// Names are not unique in Databricks. With duplicates (an interrupted create
/// that still landed), the oldest object wins: lowest numeric id first.
fn oldest(mut ids: Vec<String>, kind: &str, name: &str) -> Option<String> {
    if ids.len() > 1 {
        warn!(kind, name, matches = ids.len(), "Duplicate object names, using the oldest");
    }
    ids.sort_by(|a, b| match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    });
    ids.into_iter().next()
}

fn missing_id(kind: &str, name: &str) -> ApiError {
    ApiError::network(SERVICE, format!("empty response creating {} '{}'", kind, name))
}

/// ACL entry key for a principal: `user_name` or `group_name`.
fn acl_entry(principal: &Principal) -> (&'static str, &str) {
    match principal {
        Principal::User(mail) => ("user_name", mail.as_str()),
        Principal::Group(name) => ("group_name", name.as_str()),
    }
}

/// Key and name of whoever an ACL entry belongs to, service principals included.
fn entry_owner(entry: &Value) -> Option<(&'static str, &str)> {
    ["user_name", "group_name", "service_principal_name"]
        .into_iter()
        .find_map(|key| entry.get(key).and_then(Value::as_str).map(|name| (key, name)))
}

fn acl_principal(entry: &Value) -> Option<Principal> {
    if let Some(user) = str_field(entry, "/user_name") {
        return Some(Principal::User(user.to_string()));
    }
    str_field(entry, "/group_name").map(|g| Principal::Group(g.to_string()))
}

/// Unity Catalog principals are plain strings; mail-shaped ones are users.
fn uc_principal(raw: &str) -> Principal {
    if raw.contains('@') {
        Principal::User(raw.to_string())
    } else {
        Principal::Group(raw.to_string())
    }
}

/// Direct grants of an ACL entry (inherited ones come from a parent folder).
fn direct_levels(entry: &Value) -> Vec<String> {
    entry
        .get("all_permissions")
        .and_then(Value::as_array)
        .map(|perms| {
            perms
                .iter()
                .filter(|p| !p.get("inherited").and_then(Value::as_bool).unwrap_or(false))
                .filter_map(|p| str_field(p, "/permission_level").map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl DatabricksApi for DatabricksRestClient {
    #[instrument(skip(self, workspace), fields(workspace = %workspace.host(), kind = %spec.kind(), name = spec.name()))]
    async fn ensure_object(&self, workspace: &WorkspaceHandle, spec: &ResourceSpec) -> Result<ObjectRef, ApiError> {
        if let Some(found) = self.find_object(workspace, spec).await? {
            return Ok(found);
        }
        let id = match spec {
            ResourceSpec::Repo { path, git_url } => self.create_repo(workspace, path, git_url).await?,
            ResourceSpec::Job { name } => self.create_job(workspace, name).await?,
            ResourceSpec::Pipeline { name } => self.create_pipeline(workspace, name).await?,
            ResourceSpec::OutputPort { table } => {
                return Err(ApiError::http(
                    SERVICE,
                    404,
                    format!("table '{}' does not exist", table),
                ));
            }
        };
        info!(id = %id, "✨ Created");
        Ok(ObjectRef {
            kind: spec.kind(),
            id,
            name: spec.name().to_string(),
        })
    }

    async fn find_object(&self, workspace: &WorkspaceHandle, spec: &ResourceSpec) -> Result<Option<ObjectRef>, ApiError> {
        let id = match spec {
            ResourceSpec::Repo { path, .. } => self.find_repo(workspace, path).await?,
            ResourceSpec::Job { name } => self.find_job(workspace, name).await?,
            ResourceSpec::Pipeline { name } => self.find_pipeline(workspace, name).await?,
            ResourceSpec::OutputPort { table } => self
                .table_exists(workspace, table)
                .await?
                .then(|| table.clone()),
        };
        Ok(id.map(|id| ObjectRef {
            kind: spec.kind(),
            id,
            name: spec.name().to_string(),
        }))
    }

    #[instrument(skip(self, workspace), fields(kind = %object.kind, name = %object.name))]
    async fn delete_object(&self, workspace: &WorkspaceHandle, object: &ObjectRef) -> Result<(), ApiError> {
        let result = match object.kind {
            ResourceKind::Repo => {
                let path = format!("/api/2.0/repos/{}", object.id);
                self.call(workspace, Method::DELETE, &path, &[], None).await
            }
            ResourceKind::Job => {
                let job_id: Value = object
                    .id
                    .parse::<u64>()
                    .map(Value::from)
                    .unwrap_or_else(|_| Value::from(object.id.clone()));
                let body = json!({ "job_id": job_id });
                self.call(workspace, Method::POST, "/api/2.1/jobs/delete", &[], Some(&body))
                    .await
            }
            ResourceKind::Pipeline => {
                let path = format!("/api/2.0/pipelines/{}", object.id);
                self.call(workspace, Method::DELETE, &path, &[], None).await
            }
            ResourceKind::OutputPort => {
                warn!("Tables are never deleted by the provisioner");
                return Ok(());
            }
        };
        match result {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_grants(&self, workspace: &WorkspaceHandle, object: &ObjectRef) -> Result<Vec<Grant>, ApiError> {
        match Self::permissions_path(object) {
            Some(path) => {
                let acl = self.object_acl(workspace, &path).await?;
                Ok(acl
                    .iter()
                    .filter_map(|entry| {
                        let principal = acl_principal(entry)?;
                        Some(
                            direct_levels(entry)
                                .into_iter()
                                .map(move |level| Grant {
                                    principal: principal.clone(),
                                    level: PermissionLevel::new(level),
                                })
                                .collect::<Vec<_>>(),
                        )
                    })
                    .flatten()
                    .collect())
            }
            None => {
                let assignments = self.uc_privileges(workspace, object).await?;
                Ok(assignments
                    .into_iter()
                    .flat_map(|(principal, privileges)| {
                        let principal = uc_principal(&principal);
                        privileges.into_iter().map(move |p| Grant {
                            principal: principal.clone(),
                            level: PermissionLevel::new(p),
                        })
                    })
                    .collect())
            }
        }
    }

    #[instrument(skip(self, workspace), fields(kind = %object.kind, name = %object.name, principal = %principal, level = %level))]
    async fn set_grant(
        &self,
        workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
        level: &PermissionLevel,
    ) -> Result<(), ApiError> {
        match Self::permissions_path(object) {
            Some(path) => {
                let (key, name) = acl_entry(principal);
                let body = json!({
                    "access_control_list": [{ key: name, "permission_level": level.as_str() }]
                });
                self.call(workspace, Method::PATCH, &path, &[], Some(&body)).await?;
            }
            None => {
                let current = self.uc_privileges(workspace, object).await?;
                let stale: Vec<String> = current
                    .into_iter()
                    .filter(|(p, _)| p == principal.name())
                    .flat_map(|(_, privileges)| privileges)
                    .filter(|p| !p.eq_ignore_ascii_case(level.as_str()))
                    .collect();
                let body = json!({
                    "changes": [{
                        "principal": principal.name(),
                        "add": [level.as_str()],
                        "remove": stale,
                    }]
                });
                self.call(workspace, Method::PATCH, &Self::uc_path(object), &[], Some(&body))
                    .await?;
            }
        }
        Ok(())
    }

    #[instrument(skip(self, workspace, add, remove), fields(name = %object.name, principal = %principal))]
    async fn update_privileges(
        &self,
        workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
        add: &[PermissionLevel],
        remove: &[PermissionLevel],
    ) -> Result<(), ApiError> {
        if Self::permissions_path(object).is_some() {
            return Err(ApiError::http(
                SERVICE,
                400,
                format!("{} '{}' is not a Unity Catalog securable", object.kind, object.name),
            ));
        }
        let as_strs = |levels: &[PermissionLevel]| levels.iter().map(|l| l.as_str().to_string()).collect::<Vec<_>>();
        let body = json!({
            "changes": [{
                "principal": principal.name(),
                "add": as_strs(add),
                "remove": as_strs(remove),
            }]
        });
        self.call(workspace, Method::PATCH, &Self::uc_path(object), &[], Some(&body))
            .await?;
        Ok(())
    }

    #[instrument(skip(self, workspace), fields(kind = %object.kind, name = %object.name, principal = %principal))]
    async fn revoke_grant(&self, workspace: &WorkspaceHandle, object: &ObjectRef, principal: &Principal) -> Result<(), ApiError> {
        match Self::permissions_path(object) {
            Some(path) => {
                // PUT replaces the direct ACL: resend every other direct entry.
                let acl = self.object_acl(workspace, &path).await?;
                let target = acl_entry(principal);
                let kept: Vec<Value> = acl
                    .iter()
                    .filter_map(|entry| {
                        let (key, name) = entry_owner(entry)?;
                        ((key, name) != target).then(|| {
                            direct_levels(entry)
                                .into_iter()
                                .map(move |level| json!({ key: name, "permission_level": level }))
                        })
                    })
                    .flatten()
                    .collect();
                let body = json!({ "access_control_list": kept });
                self.call(workspace, Method::PUT, &path, &[], Some(&body)).await?;
            }
            None => {
                let privileges: Vec<String> = self
                    .uc_privileges(workspace, object)
                    .await?
                    .into_iter()
                    .filter(|(p, _)| p == principal.name())
                    .flat_map(|(_, privileges)| privileges)
                    .collect();
                if privileges.is_empty() {
                    return Ok(());
                }
                let body = json!({
                    "changes": [{ "principal": principal.name(), "remove": privileges }]
                });
                self.call(workspace, Method::PATCH, &Self::uc_path(object), &[], Some(&body))
                    .await?;
            }
        }
        Ok(())
    }
}
