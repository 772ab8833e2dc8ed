#![allow(dead_code)]
#![allow(clippy::unwrap_used)]
//! In-memory stand-ins for every engine port. Each fake appends what it was
//! asked to do to a shared call log, so tests can assert on order as well as
//! on end state.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dbx_provisioner_core::domain::descriptor::{Principal, RawDescriptor, RawSpecific, ResourceSpec};
use dbx_provisioner_core::domain::error::ApiError;
use dbx_provisioner_core::domain::git::{GitCredentials, GitProvider, Secret};
use dbx_provisioner_core::domain::permission::{
    Grant, PermissionLevel, ResourceKind, RoleAssignment, RoleDefinition,
};
use dbx_provisioner_core::domain::workspace::{
    AzureResourceId, AzureWorkspace, ProvisioningState, SkuType, WorkspaceHandle,
};
use dbx_provisioner_core::infrastructure::config::AppSettings;
use dbx_provisioner_core::infrastructure::credentials::StaticGitCredentialStore;
use dbx_provisioner_core::ports::{
    DatabricksApi, EnginePorts, GitBinder, ObjectRef, PrincipalDirectory, RoleAssignmentApi,
    RoleAssignmentRequest, WorkspaceApi, WorkspaceCreateRequest,
};

pub const SUBSCRIPTION: &str = "sub-1";
pub const RESOURCE_GROUP: &str = "rg-data";
pub const OWNER_ROLE: &str = "role-owner";

#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.entries().iter().filter(|e| e.starts_with(prefix)).count()
    }

    pub fn position(&self, prefix: &str) -> Option<usize> {
        self.entries().iter().position(|e| e.starts_with(prefix))
    }

    pub fn clear(&self) {
        self.0.lock().unwrap().clear();
    }
}

// --- ARM WORKSPACES ---

pub struct FakeWorkspaces {
    log: CallLog,
    workspaces: Mutex<BTreeMap<String, AzureWorkspace>>,
    /// Polls answered with `Creating` after a create, before the workspace turns ready.
    pub polls_before_ready: Mutex<u32>,
    /// State a new workspace settles in.
    pub final_state: Mutex<ProvisioningState>,
    /// Delay added to every lookup, to widen race windows.
    pub latency: Mutex<Duration>,
    next_id: AtomicU64,
}

impl FakeWorkspaces {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            workspaces: Mutex::new(BTreeMap::new()),
            polls_before_ready: Mutex::new(0),
            final_state: Mutex::new(ProvisioningState::Succeeded),
            latency: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1000),
        }
    }

    fn key(id: &AzureResourceId) -> String {
        id.lock_key()
    }

    /// Registers a workspace that exists before the test starts.
    pub fn seed(&self, name: &str, sku: SkuType, state: ProvisioningState) -> AzureWorkspace {
        let ws = self.build(AzureResourceId::workspace(SUBSCRIPTION, RESOURCE_GROUP, name), sku, state);
        self.workspaces.lock().unwrap().insert(Self::key(&ws.resource_id), ws.clone());
        ws
    }

    /// A workspace outside the engine's resource group, reachable by URL only.
    pub fn seed_foreign(&self, workspace_id: &str) -> AzureWorkspace {
        let mut ws = self.build(
            AzureResourceId::workspace(SUBSCRIPTION, "rg-other-team", "shared-ws"),
            SkuType::Premium,
            ProvisioningState::Succeeded,
        );
        ws.workspace_id = workspace_id.to_string();
        ws.host = format!("adb-{}.7.azuredatabricks.net", workspace_id);
        self.workspaces.lock().unwrap().insert(Self::key(&ws.resource_id), ws.clone());
        ws
    }

    pub fn get(&self, name: &str) -> Option<AzureWorkspace> {
        let id = AzureResourceId::workspace(SUBSCRIPTION, RESOURCE_GROUP, name);
        self.workspaces.lock().unwrap().get(&Self::key(&id)).cloned()
    }

    pub fn len(&self) -> usize {
        self.workspaces.lock().unwrap().len()
    }

    fn build(&self, resource_id: AzureResourceId, sku: SkuType, state: ProvisioningState) -> AzureWorkspace {
        let n = self.next_id.fetch_add(1, Ordering::SeqCst);
        AzureWorkspace {
            managed_resource_group_id: format!("/subscriptions/{}/resourceGroups/{}-rg", SUBSCRIPTION, resource_id.name),
            resource_id,
            workspace_id: n.to_string(),
            host: format!("adb-{}.4.azuredatabricks.net", n),
            sku,
            location: "westeurope".into(),
            state,
        }
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl WorkspaceApi for FakeWorkspaces {
    async fn get_workspace(&self, id: &AzureResourceId) -> Result<Option<AzureWorkspace>, ApiError> {
        self.wait().await;
        self.log.push(format!("arm.get {}", id.name));
        let mut all = self.workspaces.lock().unwrap();
        let Some(ws) = all.get_mut(&Self::key(id)) else {
            return Ok(None);
        };
        if ws.state == ProvisioningState::Creating {
            let mut left = self.polls_before_ready.lock().unwrap();
            if *left == 0 {
                ws.state = self.final_state.lock().unwrap().clone();
            } else {
                *left -= 1;
            }
        }
        Ok(Some(ws.clone()))
    }

    async fn find_workspace_by_host(&self, host: &str) -> Result<Option<AzureWorkspace>, ApiError> {
        self.wait().await;
        self.log.push(format!("arm.find_host {}", host));
        Ok(self
            .workspaces
            .lock()
            .unwrap()
            .values()
            .find(|ws| ws.host.eq_ignore_ascii_case(host))
            .cloned())
    }

    async fn create_workspace(&self, request: &WorkspaceCreateRequest) -> Result<AzureWorkspace, ApiError> {
        self.log.push(format!("arm.create {} {}", request.resource_id.name, request.sku));
        let mut all = self.workspaces.lock().unwrap();
        let key = Self::key(&request.resource_id);
        // A re-issued PUT keeps the workspace identity.
        let ws = match all.get(&key) {
            Some(existing) => AzureWorkspace {
                state: ProvisioningState::Creating,
                sku: request.sku,
                ..existing.clone()
            },
            None => self.build(request.resource_id.clone(), request.sku, ProvisioningState::Creating),
        };
        all.insert(key, ws.clone());
        Ok(ws)
    }

    async fn delete_workspace(&self, id: &AzureResourceId) -> Result<(), ApiError> {
        self.log.push(format!("arm.delete {}", id.name));
        self.workspaces.lock().unwrap().remove(&Self::key(id));
        Ok(())
    }
}

// --- ARM ROLE ASSIGNMENTS ---

pub struct FakeRoleAssignments {
    log: CallLog,
    assignments: Mutex<Vec<RoleAssignment>>,
}

impl FakeRoleAssignments {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            assignments: Mutex::new(Vec::new()),
        }
    }

    pub fn seed(&self, scope: &str, role_definition_id: &str, principal_id: &str) -> String {
        let id = format!(
            "{}/providers/Microsoft.Authorization/roleAssignments/seed-{}",
            scope.trim_end_matches('/'),
            self.assignments.lock().unwrap().len()
        );
        self.assignments.lock().unwrap().push(RoleAssignment {
            id: id.clone(),
            scope: scope.to_string(),
            role_definition_id: role_definition_id.to_string(),
            principal_id: principal_id.to_string(),
        });
        id
    }

    pub fn all(&self) -> Vec<RoleAssignment> {
        self.assignments.lock().unwrap().clone()
    }

    pub fn for_principal(&self, principal_id: &str) -> Vec<RoleAssignment> {
        self.all()
            .into_iter()
            .filter(|a| a.principal_id == principal_id)
            .collect()
    }
}

#[async_trait]
impl RoleAssignmentApi for FakeRoleAssignments {
    async fn list_for_principal(&self, scope: &str, principal_id: &str) -> Result<Vec<RoleAssignment>, ApiError> {
        self.log.push(format!("rbac.list {}", principal_id));
        let scope = scope.to_lowercase();
        Ok(self
            .all()
            .into_iter()
            .filter(|a| a.principal_id == principal_id && scope.starts_with(&a.scope.to_lowercase()))
            .collect())
    }

    async fn create(&self, request: &RoleAssignmentRequest) -> Result<(), ApiError> {
        self.log.push(format!("rbac.create {} {}", request.principal_id, request.role_definition_id));
        let id = format!(
            "{}/providers/Microsoft.Authorization/roleAssignments/{}",
            request.scope, request.name
        );
        let mut all = self.assignments.lock().unwrap();
        if !all.iter().any(|a| a.id == id) {
            all.push(RoleAssignment {
                id,
                scope: request.scope.clone(),
                role_definition_id: request.role_definition_id.clone(),
                principal_id: request.principal_id.clone(),
            });
        }
        Ok(())
    }

    async fn delete(&self, assignment_id: &str) -> Result<(), ApiError> {
        self.log.push(format!("rbac.delete {}", assignment_id));
        self.assignments.lock().unwrap().retain(|a| a.id != assignment_id);
        Ok(())
    }
}

// --- GRAPH DIRECTORY ---

pub struct FakeDirectory {
    log: CallLog,
    unknown: Mutex<HashSet<String>>,
}

impl FakeDirectory {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            unknown: Mutex::new(HashSet::new()),
        }
    }

    pub fn object_id(principal: &Principal) -> String {
        format!("oid-{}", principal.name())
    }

    pub fn forget(&self, principal: &Principal) {
        self.unknown.lock().unwrap().insert(principal.name().to_string());
    }
}

#[async_trait]
impl PrincipalDirectory for FakeDirectory {
    async fn resolve(&self, principal: &Principal) -> Result<Option<String>, ApiError> {
        self.log.push(format!("graph.resolve {}", principal));
        if self.unknown.lock().unwrap().contains(principal.name()) {
            return Ok(None);
        }
        Ok(Some(Self::object_id(principal)))
    }
}

// --- DATABRICKS WORKSPACE APIS ---

type ObjectKey = (String, ResourceKind, String);

pub struct FakeDatabricks {
    log: CallLog,
    /// (host, kind, natural key) -> object
    objects: Mutex<HashMap<ObjectKey, ObjectRef>>,
    /// object id -> direct grants
    grants: Mutex<HashMap<String, Vec<Grant>>>,
    /// Tables are never created by the engine; they exist or they don't.
    tables: Mutex<HashSet<(String, String)>>,
    failing_kinds: Mutex<HashSet<ResourceKind>>,
    /// Delay added to every object lookup, to widen race windows.
    pub latency: Mutex<Duration>,
    next_id: AtomicU64,
}

impl FakeDatabricks {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            objects: Mutex::new(HashMap::new()),
            grants: Mutex::new(HashMap::new()),
            tables: Mutex::new(HashSet::new()),
            failing_kinds: Mutex::new(HashSet::new()),
            latency: Mutex::new(Duration::ZERO),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn seed_table(&self, host: &str, table: &str) {
        self.tables.lock().unwrap().insert((host.to_string(), table.to_string()));
    }

    /// Every grant change on objects of `kind` fails with HTTP 400.
    pub fn fail_grants_on(&self, kind: ResourceKind) {
        self.failing_kinds.lock().unwrap().insert(kind);
    }

    pub fn object(&self, host: &str, kind: ResourceKind, name: &str) -> Option<ObjectRef> {
        self.objects
            .lock()
            .unwrap()
            .get(&(host.to_string(), kind, name.to_string()))
            .cloned()
    }

    pub fn object_count(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn grants_of(&self, object: &ObjectRef) -> Vec<Grant> {
        self.grants.lock().unwrap().get(&object.id).cloned().unwrap_or_default()
    }

    pub fn seed_grant(&self, object: &ObjectRef, principal: Principal, level: &str) {
        self.grants.lock().unwrap().entry(object.id.clone()).or_default().push(Grant {
            principal,
            level: PermissionLevel::new(level),
        });
    }

    async fn wait(&self) {
        let latency = *self.latency.lock().unwrap();
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
    }

    fn lookup(&self, workspace: &WorkspaceHandle, spec: &ResourceSpec) -> Option<ObjectRef> {
        if let ResourceSpec::OutputPort { table } = spec {
            let exists = self
                .tables
                .lock()
                .unwrap()
                .contains(&(workspace.host().to_string(), table.clone()));
            return exists.then(|| ObjectRef {
                kind: ResourceKind::OutputPort,
                id: table.clone(),
                name: table.clone(),
            });
        }
        self.object(workspace.host(), spec.kind(), spec.name())
    }
}

#[async_trait]
impl DatabricksApi for FakeDatabricks {
    async fn ensure_object(&self, workspace: &WorkspaceHandle, spec: &ResourceSpec) -> Result<ObjectRef, ApiError> {
        self.log.push(format!("dbx.ensure {} {}", spec.kind(), spec.name()));
        self.wait().await;
        if let Some(found) = self.lookup(workspace, spec) {
            return Ok(found);
        }
        if spec.kind() == ResourceKind::OutputPort {
            return Err(ApiError::http("databricks", 404, format!("table {} not found", spec.name())));
        }
        self.log.push(format!("dbx.create {} {}", spec.kind(), spec.name()));
        let object = ObjectRef {
            kind: spec.kind(),
            id: format!("{}-{}", spec.kind(), self.next_id.fetch_add(1, Ordering::SeqCst)),
            name: spec.name().to_string(),
        };
        self.objects.lock().unwrap().insert(
            (workspace.host().to_string(), spec.kind(), spec.name().to_string()),
            object.clone(),
        );
        Ok(object)
    }

    async fn find_object(&self, workspace: &WorkspaceHandle, spec: &ResourceSpec) -> Result<Option<ObjectRef>, ApiError> {
        self.log.push(format!("dbx.find {} {}", spec.kind(), spec.name()));
        self.wait().await;
        Ok(self.lookup(workspace, spec))
    }

    async fn delete_object(&self, workspace: &WorkspaceHandle, object: &ObjectRef) -> Result<(), ApiError> {
        self.log.push(format!("dbx.delete {} {}", object.kind, object.name));
        self.objects
            .lock()
            .unwrap()
            .remove(&(workspace.host().to_string(), object.kind, object.name.clone()));
        self.grants.lock().unwrap().remove(&object.id);
        Ok(())
    }

    async fn list_grants(&self, _workspace: &WorkspaceHandle, object: &ObjectRef) -> Result<Vec<Grant>, ApiError> {
        self.log.push(format!("dbx.list {} {}", object.kind, object.name));
        Ok(self.grants_of(object))
    }

    async fn set_grant(
        &self,
        _workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
        level: &PermissionLevel,
    ) -> Result<(), ApiError> {
        self.log.push(format!("dbx.set {} {} {} {}", object.kind, object.name, principal, level));
        if self.failing_kinds.lock().unwrap().contains(&object.kind) {
            return Err(ApiError::http("databricks", 400, "invalid permission level"));
        }
        let mut grants = self.grants.lock().unwrap();
        let entries = grants.entry(object.id.clone()).or_default();
        entries.retain(|g| &g.principal != principal);
        entries.push(Grant {
            principal: principal.clone(),
            level: level.clone(),
        });
        Ok(())
    }

    async fn update_privileges(
        &self,
        _workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
        add: &[PermissionLevel],
        remove: &[PermissionLevel],
    ) -> Result<(), ApiError> {
        let signed = |sign: char, levels: &[PermissionLevel]| {
            levels.iter().map(|l| format!("{}{}", sign, l)).collect::<Vec<_>>().join(" ")
        };
        self.log.push(
            format!("dbx.uc {} {} {} {}", object.name, principal, signed('+', add), signed('-', remove))
                .trim_end()
                .to_string(),
        );
        if object.kind != ResourceKind::OutputPort {
            return Err(ApiError::http("databricks", 400, "not a Unity Catalog securable"));
        }
        if self.failing_kinds.lock().unwrap().contains(&object.kind) {
            return Err(ApiError::http("databricks", 400, "invalid privilege"));
        }
        let mut grants = self.grants.lock().unwrap();
        let entries = grants.entry(object.id.clone()).or_default();
        entries.retain(|g| &g.principal != principal || !remove.contains(&g.level));
        for level in add {
            if !entries.iter().any(|g| &g.principal == principal && &g.level == level) {
                entries.push(Grant {
                    principal: principal.clone(),
                    level: level.clone(),
                });
            }
        }
        Ok(())
    }

    async fn revoke_grant(
        &self,
        _workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
    ) -> Result<(), ApiError> {
        self.log.push(format!("dbx.revoke {} {} {}", object.kind, object.name, principal));
        if let Some(entries) = self.grants.lock().unwrap().get_mut(&object.id) {
            entries.retain(|g| &g.principal != principal);
        }
        Ok(())
    }
}

// --- GIT ---

pub struct FakeGitBinder {
    log: CallLog,
    pub reject: Mutex<bool>,
    bound: Mutex<HashMap<String, String>>,
}

impl FakeGitBinder {
    pub fn new(log: CallLog) -> Self {
        Self {
            log,
            reject: Mutex::new(false),
            bound: Mutex::new(HashMap::new()),
        }
    }

    pub fn credential_of(&self, host: &str) -> Option<String> {
        self.bound.lock().unwrap().get(host).cloned()
    }
}

#[async_trait]
impl GitBinder for FakeGitBinder {
    async fn bind_repo(
        &self,
        workspace: &WorkspaceHandle,
        provider: GitProvider,
        credentials: &GitCredentials,
    ) -> Result<String, ApiError> {
        self.log.push(format!("git.bind {} {} {}", workspace.host(), provider, credentials.username));
        if *self.reject.lock().unwrap() {
            return Err(ApiError::http("databricks", 403, "Invalid Git provider credentials"));
        }
        let mut bound = self.bound.lock().unwrap();
        let next = bound.len() + 1;
        let id = bound
            .entry(workspace.host().to_string())
            .or_insert_with(|| format!("cred-{}", next))
            .clone();
        Ok(id)
    }
}

pub fn gitlab_credentials() -> StaticGitCredentialStore {
    StaticGitCredentialStore::default().with(
        GitProvider::GitLab,
        GitCredentials {
            username: "svc-provisioner".into(),
            token: Secret::new("glpat-test"),
        },
    )
}

// --- WIRING ---

/// Every fake, sharing one call log.
pub struct Harness {
    pub log: CallLog,
    pub workspaces: Arc<FakeWorkspaces>,
    pub role_assignments: Arc<FakeRoleAssignments>,
    pub directory: Arc<FakeDirectory>,
    pub databricks: Arc<FakeDatabricks>,
    pub git: Arc<FakeGitBinder>,
    pub credentials: StaticGitCredentialStore,
}

impl Harness {
    pub fn new() -> Self {
        let log = CallLog::default();
        Self {
            workspaces: Arc::new(FakeWorkspaces::new(log.clone())),
            role_assignments: Arc::new(FakeRoleAssignments::new(log.clone())),
            directory: Arc::new(FakeDirectory::new(log.clone())),
            databricks: Arc::new(FakeDatabricks::new(log.clone())),
            git: Arc::new(FakeGitBinder::new(log.clone())),
            credentials: gitlab_credentials(),
            log,
        }
    }

    pub fn without_git_credentials(mut self) -> Self {
        self.credentials = StaticGitCredentialStore::default();
        self
    }

    pub fn ports(&self) -> EnginePorts {
        EnginePorts {
            workspaces: self.workspaces.clone(),
            role_assignments: self.role_assignments.clone(),
            directory: self.directory.clone(),
            databricks: self.databricks.clone(),
            git: self.git.clone(),
            git_credentials: Arc::new(self.credentials.clone()),
        }
    }
}

/// Sales subscription, PREMIUM, owner role assigned, developer group stripped.
pub fn settings() -> AppSettings {
    let mut settings = AppSettings::default();
    settings.azure.subscription_id = SUBSCRIPTION.into();
    settings.azure.resource_group = RESOURCE_GROUP.into();
    settings.azure.region = "westeurope".into();
    settings.azure.sku = SkuType::Premium;
    settings.azure.permissions.dp_owner_role_definition_id = RoleDefinition::RoleId(OWNER_ROLE.into());
    settings.azure.permissions.dev_group_role_definition_id = RoleDefinition::Strip;
    settings.engine.poll_interval_secs = 1;
    settings.engine.poll_timeout_secs = 5;
    settings
}

pub fn dlt_descriptor(id: &str, workspace: &str) -> RawDescriptor {
    RawDescriptor {
        id: id.into(),
        use_case_template_id: "urn:dmb:utm:databricks-workload-dlt-template:0.1.0".into(),
        kind: None,
        workspace: workspace.into(),
        owner: "user:john.doe_company.com".into(),
        developer_group: "group:sales-devs".into(),
        specific: RawSpecific {
            repo_path: Some("/Repos/sales/ingest".into()),
            git_repo_url: Some("https://gitlab.com/sales/ingest.git".into()),
            pipeline_name: Some("sales-ingest".into()),
            ..RawSpecific::default()
        },
    }
}

pub fn job_descriptor(id: &str, workspace: &str, job: &str) -> RawDescriptor {
    RawDescriptor {
        id: id.into(),
        use_case_template_id: "urn:dmb:utm:databricks-workload-job-template:0.1.0".into(),
        kind: None,
        workspace: workspace.into(),
        owner: "user:john.doe_company.com".into(),
        developer_group: "group:sales-devs".into(),
        specific: RawSpecific {
            job_name: Some(job.into()),
            ..RawSpecific::default()
        },
    }
}

pub fn output_port_descriptor(id: &str, workspace: &str, table: &str) -> RawDescriptor {
    RawDescriptor {
        id: id.into(),
        use_case_template_id: "urn:dmb:utm:databricks-outputport-template".into(),
        kind: None,
        workspace: workspace.into(),
        owner: "user:john.doe_company.com".into(),
        developer_group: "sales-devs".into(),
        specific: RawSpecific {
            table: Some(table.into()),
            ..RawSpecific::default()
        },
    }
}

pub fn owner() -> Principal {
    Principal::User("john.doe@company.com".into())
}

pub fn developers() -> Principal {
    Principal::Group("sales-devs".into())
}

pub fn workspace_scope(name: &str) -> String {
    AzureResourceId::workspace(SUBSCRIPTION, RESOURCE_GROUP, name).to_string()
}
