// dbx-provisioner-core/src/application/pipeline.rs

use chrono::Utc;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument, warn};

use crate::application::git::GitLinkageManager;
use crate::application::locks::WorkspaceLocks;
use crate::application::permissions::{AclUpdate, PermissionReconciler};
use crate::application::resolver::DescriptorResolver;
use crate::application::unprovision::{UnprovisionCoordinator, UnprovisionOptions, UnprovisionResult};
use crate::application::workspace::{AzureCoordinates, PollSettings, WorkspaceLifecycleManager};
use crate::domain::descriptor::{ComponentDescriptor, ComponentKind, Principal, RawDescriptor};
use crate::domain::error::{PermissionError, ProvisionError};
use crate::domain::git::GitLinkage;
use crate::domain::lifecycle::{LifecycleState, ProvisionRecord, Stage, StageReport};
use crate::domain::permission::{PermissionAssignment, PermissionMatrix};
use crate::domain::plan::desired_assignments;
use crate::domain::workspace::WorkspaceHandle;
use crate::error::ProvisionerError;
use crate::infrastructure::adapters::live_ports;
use crate::infrastructure::config::AppSettings;
use crate::infrastructure::credentials::Credentials;
use crate::ports::EnginePorts;

// --- OPTIONS ---

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub git_provider: String,
    pub matrix: PermissionMatrix,
    pub concurrency: usize,
}

impl EngineOptions {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            git_provider: settings.git.provider.clone(),
            matrix: settings.databricks.permissions.clone(),
            concurrency: settings.engine.concurrency.max(1),
        }
    }
}

// --- OUTCOMES ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: Stage,
    pub message: String,
    pub retriable: bool,
}

#[derive(Debug, Clone)]
pub struct ProvisionRequest {
    pub raw: RawDescriptor,
    /// Last recorded run of the same component, if any.
    pub previous: Option<ProvisionRecord>,
}

impl ProvisionRequest {
    pub fn new(raw: RawDescriptor) -> Self {
        Self { raw, previous: None }
    }

    pub fn resuming(mut self, previous: Option<ProvisionRecord>) -> Self {
        self.previous = previous;
        self
    }
}

/// What a provisioning run did, including how far it got when it failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionOutcome {
    pub component_id: String,
    /// Empty when the descriptor could not be resolved.
    pub fingerprint: String,
    pub state: LifecycleState,
    pub workspace: Option<WorkspaceHandle>,
    pub assignments: Vec<PermissionAssignment>,
    pub git: Option<GitLinkage>,
    pub stages: Vec<StageReport>,
    pub failure: Option<StageFailure>,
}

impl ProvisionOutcome {
    fn new(component_id: &str) -> Self {
        Self {
            component_id: component_id.trim().to_string(),
            fingerprint: String::new(),
            state: LifecycleState::Requested,
            workspace: None,
            assignments: Vec::new(),
            git: None,
            stages: Vec::new(),
            failure: None,
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == LifecycleState::Completed
    }

    pub fn record(&self) -> ProvisionRecord {
        ProvisionRecord {
            component_id: self.component_id.clone(),
            fingerprint: self.fingerprint.clone(),
            state: self.state.clone(),
            workspace: self.workspace.clone(),
            git: self.git.clone(),
            stages: self.stages.clone(),
            updated_at: Utc::now(),
        }
    }

    fn advance(&mut self, stage: Stage, next: LifecycleState) -> Result<(), StageFailure> {
        let state = self.state.clone().transition(next).map_err(|e| StageFailure {
            stage,
            message: e.to_string(),
            retriable: false,
        })?;
        self.state = state;
        Ok(())
    }

    fn fail(&mut self, failure: StageFailure) {
        match self.state.clone().transition(LifecycleState::Failed(failure.stage)) {
            Ok(state) => self.state = state,
            Err(e) => error!(error = %e, "Run could not be marked as failed"),
        }
        self.stages
            .push(StageReport::failed(failure.stage, failure.message.clone()));
        self.failure = Some(failure);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnprovisionOutcome {
    pub component_id: String,
    pub fingerprint: String,
    pub state: LifecycleState,
    pub workspace: Option<WorkspaceHandle>,
    pub result: Option<UnprovisionResult>,
    pub stages: Vec<StageReport>,
    pub failure: Option<StageFailure>,
}

impl UnprovisionOutcome {
    fn settle(&mut self, next: LifecycleState) {
        match self.state.clone().transition(next) {
            Ok(state) => self.state = state,
            Err(e) => error!(error = %e, "Unexpected lifecycle transition"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.state == LifecycleState::Unprovisioned
    }

    pub fn record(&self) -> ProvisionRecord {
        ProvisionRecord {
            component_id: self.component_id.clone(),
            fingerprint: self.fingerprint.clone(),
            state: self.state.clone(),
            workspace: self.workspace.clone(),
            git: None,
            stages: self.stages.clone(),
            updated_at: Utc::now(),
        }
    }
}

// --- ENGINE ---

/// Runs the provisioning pipeline: resolve, workspace, permissions, git.
///
/// Requests against the same workspace are serialised; different workspaces
/// proceed concurrently. A stage failure stops the run where it is, nothing
/// is rolled back, and a re-run of the same descriptor picks up from there.
pub struct ProvisioningEngine {
    resolver: DescriptorResolver,
    workspaces: Arc<WorkspaceLifecycleManager>,
    permissions: PermissionReconciler,
    git: GitLinkageManager,
    unprovisioner: UnprovisionCoordinator,
    locks: WorkspaceLocks,
    options: EngineOptions,
}

impl ProvisioningEngine {
    pub fn new(ports: EnginePorts, settings: &AppSettings) -> Self {
        let workspaces = Arc::new(WorkspaceLifecycleManager::new(
            ports.workspaces.clone(),
            AzureCoordinates::from_settings(settings),
            PollSettings::from_settings(settings),
        ));
        let roles = settings.azure.permissions.clone();
        Self {
            resolver: DescriptorResolver::new(settings.use_case_template_ids.clone()),
            permissions: PermissionReconciler::new(
                ports.databricks.clone(),
                ports.role_assignments.clone(),
                ports.directory.clone(),
                roles.clone(),
            ),
            git: GitLinkageManager::new(ports.git.clone(), ports.git_credentials.clone()),
            unprovisioner: UnprovisionCoordinator::new(
                ports.databricks,
                ports.role_assignments,
                ports.directory,
                workspaces.clone(),
                roles,
            ),
            workspaces,
            locks: WorkspaceLocks::new(),
            options: EngineOptions::from_settings(settings),
        }
    }

    /// Live engine: credentials from the environment, HTTP adapters.
    pub fn connect(settings: &AppSettings) -> Result<Self, ProvisionerError> {
        settings.validate_for_provisioning()?;
        let credentials = Credentials::from_env(settings.git_provider()?)?;
        let ports = live_ports(settings, &credentials)?;
        Ok(Self::new(ports, settings))
    }

    /// Never fails as a whole: the outcome says how far the run went.
    #[instrument(skip_all, fields(component = %request.raw.id))]
    pub async fn provision(&self, request: ProvisionRequest) -> ProvisionOutcome {
        let start = Instant::now();
        let mut outcome = ProvisionOutcome::new(&request.raw.id);

        if let Err(failure) = self.run_stages(&mut outcome, &request).await {
            warn!(stage = %failure.stage, retriable = failure.retriable, error = %failure.message, "❌ Provisioning stopped");
            outcome.fail(failure);
        } else {
            info!(duration = ?start.elapsed(), "🏁 Component provisioned");
        }
        outcome
    }

    async fn run_stages(&self, outcome: &mut ProvisionOutcome, request: &ProvisionRequest) -> Result<(), StageFailure> {
        // 1. Resolve
        let descriptor = self.resolver.resolve(&request.raw).map_err(|e| StageFailure {
            stage: Stage::Resolve,
            message: e.to_string(),
            retriable: false,
        })?;
        outcome.component_id = descriptor.component_id.clone();
        outcome.fingerprint = descriptor.fingerprint();
        outcome.advance(Stage::Resolve, LifecycleState::Resolved)?;
        outcome.stages.push(StageReport::succeeded(
            Stage::Resolve,
            format!("{} with {} resource(s)", descriptor.kind, descriptor.resources.len()),
        ));

        let previous = request
            .previous
            .as_ref()
            .filter(|p| p.component_id == descriptor.component_id);
        let resumable = previous
            .map(|p| p.resumable_stages(&outcome.fingerprint))
            .unwrap_or(&[]);
        if !resumable.is_empty() {
            info!(from = ?previous.map(|p| &p.state), "⏯️  Resuming previous run");
        }

        let recorded = previous
            .and_then(|p| p.workspace.clone())
            .filter(|_| resumable.contains(&Stage::Workspace));
        let key = match &recorded {
            Some(handle) => handle.resource_id().lock_key(),
            None => self
                .workspaces
                .lock_key(&descriptor.workspace)
                .await
                .map_err(|e| StageFailure {
                    stage: Stage::Workspace,
                    retriable: e.is_transient(),
                    message: e.to_string(),
                })?,
        };
        let _guard = self.locks.acquire(&key).await;

        // 2. Workspace
        let handle = match recorded {
            Some(handle) => {
                outcome.stages.push(StageReport::skipped(Stage::Workspace, handle.url()));
                handle
            }
            None => {
                let handle = self
                    .workspaces
                    .ensure_workspace(&descriptor)
                    .await
                    .map_err(|e| StageFailure {
                        stage: Stage::Workspace,
                        retriable: e.is_retriable(),
                        message: e.to_string(),
                    })?;
                let origin = if handle.is_managed() { "managed" } else { "existing" };
                outcome.stages.push(StageReport::succeeded(
                    Stage::Workspace,
                    format!("{} ({})", handle.url(), origin),
                ));
                handle
            }
        };
        outcome.workspace = Some(handle.clone());
        outcome.advance(Stage::Workspace, LifecycleState::WorkspaceReady)?;

        // 3. Permissions
        if resumable.contains(&Stage::Permissions) {
            outcome.assignments = desired_assignments(&descriptor, &self.options.matrix);
            outcome
                .stages
                .push(StageReport::skipped(Stage::Permissions, "converged by previous run"));
        } else {
            match self.permissions.reconcile(&handle, &descriptor, &self.options.matrix).await {
                Ok(applied) => {
                    outcome.stages.push(StageReport::succeeded(
                        Stage::Permissions,
                        format!("{} assignment(s)", applied.len()),
                    ));
                    outcome.assignments = applied;
                }
                Err(e) => {
                    if let PermissionError::Partial { applied, .. } = &e {
                        outcome.assignments = applied.clone();
                    }
                    return Err(StageFailure {
                        stage: Stage::Permissions,
                        retriable: e.is_retriable(),
                        message: format!("{}: {}", e, e.failures().join("; ")),
                    });
                }
            }
        }
        outcome.advance(Stage::Permissions, LifecycleState::PermissionsApplied)?;

        // 4. Git
        self.link_git(outcome, &descriptor, &handle).await?;
        outcome.advance(Stage::Git, LifecycleState::GitLinked)?;
        outcome.advance(Stage::Git, LifecycleState::Completed)?;
        Ok(())
    }

    async fn link_git(
        &self,
        outcome: &mut ProvisionOutcome,
        descriptor: &ComponentDescriptor,
        handle: &WorkspaceHandle,
    ) -> Result<(), StageFailure> {
        if descriptor.kind == ComponentKind::OutputPort {
            outcome
                .stages
                .push(StageReport::skipped(Stage::Git, "output ports have no repository"));
            return Ok(());
        }
        let linkage = self
            .git
            .link_git(handle, &self.options.git_provider)
            .await
            .map_err(|e| StageFailure {
                stage: Stage::Git,
                retriable: e.is_retriable(),
                message: e.to_string(),
            })?;
        outcome.stages.push(StageReport::succeeded(
            Stage::Git,
            format!("{} credential {}", linkage.provider, linkage.credential_id),
        ));
        outcome.git = Some(linkage);
        Ok(())
    }

    /// Provisions every request, at most `concurrency` at a time. Outcomes
    /// come back in completion order.
    pub async fn provision_many(&self, requests: Vec<ProvisionRequest>) -> Vec<ProvisionOutcome> {
        info!(count = requests.len(), concurrency = self.options.concurrency, "🚀 Provisioning components");
        let outcomes: Vec<ProvisionOutcome> = futures::stream::iter(requests.into_iter().map(|request| self.provision(request)))
            .buffer_unordered(self.options.concurrency)
            .collect()
            .await;
        self.locks.prune();
        outcomes
    }

    /// Tears a component down. Unmanaged workspaces keep their workspace and
    /// RBAC whatever the options say.
    #[instrument(skip_all, fields(component = %raw.id))]
    pub async fn unprovision(
        &self,
        raw: &RawDescriptor,
        previous: Option<&ProvisionRecord>,
        options: UnprovisionOptions,
    ) -> UnprovisionOutcome {
        let mut outcome = UnprovisionOutcome {
            component_id: raw.id.trim().to_string(),
            fingerprint: String::new(),
            // Nothing recorded: the component was provisioned out of band.
            state: previous.map(|p| p.state.clone()).unwrap_or(LifecycleState::Completed),
            workspace: previous.and_then(|p| p.workspace.clone()),
            result: None,
            stages: Vec::new(),
            failure: None,
        };

        if outcome.state == LifecycleState::Unprovisioned {
            outcome
                .stages
                .push(StageReport::skipped(Stage::Unprovision, "already unprovisioned"));
            return outcome;
        }

        let fail = |outcome: &mut UnprovisionOutcome, stage: Stage, message: String, retriable: bool| {
            outcome.stages.push(StageReport::failed(stage, message.clone()));
            outcome.failure = Some(StageFailure {
                stage,
                message,
                retriable,
            });
        };

        let descriptor = match self.resolver.resolve(raw) {
            Ok(d) => d,
            Err(e) => {
                fail(&mut outcome, Stage::Resolve, e.to_string(), false);
                return outcome;
            }
        };
        outcome.component_id = descriptor.component_id.clone();
        outcome.fingerprint = descriptor.fingerprint();

        match outcome.state.clone().transition(LifecycleState::Unprovisioning) {
            Ok(state) => outcome.state = state,
            Err(e) => {
                fail(&mut outcome, Stage::Unprovision, e.to_string(), false);
                return outcome;
            }
        }

        let key = match self.workspaces.lock_key(&descriptor.workspace).await {
            Ok(key) => key,
            Err(e) => {
                outcome.settle(LifecycleState::Failed(Stage::Unprovision));
                fail(&mut outcome, Stage::Unprovision, e.to_string(), e.is_transient());
                return outcome;
            }
        };
        let _guard = self.locks.acquire(&key).await;

        let handle = match self.workspaces.locate_workspace(&descriptor.workspace).await {
            Ok(Some(handle)) => handle,
            Ok(None) => {
                outcome
                    .stages
                    .push(StageReport::skipped(Stage::Unprovision, "workspace not found, nothing left"));
                outcome.settle(LifecycleState::Unprovisioned);
                return outcome;
            }
            Err(e) => {
                outcome.settle(LifecycleState::Failed(Stage::Unprovision));
                fail(&mut outcome, Stage::Unprovision, e.to_string(), e.is_transient());
                return outcome;
            }
        };
        outcome.workspace = Some(handle.clone());

        match self.unprovisioner.unprovision(&handle, &descriptor, options).await {
            Ok(result) => {
                outcome.stages.push(StageReport::succeeded(
                    Stage::Unprovision,
                    format!(
                        "{} grant(s) revoked, {} object(s) deleted, {} role assignment(s) removed{}",
                        result.revoked.len(),
                        result.deleted_objects.len(),
                        result.removed_role_assignments,
                        if result.workspace_deleted { ", workspace deleted" } else { "" }
                    ),
                ));
                outcome.result = Some(result);
                outcome.settle(LifecycleState::Unprovisioned);
                info!("🧹 Component unprovisioned");
            }
            Err(e) => {
                warn!(error = %e, "❌ Unprovisioning stopped");
                outcome.settle(LifecycleState::Failed(Stage::Unprovision));
                fail(&mut outcome, Stage::Unprovision, e.to_string(), e.is_retriable());
            }
        }
        outcome
    }

    /// Replaces the consumer list of a provisioned output port. The workspace
    /// must already exist; nothing is created.
    #[instrument(skip_all, fields(component = %raw.id, consumers = consumers.len()))]
    pub async fn update_acl(&self, raw: &RawDescriptor, consumers: &[String]) -> Result<AclUpdate, ProvisionerError> {
        let descriptor = self.resolver.resolve(raw)?;
        let consumers = consumers
            .iter()
            .map(|c| Principal::parse(c))
            .collect::<Result<Vec<_>, _>>()?;

        let key = self
            .workspaces
            .lock_key(&descriptor.workspace)
            .await
            .map_err(ProvisionError::Api)?;
        let _guard = self.locks.acquire(&key).await;

        let handle = self
            .workspaces
            .locate_workspace(&descriptor.workspace)
            .await
            .map_err(ProvisionError::Api)?
            .ok_or_else(|| ProvisionError::WorkspaceNotFound(descriptor.workspace.display_name().to_string()))?;

        let update = self.permissions.update_acl(&handle, &descriptor, &consumers).await?;
        info!(
            granted = update.granted.len(),
            revoked = update.revoked.len(),
            kept = update.kept.len(),
            "🔐 Consumer ACL updated"
        );
        Ok(update)
    }
}
