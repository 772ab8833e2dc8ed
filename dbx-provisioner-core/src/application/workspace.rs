// dbx-provisioner-core/src/application/workspace.rs

use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, instrument, warn};

use crate::domain::descriptor::{ComponentDescriptor, WorkspaceTarget};
use crate::domain::error::{ApiError, ProvisionError};
use crate::domain::workspace::{AzureResourceId, AzureWorkspace, ProvisioningState, SkuType, WorkspaceHandle};
use crate::infrastructure::config::AppSettings;
use crate::ports::{WorkspaceApi, WorkspaceCreateRequest};

/// Where managed workspaces are created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureCoordinates {
    pub subscription_id: String,
    pub resource_group: String,
    pub region: String,
    pub sku: SkuType,
}

impl AzureCoordinates {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            subscription_id: settings.azure.subscription_id.clone(),
            resource_group: settings.azure.resource_group.clone(),
            region: settings.azure.region.clone(),
            sku: settings.azure.sku,
        }
    }

    pub fn resource_id(&self, name: &str) -> AzureResourceId {
        AzureResourceId::workspace(&self.subscription_id, &self.resource_group, name)
    }

    /// Azure requires a dedicated managed resource group per workspace.
    pub fn managed_resource_group_id(&self, name: &str) -> String {
        format!(
            "/subscriptions/{}/resourceGroups/{}-rg",
            self.subscription_id, name
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSettings {
    pub interval: Duration,
    pub timeout: Duration,
}

impl PollSettings {
    pub fn from_settings(settings: &AppSettings) -> Self {
        Self {
            interval: settings.engine.poll_interval(),
            timeout: settings.engine.poll_timeout(),
        }
    }
}

pub struct WorkspaceLifecycleManager {
    api: Arc<dyn WorkspaceApi>,
    coordinates: AzureCoordinates,
    poll: PollSettings,
}

impl WorkspaceLifecycleManager {
    pub fn new(api: Arc<dyn WorkspaceApi>, coordinates: AzureCoordinates, poll: PollSettings) -> Self {
        Self {
            api,
            coordinates,
            poll,
        }
    }

    /// Key serialising requests against the same workspace: its ARM resource
    /// id, whether the descriptor names the workspace or gives its URL.
    ///
    /// A URL that resolves to nothing keeps a `url:` key; there is no
    /// workspace to collide on yet.
    pub async fn lock_key(&self, target: &WorkspaceTarget) -> Result<String, ApiError> {
        match target {
            WorkspaceTarget::Create { name } => Ok(self.coordinates.resource_id(name).lock_key()),
            WorkspaceTarget::Existing { host, .. } => Ok(match self.api.find_workspace_by_host(host).await? {
                Some(found) => found.resource_id.lock_key(),
                None => format!("url:{}", host.to_lowercase()),
            }),
        }
    }

    /// Makes sure the target workspace exists and is ready.
    ///
    /// Existing targets are looked up, never created. Managed targets are
    /// created with the configured SKU when absent; a present workspace with
    /// another SKU is left alone and reported.
    #[instrument(skip(self, descriptor), fields(component = %descriptor.component_id, workspace = descriptor.workspace.display_name()))]
    pub async fn ensure_workspace(&self, descriptor: &ComponentDescriptor) -> Result<WorkspaceHandle, ProvisionError> {
        match &descriptor.workspace {
            WorkspaceTarget::Existing { host, .. } => {
                let found = self
                    .api
                    .find_workspace_by_host(host)
                    .await?
                    .ok_or_else(|| ProvisionError::WorkspaceNotFound(host.clone()))?;
                info!(resource_id = %found.resource_id, "🔎 Existing workspace located");
                Ok(WorkspaceHandle::unmanaged(found))
            }
            WorkspaceTarget::Create { name } => self.ensure_managed(name).await.map(WorkspaceHandle::managed),
        }
    }

    async fn ensure_managed(&self, name: &str) -> Result<AzureWorkspace, ProvisionError> {
        let id = self.coordinates.resource_id(name);
        let requested = self.coordinates.sku;

        let current = match self.api.get_workspace(&id).await? {
            // Checked first: re-issuing the create of a dead workspace must not change its SKU.
            Some(ws) if ws.sku != requested => {
                return Err(ProvisionError::SpecConflict {
                    name: name.to_string(),
                    requested,
                    found: ws.sku,
                });
            }
            Some(ws) if is_dead(&ws.state) => {
                warn!(state = %ws.state, "Workspace left in a failed state, re-issuing the create");
                self.create(name, &id).await?
            }
            Some(ws) => {
                info!(state = %ws.state, sku = %ws.sku, "♻️  Workspace already exists");
                ws
            }
            None => self.create(name, &id).await?,
        };

        if current.state.is_succeeded() {
            return Ok(current);
        }
        self.wait_until_ready(name, &id).await
    }

    async fn create(&self, name: &str, id: &AzureResourceId) -> Result<AzureWorkspace, ProvisionError> {
        let request = WorkspaceCreateRequest {
            resource_id: id.clone(),
            location: self.coordinates.region.clone(),
            sku: self.coordinates.sku,
            managed_resource_group_id: self.coordinates.managed_resource_group_id(name),
        };
        info!(sku = %request.sku, location = %request.location, "🏗️  Creating workspace");
        Ok(self.api.create_workspace(&request).await?)
    }

    async fn wait_until_ready(&self, name: &str, id: &AzureResourceId) -> Result<AzureWorkspace, ProvisionError> {
        let started = Instant::now();
        loop {
            let ws = self
                .api
                .get_workspace(id)
                .await?
                .ok_or_else(|| ProvisionError::WorkspaceCreateFailed {
                    name: name.to_string(),
                    reason: "workspace disappeared while provisioning".into(),
                })?;

            if ws.state.is_succeeded() {
                info!(elapsed = ?started.elapsed(), host = %ws.host, "✅ Workspace ready");
                return Ok(ws);
            }
            if ws.state.is_terminal() {
                return Err(ProvisionError::WorkspaceCreateFailed {
                    name: name.to_string(),
                    reason: format!("provisioning state is {}", ws.state),
                });
            }
            if started.elapsed() >= self.poll.timeout {
                return Err(ProvisionError::WorkspaceCreateFailed {
                    name: name.to_string(),
                    reason: format!(
                        "still {} after {}s",
                        ws.state,
                        self.poll.timeout.as_secs()
                    ),
                });
            }
            info!(state = %ws.state, "⏳ Workspace is being provisioned, waiting");
            tokio::time::sleep(self.poll.interval).await;
        }
    }

    /// Looks the target up without creating anything.
    pub async fn locate_workspace(&self, target: &WorkspaceTarget) -> Result<Option<WorkspaceHandle>, ApiError> {
        Ok(match target {
            WorkspaceTarget::Existing { host, .. } => self
                .api
                .find_workspace_by_host(host)
                .await?
                .map(WorkspaceHandle::unmanaged),
            WorkspaceTarget::Create { name } => self
                .api
                .get_workspace(&self.coordinates.resource_id(name))
                .await?
                .map(WorkspaceHandle::managed),
        })
    }

    /// Deletes a managed workspace. Returns `false`, and does nothing, for an
    /// unmanaged one.
    #[instrument(skip(self, handle), fields(workspace = handle.name()))]
    pub async fn delete_workspace(&self, handle: &WorkspaceHandle) -> Result<bool, ApiError> {
        if !handle.is_managed() {
            warn!("🛡️  Workspace is not managed by the provisioner, keeping it");
            return Ok(false);
        }
        self.api.delete_workspace(handle.resource_id()).await?;
        info!("🗑️  Workspace deletion requested");
        Ok(true)
    }
}

fn is_dead(state: &ProvisioningState) -> bool {
    matches!(
        state,
        ProvisioningState::Failed | ProvisioningState::Canceled | ProvisioningState::Deleted
    )
}
