// dbx-provisioner-core/src/ports/azure.rs

// Azure Resource Manager capabilities, authorised with the ARM credentials.

use async_trait::async_trait;

use crate::domain::error::ApiError;
use crate::domain::permission::RoleAssignment;
use crate::domain::workspace::{AzureResourceId, AzureWorkspace, SkuType};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceCreateRequest {
    pub resource_id: AzureResourceId,
    pub location: String,
    pub sku: SkuType,
    pub managed_resource_group_id: String,
}

#[async_trait]
pub trait WorkspaceApi: Send + Sync {
    /// `Ok(None)` when the resource does not exist.
    async fn get_workspace(&self, id: &AzureResourceId) -> Result<Option<AzureWorkspace>, ApiError>;

    /// Reverse lookup of a per-workspace URL host (`adb-<id>.<n>.azuredatabricks.net`).
    async fn find_workspace_by_host(&self, host: &str) -> Result<Option<AzureWorkspace>, ApiError>;

    /// PUT the workspace. Returns the state reported right after the call,
    /// which is usually not terminal yet.
    async fn create_workspace(&self, request: &WorkspaceCreateRequest) -> Result<AzureWorkspace, ApiError>;

    async fn delete_workspace(&self, id: &AzureResourceId) -> Result<(), ApiError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignmentRequest {
    /// Assignment name (a GUID). Reusing the same name makes a retried PUT a no-op.
    pub name: String,
    pub scope: String,
    pub role_definition_id: String,
    pub principal_id: String,
    pub principal_is_group: bool,
}

#[async_trait]
pub trait RoleAssignmentApi: Send + Sync {
    /// Assignments of `principal_id` visible at `scope`, inherited ones included.
    async fn list_for_principal(
        &self,
        scope: &str,
        principal_id: &str,
    ) -> Result<Vec<RoleAssignment>, ApiError>;

    async fn create(&self, request: &RoleAssignmentRequest) -> Result<(), ApiError>;

    async fn delete(&self, assignment_id: &str) -> Result<(), ApiError>;
}
