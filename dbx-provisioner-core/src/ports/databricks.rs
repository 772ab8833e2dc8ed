// dbx-provisioner-core/src/ports/databricks.rs

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::descriptor::{Principal, ResourceSpec};
use crate::domain::error::ApiError;
use crate::domain::permission::{Grant, PermissionLevel, ResourceKind};
use crate::domain::workspace::WorkspaceHandle;

/// A Databricks object located by its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub kind: ResourceKind,
    /// Backend id: repo id, job id, pipeline id, or the table full name.
    pub id: String,
    pub name: String,
}

/// Workspace-scoped Databricks capabilities.
#[async_trait]
pub trait DatabricksApi: Send + Sync {
    /// Create-or-get by natural key. Calling it twice yields the same object.
    async fn ensure_object(
        &self,
        workspace: &WorkspaceHandle,
        spec: &ResourceSpec,
    ) -> Result<ObjectRef, ApiError>;

    async fn find_object(
        &self,
        workspace: &WorkspaceHandle,
        spec: &ResourceSpec,
    ) -> Result<Option<ObjectRef>, ApiError>;

    async fn delete_object(&self, workspace: &WorkspaceHandle, object: &ObjectRef) -> Result<(), ApiError>;

    /// Direct grants only; inherited entries are filtered out.
    async fn list_grants(&self, workspace: &WorkspaceHandle, object: &ObjectRef) -> Result<Vec<Grant>, ApiError>;

    /// Leaves `principal` with exactly `level` on the object.
    async fn set_grant(
        &self,
        workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
        level: &PermissionLevel,
    ) -> Result<(), ApiError>;

    /// Unity Catalog only: adds and removes the listed privileges of
    /// `principal`, leaving its other privileges untouched.
    async fn update_privileges(
        &self,
        workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
        add: &[PermissionLevel],
        remove: &[PermissionLevel],
    ) -> Result<(), ApiError>;

    async fn revoke_grant(
        &self,
        workspace: &WorkspaceHandle,
        object: &ObjectRef,
        principal: &Principal,
    ) -> Result<(), ApiError>;
}
