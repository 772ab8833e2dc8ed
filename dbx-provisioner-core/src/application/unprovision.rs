// dbx-provisioner-core/src/application/unprovision.rs

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::application::permissions::{principal_object_id, role_bindings};
use crate::application::workspace::WorkspaceLifecycleManager;
use crate::domain::descriptor::ComponentDescriptor;
use crate::domain::error::UnprovisionError;
use crate::domain::permission::{ResourceKind, RoleDefinition};
use crate::domain::plan::{RbacOp, plan_revocations, plan_role_unbinding};
use crate::domain::workspace::WorkspaceHandle;
use crate::infrastructure::config::AzureRoleSettings;
use crate::ports::{DatabricksApi, ObjectRef, PrincipalDirectory, RoleAssignmentApi};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprovisionOptions {
    /// Also delete the Git repo checkout.
    pub remove_data: bool,
    /// Delete the workspace itself. Ignored for unmanaged workspaces.
    pub delete_workspace: bool,
}

impl Default for UnprovisionOptions {
    fn default() -> Self {
        Self {
            remove_data: false,
            delete_workspace: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnprovisionResult {
    /// `kind 'name': principal` for every revoked ACL entry.
    pub revoked: Vec<String>,
    pub deleted_objects: Vec<ObjectRef>,
    pub removed_role_assignments: usize,
    pub workspace_deleted: bool,
}

/// Tears a component down in reverse order: grants, objects, RBAC, workspace.
/// Stops at the first failure; everything done so far stays done.
pub struct UnprovisionCoordinator {
    databricks: Arc<dyn DatabricksApi>,
    role_assignments: Arc<dyn RoleAssignmentApi>,
    directory: Arc<dyn PrincipalDirectory>,
    workspaces: Arc<WorkspaceLifecycleManager>,
    roles: AzureRoleSettings,
}

impl UnprovisionCoordinator {
    pub fn new(
        databricks: Arc<dyn DatabricksApi>,
        role_assignments: Arc<dyn RoleAssignmentApi>,
        directory: Arc<dyn PrincipalDirectory>,
        workspaces: Arc<WorkspaceLifecycleManager>,
        roles: AzureRoleSettings,
    ) -> Self {
        Self {
            databricks,
            role_assignments,
            directory,
            workspaces,
            roles,
        }
    }

    #[instrument(skip_all, fields(component = %descriptor.component_id, workspace = handle.name(), managed = handle.is_managed()))]
    pub async fn unprovision(
        &self,
        handle: &WorkspaceHandle,
        descriptor: &ComponentDescriptor,
        options: UnprovisionOptions,
    ) -> Result<UnprovisionResult, UnprovisionError> {
        let mut result = UnprovisionResult::default();
        let ours = [descriptor.owner.clone(), descriptor.developers.clone()];

        // 1. ACL entries granted by the provisioner
        let mut found: Vec<ObjectRef> = Vec::new();
        for spec in &descriptor.resources {
            let Some(object) = self.databricks.find_object(handle, spec).await? else {
                info!(kind = %spec.kind(), name = spec.name(), "Already gone");
                continue;
            };
            let current = self.databricks.list_grants(handle, &object).await?;
            for principal in plan_revocations(&ours, &current) {
                self.databricks
                    .revoke_grant(handle, &object, &principal)
                    .await
                    .map_err(|source| UnprovisionError::Revoke {
                        kind: object.kind,
                        name: object.name.clone(),
                        source,
                    })?;
                result
                    .revoked
                    .push(format!("{} '{}': {}", object.kind, object.name, principal));
            }
            found.push(object);
        }

        // 2. Objects
        for object in found {
            let delete = match object.kind {
                ResourceKind::Job | ResourceKind::Pipeline => true,
                ResourceKind::Repo => options.remove_data,
                ResourceKind::OutputPort => false,
            };
            if !delete {
                continue;
            }
            self.databricks
                .delete_object(handle, &object)
                .await
                .map_err(|source| UnprovisionError::DeleteObject {
                    kind: object.kind,
                    name: object.name.clone(),
                    source,
                })?;
            info!(kind = %object.kind, name = %object.name, "🗑️  Deleted");
            result.deleted_objects.push(object);
        }

        if !handle.is_managed() {
            warn!("🛡️  Unmanaged workspace: RBAC and workspace left untouched");
            return Ok(result);
        }

        // 3. RBAC bindings assigned by the provisioner
        let scope = handle.resource_id().to_string();
        for (principal, definition) in role_bindings(descriptor, &self.roles) {
            let role_error = |reason: String| UnprovisionError::RoleAssignment {
                principal: principal.to_string(),
                reason,
            };
            // Strip and Unset assigned nothing.
            if !matches!(definition, RoleDefinition::RoleId(_)) {
                continue;
            }
            let principal_id = match principal_object_id(self.directory.as_ref(), principal).await {
                Ok(id) => id,
                Err(reason) => {
                    warn!(%principal, %reason, "Skipping role removal");
                    continue;
                }
            };
            let existing = self
                .role_assignments
                .list_for_principal(&scope, &principal_id)
                .await
                .map_err(|e| role_error(e.to_string()))?;
            for op in plan_role_unbinding(definition, &scope, &existing) {
                if let RbacOp::Remove { assignment_id } = op {
                    self.role_assignments
                        .delete(&assignment_id)
                        .await
                        .map_err(|e| role_error(e.to_string()))?;
                    result.removed_role_assignments += 1;
                }
            }
        }

        // 4. Workspace
        if options.delete_workspace {
            result.workspace_deleted = self
                .workspaces
                .delete_workspace(handle)
                .await
                .map_err(|source| UnprovisionError::DeleteWorkspace {
                    name: handle.name().to_string(),
                    source,
                })?;
        }

        Ok(result)
    }
}
