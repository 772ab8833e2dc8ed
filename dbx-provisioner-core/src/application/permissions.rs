// dbx-provisioner-core/src/application/permissions.rs

use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::descriptor::{ComponentDescriptor, ComponentKind, Principal, ResourceSpec};
use crate::domain::error::{ApiError, PermissionError};
use crate::domain::permission::{
    PermissionAssignment, PermissionLevel, PermissionMatrix, ResourceKind, RoleDefinition,
    RoleDefinitionBinding,
};
use crate::domain::plan::{
    GrantMode, RbacOp, desired_assignments, desired_grants, plan_grants, plan_role_binding,
};
use crate::domain::workspace::WorkspaceHandle;
use crate::infrastructure::config::AzureRoleSettings;
use crate::ports::{DatabricksApi, PrincipalDirectory, RoleAssignmentApi, RoleAssignmentRequest};

/// Deterministic assignment name: the same binding always PUTs the same GUID.
pub fn assignment_name(scope: &str, principal_id: &str, role_definition_id: &str) -> String {
    let key = format!(
        "{}|{}|{}",
        scope.to_lowercase(),
        principal_id.to_lowercase(),
        role_definition_id.to_lowercase()
    );
    Uuid::new_v5(&Uuid::NAMESPACE_URL, key.as_bytes()).to_string()
}

/// (principal, configured role definition) pairs of a component.
pub(crate) fn role_bindings<'a>(
    descriptor: &'a ComponentDescriptor,
    roles: &'a AzureRoleSettings,
) -> [(&'a Principal, &'a RoleDefinition); 2] {
    [
        (&descriptor.owner, &roles.dp_owner_role_definition_id),
        (&descriptor.developers, &roles.dev_group_role_definition_id),
    ]
}

/// Directory object id of a principal; an unknown principal is an error here.
pub(crate) async fn principal_object_id(
    directory: &dyn PrincipalDirectory,
    principal: &Principal,
) -> Result<String, String> {
    match directory.resolve(principal).await {
        Ok(Some(id)) => Ok(id),
        Ok(None) => Err(format!("{} not found in the directory", principal)),
        Err(e) => Err(format!("directory lookup of {} failed: {}", principal, e)),
    }
}

/// Privilege read by output port consumers.
pub const CONSUMER_PRIVILEGE: &str = "SELECT";

/// What an ACL update did to an output port table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AclUpdate {
    pub table: String,
    pub granted: Vec<Principal>,
    pub revoked: Vec<Principal>,
    /// Readers outside the consumer list left in place: the component's own
    /// principals, and everyone on a workspace the engine does not own.
    pub kept: Vec<Principal>,
}

pub struct PermissionReconciler {
    databricks: Arc<dyn DatabricksApi>,
    role_assignments: Arc<dyn RoleAssignmentApi>,
    directory: Arc<dyn PrincipalDirectory>,
    roles: AzureRoleSettings,
}

impl PermissionReconciler {
    pub fn new(
        databricks: Arc<dyn DatabricksApi>,
        role_assignments: Arc<dyn RoleAssignmentApi>,
        directory: Arc<dyn PrincipalDirectory>,
        roles: AzureRoleSettings,
    ) -> Self {
        Self {
            databricks,
            role_assignments,
            directory,
            roles,
        }
    }

    /// Converges RBAC (managed workspaces only) and every object ACL of the
    /// component. Failures are collected, never rolled back.
    #[instrument(skip_all, fields(component = %descriptor.component_id, workspace = handle.name(), managed = handle.is_managed()))]
    pub async fn reconcile(
        &self,
        handle: &WorkspaceHandle,
        descriptor: &ComponentDescriptor,
        matrix: &PermissionMatrix,
    ) -> Result<Vec<PermissionAssignment>, PermissionError> {
        let mut failures: Vec<String> = Vec::new();

        if handle.is_managed() {
            for (principal, definition) in role_bindings(descriptor, &self.roles) {
                if let Err(e) = self.apply_binding(handle, principal, definition).await {
                    failures.push(e);
                }
            }
        } else {
            debug!("Unmanaged workspace, RBAC left untouched");
        }

        let mut failed_kinds: BTreeSet<ResourceKind> = BTreeSet::new();
        for spec in &descriptor.resources {
            if let Err(e) = self.converge_object(handle, descriptor, matrix, spec).await {
                failed_kinds.insert(spec.kind());
                failures.extend(e);
            }
        }

        let applied: Vec<PermissionAssignment> = desired_assignments(descriptor, matrix)
            .into_iter()
            .filter(|a| !failed_kinds.contains(&a.kind))
            .collect();

        if failures.is_empty() {
            info!(assignments = applied.len(), "🔐 Permissions converged");
            Ok(applied)
        } else {
            warn!(failures = failures.len(), "Permissions left in a mixed state");
            Err(PermissionError::Partial { applied, failures })
        }
    }

    async fn apply_binding(
        &self,
        handle: &WorkspaceHandle,
        principal: &Principal,
        definition: &RoleDefinition,
    ) -> Result<(), String> {
        if *definition == RoleDefinition::Unset {
            return Ok(());
        }
        let scope = handle.resource_id().to_string();
        let principal_id = principal_object_id(self.directory.as_ref(), principal).await?;
        let binding = RoleDefinitionBinding {
            definition: definition.clone(),
            scope,
            principal_id,
        };

        let existing = self
            .role_assignments
            .list_for_principal(&binding.scope, &binding.principal_id)
            .await
            .map_err(|e| format!("listing role assignments of {}: {}", principal, e))?;

        for op in plan_role_binding(&binding.definition, &binding.scope, &existing) {
            match op {
                RbacOp::Assign { role_definition_id } => {
                    let request = RoleAssignmentRequest {
                        name: assignment_name(&binding.scope, &binding.principal_id, &role_definition_id),
                        scope: binding.scope.clone(),
                        role_definition_id,
                        principal_id: binding.principal_id.clone(),
                        principal_is_group: principal.is_group(),
                    };
                    self.role_assignments
                        .create(&request)
                        .await
                        .map_err(|e| format!("assigning {} to {}: {}", request.role_definition_id, principal, e))?;
                    info!(principal = %principal, role = %request.role_definition_id, "👤 Role assigned");
                }
                RbacOp::Remove { assignment_id } => {
                    self.role_assignments
                        .delete(&assignment_id)
                        .await
                        .map_err(|e| format!("removing {} from {}: {}", assignment_id, principal, e))?;
                    info!(principal = %principal, assignment = %assignment_id, "✂️  Direct role assignment removed");
                }
            }
        }
        Ok(())
    }

    /// Makes `consumers` the readers of the output port table.
    ///
    /// Consumers lacking SELECT get it; other SELECT holders lose it, except
    /// the component's owner and developers. Only SELECT is touched. On an
    /// unmanaged workspace nothing is revoked.
    #[instrument(skip_all, fields(component = %descriptor.component_id, workspace = handle.name(), consumers = consumers.len()))]
    pub async fn update_acl(
        &self,
        handle: &WorkspaceHandle,
        descriptor: &ComponentDescriptor,
        consumers: &[Principal],
    ) -> Result<AclUpdate, PermissionError> {
        if descriptor.kind != ComponentKind::OutputPort {
            return Err(PermissionError::UnsupportedComponent(descriptor.kind));
        }
        let Some(spec) = descriptor
            .resources
            .iter()
            .find(|r| r.kind() == ResourceKind::OutputPort)
        else {
            return Err(PermissionError::UnsupportedComponent(descriptor.kind));
        };
        let partial = |failures: Vec<String>| PermissionError::Partial {
            applied: vec![],
            failures,
        };

        // Every consumer must exist before anything changes.
        let mut unknown = Vec::new();
        for consumer in consumers {
            match self.directory.resolve(consumer).await {
                Ok(Some(_)) => {}
                Ok(None) => unknown.push(consumer.to_string()),
                Err(e) => return Err(partial(vec![format!("directory lookup of {} failed: {}", consumer, e)])),
            }
        }
        if !unknown.is_empty() {
            return Err(PermissionError::UnknownConsumers(unknown));
        }

        let describe = |e: ApiError| format!("{} '{}': {}", spec.kind(), spec.name(), e);
        let object = self
            .databricks
            .ensure_object(handle, spec)
            .await
            .map_err(|e| partial(vec![describe(e)]))?;
        let current = self
            .databricks
            .list_grants(handle, &object)
            .await
            .map_err(|e| partial(vec![describe(e)]))?;

        let select = PermissionLevel::new(CONSUMER_PRIVILEGE);
        let readers: BTreeSet<&Principal> = current
            .iter()
            .filter(|g| g.level == select)
            .map(|g| &g.principal)
            .collect();
        let ours = [&descriptor.owner, &descriptor.developers];

        let mut update = AclUpdate {
            table: object.name.clone(),
            ..AclUpdate::default()
        };
        let mut failures = Vec::new();

        for reader in readers.iter().copied().filter(|r| !consumers.contains(*r)) {
            if ours.contains(&reader) || !handle.is_managed() {
                update.kept.push(reader.clone());
                continue;
            }
            match self
                .databricks
                .update_privileges(handle, &object, reader, &[], std::slice::from_ref(&select))
                .await
            {
                Ok(()) => {
                    info!(principal = %reader, "✂️  Consumer access revoked");
                    update.revoked.push(reader.clone());
                }
                Err(e) => failures.push(describe(e)),
            }
        }

        let mut planned: Vec<&Principal> = Vec::new();
        for consumer in consumers {
            if readers.contains(consumer) || planned.contains(&consumer) {
                continue;
            }
            planned.push(consumer);
            match self
                .databricks
                .update_privileges(handle, &object, consumer, std::slice::from_ref(&select), &[])
                .await
            {
                Ok(()) => {
                    info!(principal = %consumer, "👤 Consumer access granted");
                    update.granted.push(consumer.clone());
                }
                Err(e) => failures.push(describe(e)),
            }
        }

        if failures.is_empty() {
            Ok(update)
        } else {
            warn!(failures = failures.len(), "Consumer ACL left in a mixed state");
            Err(partial(failures))
        }
    }

    /// Every failing op of the object is reported, not just the first.
    async fn converge_object(
        &self,
        handle: &WorkspaceHandle,
        descriptor: &ComponentDescriptor,
        matrix: &PermissionMatrix,
        spec: &ResourceSpec,
    ) -> Result<(), Vec<String>> {
        let describe = |e: ApiError| format!("{} '{}': {}", spec.kind(), spec.name(), e);

        let object = self
            .databricks
            .ensure_object(handle, spec)
            .await
            .map_err(|e| vec![describe(e)])?;
        let current = self
            .databricks
            .list_grants(handle, &object)
            .await
            .map_err(|e| vec![describe(e)])?;

        let desired = desired_grants(descriptor, matrix, spec.kind());
        let mut errors = Vec::new();
        let mode = GrantMode::for_workspace(handle.is_managed());
        for op in plan_grants(&desired, &current, mode) {
            debug!(?op, "Applying grant");
            if let Err(e) = self
                .databricks
                .set_grant(handle, &object, op.principal(), op.level())
                .await
            {
                errors.push(describe(e));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}
