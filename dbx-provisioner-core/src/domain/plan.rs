// dbx-provisioner-core/src/domain/plan.rs
//
// Pure convergence planning: desired state + observed state -> minimal ops.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::domain::descriptor::{ComponentDescriptor, Principal};
use crate::domain::permission::{
    Grant, PermissionAssignment, PermissionLevel, PermissionMatrix, ResourceKind, RoleAssignment,
    RoleDefinition, SubjectRole,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DesiredGrant {
    pub role: SubjectRole,
    pub principal: Principal,
    pub level: PermissionLevel,
}

impl DesiredGrant {
    pub fn assignment(&self, kind: ResourceKind) -> PermissionAssignment {
        PermissionAssignment {
            role: self.role,
            kind,
            level: self.level.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum GrantOp {
    Add {
        principal: Principal,
        level: PermissionLevel,
    },
    Overwrite {
        principal: Principal,
        from: PermissionLevel,
        to: PermissionLevel,
    },
}

impl GrantOp {
    pub fn principal(&self) -> &Principal {
        match self {
            Self::Add { principal, .. } | Self::Overwrite { principal, .. } => principal,
        }
    }

    pub fn level(&self) -> &PermissionLevel {
        match self {
            Self::Add { level, .. } => level,
            Self::Overwrite { to, .. } => to,
        }
    }
}

/// Owner and developer grants for one resource kind, per the matrix.
pub fn desired_grants(
    descriptor: &ComponentDescriptor,
    matrix: &PermissionMatrix,
    kind: ResourceKind,
) -> Vec<DesiredGrant> {
    vec![
        DesiredGrant {
            role: SubjectRole::Owner,
            principal: descriptor.owner.clone(),
            level: matrix.level(kind, SubjectRole::Owner).clone(),
        },
        DesiredGrant {
            role: SubjectRole::Developer,
            principal: descriptor.developers.clone(),
            level: matrix.level(kind, SubjectRole::Developer).clone(),
        },
    ]
}

/// The full derived assignment set of a component.
pub fn desired_assignments(
    descriptor: &ComponentDescriptor,
    matrix: &PermissionMatrix,
) -> Vec<PermissionAssignment> {
    descriptor
        .resource_kinds()
        .into_iter()
        .flat_map(|kind| {
            desired_grants(descriptor, matrix, kind)
                .into_iter()
                .map(move |g| g.assignment(kind))
        })
        .collect()
}

/// How far an ACL may be changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantMode {
    /// Our principals end up with exactly the desired level.
    Converge,
    /// Only principals holding nothing are granted; existing grants stay as
    /// they are. Used on workspaces the engine does not own.
    AddOnly,
}

impl GrantMode {
    pub fn for_workspace(managed: bool) -> Self {
        if managed { Self::Converge } else { Self::AddOnly }
    }
}

/// Set-union convergence of one object's ACL.
///
/// Grants of principals outside `desired` are never touched. A principal
/// listed twice (owner group == developer group) is planned once, with the
/// first level.
pub fn plan_grants(desired: &[DesiredGrant], current: &[Grant], mode: GrantMode) -> Vec<GrantOp> {
    let mut observed: BTreeMap<&Principal, Vec<&PermissionLevel>> = BTreeMap::new();
    for grant in current {
        observed.entry(&grant.principal).or_default().push(&grant.level);
    }

    let mut planned: Vec<&Principal> = Vec::new();
    let mut ops = Vec::new();
    for want in desired {
        if planned.contains(&&want.principal) {
            continue;
        }
        planned.push(&want.principal);

        match observed.get(&want.principal) {
            None => ops.push(GrantOp::Add {
                principal: want.principal.clone(),
                level: want.level.clone(),
            }),
            Some(levels) if levels.contains(&&want.level) => {}
            Some(_) if mode == GrantMode::AddOnly => {}
            Some(levels) => ops.push(GrantOp::Overwrite {
                principal: want.principal.clone(),
                from: levels[0].clone(),
                to: want.level.clone(),
            }),
        }
    }
    ops
}

/// Principals of ours that still hold a grant on the object.
pub fn plan_revocations(ours: &[Principal], current: &[Grant]) -> Vec<Principal> {
    let mut revoke: Vec<Principal> = Vec::new();
    for grant in current {
        if ours.contains(&grant.principal) && !revoke.contains(&grant.principal) {
            revoke.push(grant.principal.clone());
        }
    }
    revoke
}

// --- AZURE RBAC ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RbacOp {
    Assign { role_definition_id: String },
    Remove { assignment_id: String },
}

/// Ops converging one RoleDefinitionBinding at `scope`.
///
/// `Strip` removes direct assignments only: inherited ones belong to a parent
/// scope this engine does not own.
pub fn plan_role_binding(
    definition: &RoleDefinition,
    scope: &str,
    existing: &[RoleAssignment],
) -> Vec<RbacOp> {
    match definition {
        RoleDefinition::Unset => vec![],
        RoleDefinition::Strip => existing
            .iter()
            .filter(|ra| ra.is_direct_at(scope))
            .map(|ra| RbacOp::Remove {
                assignment_id: ra.id.clone(),
            })
            .collect(),
        RoleDefinition::RoleId(role) => {
            let present = existing
                .iter()
                .any(|ra| ra.is_direct_at(scope) && ra.has_role(role));
            if present {
                vec![]
            } else {
                vec![RbacOp::Assign {
                    role_definition_id: role.clone(),
                }]
            }
        }
    }
}

/// Ops undoing what `plan_role_binding` assigned. Only the configured role is
/// removed; `Strip` and `Unset` have nothing to undo.
pub fn plan_role_unbinding(
    definition: &RoleDefinition,
    scope: &str,
    existing: &[RoleAssignment],
) -> Vec<RbacOp> {
    match definition {
        RoleDefinition::RoleId(role) => existing
            .iter()
            .filter(|ra| ra.is_direct_at(scope) && ra.has_role(role))
            .map(|ra| RbacOp::Remove {
                assignment_id: ra.id.clone(),
            })
            .collect(),
        RoleDefinition::Unset | RoleDefinition::Strip => vec![],
    }
}
