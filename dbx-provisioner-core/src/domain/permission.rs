// dbx-provisioner-core/src/domain/permission.rs

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::descriptor::Principal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectRole {
    Owner,
    Developer,
}

impl fmt::Display for SubjectRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Owner => write!(f, "owner"),
            Self::Developer => write!(f, "developer"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResourceKind {
    Repo,
    Job,
    Pipeline,
    OutputPort,
}

const REPO_LEVELS: &[&str] = &["CAN_EDIT", "CAN_MANAGE", "CAN_READ", "CAN_RUN", "NO_PERMISSIONS"];
const JOB_LEVELS: &[&str] = &["CAN_MANAGE", "CAN_MANAGE_RUN", "CAN_VIEW", "IS_OWNER", "NO_PERMISSIONS"];
const PIPELINE_LEVELS: &[&str] = &["CAN_MANAGE", "CAN_RUN", "CAN_VIEW", "IS_OWNER", "NO_PERMISSIONS"];
const OUTPUT_PORT_LEVELS: &[&str] = &["ALL_PRIVILEGES", "APPLY_TAG", "SELECT"];

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Repo => "repo",
            Self::Job => "job",
            Self::Pipeline => "pipeline",
            Self::OutputPort => "outputPort",
        }
    }

    /// Native levels accepted by the backend for this kind of object.
    pub fn allowed_levels(&self) -> &'static [&'static str] {
        match self {
            Self::Repo => REPO_LEVELS,
            Self::Job => JOB_LEVELS,
            Self::Pipeline => PIPELINE_LEVELS,
            Self::OutputPort => OUTPUT_PORT_LEVELS,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Opaque native permission level (`CAN_MANAGE`, `SELECT`, ...).
///
/// Checked against [`ResourceKind::allowed_levels`] when configuration is
/// loaded, never afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct PermissionLevel(String);

impl From<String> for PermissionLevel {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<PermissionLevel> for String {
    fn from(value: PermissionLevel) -> Self {
        value.0
    }
}

impl PermissionLevel {
    pub fn new(level: impl Into<String>) -> Self {
        Self(level.into().trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_allowed_for(&self, kind: ResourceKind) -> bool {
        kind.allowed_levels().contains(&self.0.as_str())
    }
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One derived grant of the desired state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PermissionAssignment {
    pub role: SubjectRole,
    pub kind: ResourceKind,
    pub level: PermissionLevel,
}

impl fmt::Display for PermissionAssignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.role, self.kind, self.level)
    }
}

// --- STATIC MATRIX ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RolePermissions {
    pub owner: PermissionLevel,
    pub developer: PermissionLevel,
}

impl RolePermissions {
    fn same(level: &str) -> Self {
        Self {
            owner: PermissionLevel::new(level),
            developer: PermissionLevel::new(level),
        }
    }
}

/// (resourceKind, role) -> native level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermissionMatrix {
    #[serde(default = "default_manage")]
    pub repo: RolePermissions,
    #[serde(default = "default_manage")]
    pub job: RolePermissions,
    #[serde(default = "default_manage")]
    pub pipeline: RolePermissions,
    #[serde(rename = "outputPort", alias = "output_port", default = "default_select")]
    pub output_port: RolePermissions,
}

fn default_manage() -> RolePermissions {
    RolePermissions::same("CAN_MANAGE")
}

fn default_select() -> RolePermissions {
    RolePermissions::same("SELECT")
}

impl Default for PermissionMatrix {
    fn default() -> Self {
        Self {
            repo: default_manage(),
            job: default_manage(),
            pipeline: default_manage(),
            output_port: default_select(),
        }
    }
}

impl PermissionMatrix {
    pub fn for_kind(&self, kind: ResourceKind) -> &RolePermissions {
        match kind {
            ResourceKind::Repo => &self.repo,
            ResourceKind::Job => &self.job,
            ResourceKind::Pipeline => &self.pipeline,
            ResourceKind::OutputPort => &self.output_port,
        }
    }

    pub fn level(&self, kind: ResourceKind, role: SubjectRole) -> &PermissionLevel {
        let entry = self.for_kind(kind);
        match role {
            SubjectRole::Owner => &entry.owner,
            SubjectRole::Developer => &entry.developer,
        }
    }

    /// Every level not in its kind's allowed set, as readable messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let kinds = [
            ResourceKind::Repo,
            ResourceKind::Job,
            ResourceKind::Pipeline,
            ResourceKind::OutputPort,
        ];
        let errors: Vec<String> = kinds
            .into_iter()
            .flat_map(|kind| {
                [SubjectRole::Owner, SubjectRole::Developer]
                    .into_iter()
                    .map(move |role| (kind, role))
            })
            .filter_map(|(kind, role)| {
                let level = self.level(kind, role);
                (!level.is_allowed_for(kind)).then(|| {
                    format!(
                        "{} permission for {} is '{}', expected one of {:?}",
                        kind,
                        role,
                        level,
                        kind.allowed_levels()
                    )
                })
            })
            .collect();
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

// --- AZURE RBAC ---

const STRIP_SENTINEL: &str = "no_permissions";

/// Role definition configured for a principal at workspace scope.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum RoleDefinition {
    /// Nothing configured: no RBAC call at all.
    #[default]
    Unset,
    /// Remove every direct assignment of the principal at the scope.
    Strip,
    RoleId(String),
}

impl From<Option<String>> for RoleDefinition {
    fn from(value: Option<String>) -> Self {
        match value.as_deref().map(str::trim) {
            None | Some("") => Self::Unset,
            Some(v) if v.eq_ignore_ascii_case(STRIP_SENTINEL) => Self::Strip,
            Some(v) => Self::RoleId(v.to_string()),
        }
    }
}

impl From<RoleDefinition> for Option<String> {
    fn from(value: RoleDefinition) -> Self {
        match value {
            RoleDefinition::Unset => None,
            RoleDefinition::Strip => Some(STRIP_SENTINEL.to_string()),
            RoleDefinition::RoleId(id) => Some(id),
        }
    }
}

/// (roleDefinition, scope, principal object id)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleDefinitionBinding {
    pub definition: RoleDefinition,
    pub scope: String,
    pub principal_id: String,
}

/// An existing ARM role assignment, as listed for a principal at a scope.
/// Listing at a scope also returns assignments inherited from parent scopes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAssignment {
    pub id: String,
    pub scope: String,
    pub role_definition_id: String,
    pub principal_id: String,
}

impl RoleAssignment {
    pub fn is_direct_at(&self, scope: &str) -> bool {
        self.scope.trim_end_matches('/').eq_ignore_ascii_case(scope.trim_end_matches('/'))
    }

    /// Role definitions are compared on their trailing GUID, so a configured
    /// bare GUID matches a fully qualified definition id.
    pub fn has_role(&self, role_definition_id: &str) -> bool {
        last_segment(&self.role_definition_id).eq_ignore_ascii_case(last_segment(role_definition_id))
    }
}

fn last_segment(id: &str) -> &str {
    id.trim_end_matches('/').rsplit('/').next().unwrap_or(id)
}

// --- DATABRICKS ACL ---

/// A direct (non-inherited) ACL entry observed on a Databricks object.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grant {
    pub principal: Principal,
    pub level: PermissionLevel,
}
