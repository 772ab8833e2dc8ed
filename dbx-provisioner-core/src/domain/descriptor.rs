// dbx-provisioner-core/src/domain/descriptor.rs

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

use crate::domain::error::ResolutionError;
use crate::domain::permission::ResourceKind;

fn re_workspace_url() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?:https://)?(adb-(\d+)\.\d+\.azuredatabricks\.net)/?$")
            .unwrap_or_else(|_| Regex::new("$^").unwrap_or_else(|_| unreachable!()))
    })
}

// --- COMPONENT KIND ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentKind {
    Job,
    Dlt,
    Workflow,
    #[serde(rename = "outputport")]
    OutputPort,
}

impl ComponentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Job => "job",
            Self::Dlt => "dlt",
            Self::Workflow => "workflow",
            Self::OutputPort => "outputport",
        }
    }
}

impl fmt::Display for ComponentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ComponentKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace(['_', '-'], "").as_str() {
            "job" => Ok(Self::Job),
            "dlt" => Ok(Self::Dlt),
            "workflow" => Ok(Self::Workflow),
            "outputport" => Ok(Self::OutputPort),
            _ => Err(format!("Unknown component kind: {}", s)),
        }
    }
}

// --- PRINCIPALS ---

/// A platform identity, as written in descriptors (`user:<id>` / `group:<name>`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "type", content = "name", rename_all = "lowercase")]
pub enum Principal {
    User(String),
    Group(String),
}

impl Principal {
    /// Unprefixed identities are treated as groups. Platform user ids encode
    /// the mail address with its `@` replaced by the last `_`
    /// (`john.doe_company.com` -> `john.doe@company.com`).
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        let raw = raw.trim();
        if let Some(user) = raw.strip_prefix("user:") {
            let user = user.trim();
            if user.is_empty() {
                return Err(ResolutionError::InvalidPrincipal(raw.to_string()));
            }
            if user.contains('@') {
                return Ok(Self::User(user.to_string()));
            }
            return match user.rsplit_once('_') {
                Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {
                    Ok(Self::User(format!("{}@{}", local, domain)))
                }
                _ => Ok(Self::User(user.to_string())),
            };
        }
        let group = raw.strip_prefix("group:").unwrap_or(raw).trim();
        if group.is_empty() {
            return Err(ResolutionError::InvalidPrincipal(raw.to_string()));
        }
        Ok(Self::Group(group.to_string()))
    }

    pub fn name(&self) -> &str {
        match self {
            Self::User(n) | Self::Group(n) => n,
        }
    }

    pub fn is_group(&self) -> bool {
        matches!(self, Self::Group(_))
    }
}

impl fmt::Display for Principal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User(n) => write!(f, "user:{}", n),
            Self::Group(n) => write!(f, "group:{}", n),
        }
    }
}

// --- WORKSPACE TARGET ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum WorkspaceTarget {
    /// A name: the engine creates and owns the workspace.
    Create { name: String },
    /// A per-workspace URL: the workspace exists and is never mutated for lifecycle.
    Existing { host: String, workspace_id: String },
}

impl WorkspaceTarget {
    pub fn parse(raw: &str) -> Result<Self, ResolutionError> {
        let trimmed = raw.trim();
        if let Some(caps) = re_workspace_url().captures(trimmed) {
            return Ok(Self::Existing {
                host: caps[1].to_lowercase(),
                workspace_id: caps[2].to_string(),
            });
        }
        let valid_name = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
        if !valid_name {
            return Err(ResolutionError::InvalidWorkspace(raw.to_string()));
        }
        Ok(Self::Create {
            name: trimmed.to_string(),
        })
    }

    pub fn is_managed(&self) -> bool {
        matches!(self, Self::Create { .. })
    }

    pub fn display_name(&self) -> &str {
        match self {
            Self::Create { name } => name,
            Self::Existing { host, .. } => host,
        }
    }
}

// --- RESOURCES ---

/// A Databricks object a component owns, identified by its natural key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ResourceSpec {
    Repo { path: String, git_url: String },
    Job { name: String },
    Pipeline { name: String },
    OutputPort { table: String },
}

impl ResourceSpec {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Self::Repo { .. } => ResourceKind::Repo,
            Self::Job { .. } => ResourceKind::Job,
            Self::Pipeline { .. } => ResourceKind::Pipeline,
            Self::OutputPort { .. } => ResourceKind::OutputPort,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Repo { path, .. } => path,
            Self::Job { name } | Self::Pipeline { name } => name,
            Self::OutputPort { table } => table,
        }
    }
}

// --- DESCRIPTORS ---

/// Request payload as delivered by the front door.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawDescriptor {
    pub id: String,
    pub use_case_template_id: String,
    #[serde(default)]
    pub kind: Option<String>,
    pub workspace: String,
    #[serde(alias = "dataProductOwner", default)]
    pub owner: String,
    #[serde(alias = "devGroup", default)]
    pub developer_group: String,
    #[serde(default)]
    pub specific: RawSpecific,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawSpecific {
    #[serde(default)]
    pub repo_path: Option<String>,
    #[serde(default)]
    pub git_repo_url: Option<String>,
    #[serde(default)]
    pub job_name: Option<String>,
    #[serde(default)]
    pub pipeline_name: Option<String>,
    /// DLT pipelines orchestrated by a workflow.
    #[serde(default)]
    pub pipeline_tasks: Vec<String>,
    /// Fully qualified `catalog.schema.table` exposed by an output port.
    #[serde(default)]
    pub table: Option<String>,
}

/// A validated request. Immutable once built by the resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub component_id: String,
    pub use_case_template_id: String,
    pub kind: ComponentKind,
    pub workspace: WorkspaceTarget,
    pub owner: Principal,
    pub developers: Principal,
    pub resources: Vec<ResourceSpec>,
}

impl ComponentDescriptor {
    /// Stable identity of the desired state, used to decide whether a recorded
    /// run may be resumed.
    pub fn fingerprint(&self) -> String {
        let payload = serde_json::to_vec(self).unwrap_or_default();
        uuid::Uuid::new_v5(&uuid::Uuid::NAMESPACE_OID, &payload).to_string()
    }

    pub fn resource_kinds(&self) -> Vec<ResourceKind> {
        let mut kinds: Vec<ResourceKind> = self.resources.iter().map(|r| r.kind()).collect();
        kinds.dedup();
        kinds
    }
}
