// dbx-provisioner-core/src/domain/lifecycle.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::LifecycleError;
use crate::domain::git::GitLinkage;
use crate::domain::workspace::WorkspaceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Resolve,
    Workspace,
    Permissions,
    Git,
    Unprovision,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Resolve => "resolve",
            Self::Workspace => "workspace",
            Self::Permissions => "permissions",
            Self::Git => "git",
            Self::Unprovision => "unprovision",
        };
        write!(f, "{}", s)
    }
}

/// Lifecycle of one component request.
///
/// ```text
/// Requested -> Resolved -> WorkspaceReady -> PermissionsApplied -> GitLinked -> Completed
///      \___________\______________\_________________\______________\-> Failed(stage)
/// Completed | Failed -> Unprovisioning -> Unprovisioned
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "stage", rename_all = "snake_case")]
pub enum LifecycleState {
    Requested,
    Resolved,
    WorkspaceReady,
    PermissionsApplied,
    GitLinked,
    Completed,
    Failed(Stage),
    Unprovisioning,
    Unprovisioned,
}

impl LifecycleState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed(_) | Self::Unprovisioned)
    }

    /// Validates and performs a transition.
    pub fn transition(self, next: LifecycleState) -> Result<LifecycleState, LifecycleError> {
        use LifecycleState::*;

        let allowed = match (&self, &next) {
            (Requested, Resolved)
            | (Resolved, WorkspaceReady)
            | (WorkspaceReady, PermissionsApplied)
            | (PermissionsApplied, GitLinked)
            | (GitLinked, Completed) => true,
            // A failed provisioning stage never leaves the pipeline in Unprovisioning.
            (Unprovisioning, Failed(Stage::Unprovision)) => true,
            (Unprovisioning, Unprovisioned) => true,
            (Completed | Failed(_), Unprovisioning) => true,
            (from, Failed(stage)) => {
                !from.is_terminal() && *from != Unprovisioning && *stage != Stage::Unprovision
            }
            _ => false,
        };

        if allowed {
            Ok(next)
        } else {
            Err(LifecycleError::IllegalTransition {
                from: self,
                to: next,
            })
        }
    }

    /// Stages already done when a run stopped in this state.
    pub fn completed_stages(&self) -> &'static [Stage] {
        match self {
            Self::Requested => &[],
            Self::Resolved => &[Stage::Resolve],
            Self::WorkspaceReady => &[Stage::Resolve, Stage::Workspace],
            Self::PermissionsApplied => &[Stage::Resolve, Stage::Workspace, Stage::Permissions],
            Self::GitLinked | Self::Completed => &[
                Stage::Resolve,
                Stage::Workspace,
                Stage::Permissions,
                Stage::Git,
            ],
            Self::Failed(Stage::Resolve) => &[],
            Self::Failed(Stage::Workspace) => &[Stage::Resolve],
            Self::Failed(Stage::Permissions) => &[Stage::Resolve, Stage::Workspace],
            Self::Failed(Stage::Git) => &[Stage::Resolve, Stage::Workspace, Stage::Permissions],
            Self::Failed(Stage::Unprovision) | Self::Unprovisioning | Self::Unprovisioned => &[],
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Requested => write!(f, "Requested"),
            Self::Resolved => write!(f, "Resolved"),
            Self::WorkspaceReady => write!(f, "WorkspaceReady"),
            Self::PermissionsApplied => write!(f, "PermissionsApplied"),
            Self::GitLinked => write!(f, "GitLinked"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed(stage) => write!(f, "Failed({})", stage),
            Self::Unprovisioning => write!(f, "Unprovisioning"),
            Self::Unprovisioned => write!(f, "Unprovisioned"),
        }
    }
}

// --- REPORTING ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    Succeeded,
    /// Reused from a previous run of the same descriptor.
    Skipped,
    Failed,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "✅ succeeded"),
            Self::Skipped => write!(f, "⏭️  skipped"),
            Self::Failed => write!(f, "❌ failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub stage: Stage,
    pub status: StageStatus,
    pub detail: String,
}

impl StageReport {
    pub fn succeeded(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Succeeded,
            detail: detail.into(),
        }
    }

    pub fn skipped(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Skipped,
            detail: detail.into(),
        }
    }

    pub fn failed(stage: Stage, detail: impl Into<String>) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            detail: detail.into(),
        }
    }
}

// --- PERSISTED RUN ---

/// Last known state of a component, as kept between invocations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRecord {
    pub component_id: String,
    /// Fingerprint of the resolved descriptor the run was made for.
    pub fingerprint: String,
    pub state: LifecycleState,
    #[serde(default)]
    pub workspace: Option<WorkspaceHandle>,
    #[serde(default)]
    pub git: Option<GitLinkage>,
    #[serde(default)]
    pub stages: Vec<StageReport>,
    pub updated_at: DateTime<Utc>,
}

impl ProvisionRecord {
    /// Stages a new run may skip. Only a failed run of the same descriptor is
    /// resumed; anything else is converged again from the start.
    pub fn resumable_stages(&self, fingerprint: &str) -> &'static [Stage] {
        if self.fingerprint == fingerprint && matches!(self.state, LifecycleState::Failed(_)) {
            self.state.completed_stages()
        } else {
            &[]
        }
    }
}
