// dbx-provisioner-core/src/domain/error.rs

use std::fmt;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::descriptor::ComponentKind;
use crate::domain::git::GitProvider;
use crate::domain::lifecycle::LifecycleState;
use crate::domain::permission::{PermissionAssignment, ResourceKind};
use crate::domain::workspace::SkuType;

// --- TRANSPORT FAILURE (shared by every port) ---

/// Failure of a single outbound call to ARM, Graph, Databricks or a Git provider.
///
/// `status == None` means the request never produced an HTTP response
/// (connect error, timeout, body decoding).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub service: String,
    pub status: Option<u16>,
    pub message: String,
}

impl ApiError {
    pub fn http(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: Some(status),
            message: message.into(),
        }
    }

    pub fn network(service: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            status: None,
            message: message.into(),
        }
    }

    /// 5xx, 429 and network failures. Any other 4xx is final.
    pub fn is_transient(&self) -> bool {
        match self.status {
            None => true,
            Some(code) => code >= 500 || code == 429,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == Some(404)
    }

    pub fn is_conflict(&self) -> bool {
        self.status == Some(409)
    }

    pub fn is_auth_rejected(&self) -> bool {
        matches!(self.status, Some(401) | Some(403))
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(code) => write!(f, "{} call failed (HTTP {}): {}", self.service, code, self.message),
            None => write!(f, "{} call failed: {}", self.service, self.message),
        }
    }
}

impl std::error::Error for ApiError {}

// --- STAGE 1: DESCRIPTOR RESOLUTION ---

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Unknown use case template id '{0}'")]
    #[diagnostic(
        code(dbx::resolve::unknown_template),
        help("Check the usecasetemplateid sets configured for job, dlt, workflow and outputport.")
    )]
    UnknownTemplate(String),

    #[error("Template '{template}' provisions '{template_kind}' components, but the descriptor declares '{declared}'")]
    #[diagnostic(code(dbx::resolve::kind_mismatch))]
    KindMismatch {
        template: String,
        template_kind: ComponentKind,
        declared: String,
    },

    #[error("Invalid workspace target '{0}'")]
    #[diagnostic(
        code(dbx::resolve::workspace),
        help("Use a workspace name to create, or a URL like https://adb-<id>.<n>.azuredatabricks.net")
    )]
    InvalidWorkspace(String),

    #[error("Missing principal: {0}")]
    #[diagnostic(code(dbx::resolve::principal))]
    MissingPrincipal(String),

    #[error("Invalid principal '{0}'")]
    #[diagnostic(code(dbx::resolve::principal), help("Expected 'user:<name>' or 'group:<name>'."))]
    InvalidPrincipal(String),

    #[error("Component of kind '{kind}' requires field '{field}'")]
    #[diagnostic(code(dbx::resolve::missing_field))]
    MissingField {
        kind: ComponentKind,
        field: &'static str,
    },
}

// --- STAGE 2: WORKSPACE LIFECYCLE ---

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum ProvisionError {
    #[error("Workspace '{0}' not found")]
    #[diagnostic(
        code(dbx::workspace::not_found),
        help("Existing workspaces referenced by URL are never created implicitly.")
    )]
    WorkspaceNotFound(String),

    #[error("Workspace '{name}' already exists with SKU {found}, requested {requested}")]
    #[diagnostic(
        code(dbx::workspace::spec_conflict),
        help("Resolve the SKU difference manually; the engine never overwrites an existing workspace.")
    )]
    SpecConflict {
        name: String,
        requested: SkuType,
        found: SkuType,
    },

    #[error("Workspace '{name}' could not be provisioned: {reason}")]
    #[diagnostic(code(dbx::workspace::create_failed))]
    WorkspaceCreateFailed { name: String, reason: String },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ProvisionError {
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Api(e) => e.is_transient(),
            _ => false,
        }
    }
}

// --- STAGE 3: PERMISSIONS ---

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum PermissionError {
    #[error("Permissions left in a mixed state: {} failure(s), {} assignment(s) converged", .failures.len(), .applied.len())]
    #[diagnostic(
        code(dbx::permissions::partial),
        help("Re-run the reconciliation; every grant is idempotent.")
    )]
    Partial {
        applied: Vec<PermissionAssignment>,
        failures: Vec<String>,
    },

    #[error("Consumer ACLs are managed on output ports only, not on {0} components")]
    #[diagnostic(code(dbx::permissions::unsupported))]
    UnsupportedComponent(ComponentKind),

    #[error("Unknown consumer(s): {}", .0.join(", "))]
    #[diagnostic(
        code(dbx::permissions::unknown_consumer),
        help("Consumers must exist in the directory before they can be granted.")
    )]
    UnknownConsumers(Vec<String>),
}

impl PermissionError {
    /// Convergence is idempotent, so a partial failure is always worth retrying.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Partial { .. })
    }

    pub fn failures(&self) -> &[String] {
        match self {
            Self::Partial { failures, .. } => failures,
            Self::UnknownConsumers(names) => names,
            Self::UnsupportedComponent(_) => &[],
        }
    }
}

// --- STAGE 4: GIT LINKAGE ---

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum GitError {
    #[error("Unsupported git provider '{0}'")]
    #[diagnostic(
        code(dbx::git::provider),
        help("Supported: gitHub, gitHubEnterprise, gitLab, gitLabEnterpriseEdition, bitbucketCloud, bitbucketServer, azureDevOpsServices, awsCodeCommit")
    )]
    UnsupportedProvider(String),

    #[error("No git credentials stored for provider {0}")]
    #[diagnostic(code(dbx::git::credentials), help("Set GIT_USERNAME and GIT_TOKEN."))]
    MissingCredentials(GitProvider),

    #[error("Git credentials rejected: {0}")]
    #[diagnostic(
        code(dbx::git::auth_rejected),
        help("Token issues require operator intervention; check scope read+write on the target org/group.")
    )]
    AuthRejected(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl GitError {
    pub fn is_retriable(&self) -> bool {
        false
    }
}

// --- TEARDOWN ---

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum UnprovisionError {
    #[error("Failed to revoke grants on {kind} '{name}': {source}")]
    #[diagnostic(code(dbx::unprovision::revoke))]
    Revoke {
        kind: ResourceKind,
        name: String,
        source: ApiError,
    },

    #[error("Failed to delete {kind} '{name}': {source}")]
    #[diagnostic(code(dbx::unprovision::object))]
    DeleteObject {
        kind: ResourceKind,
        name: String,
        source: ApiError,
    },

    #[error("Failed to remove role assignments for '{principal}': {reason}")]
    #[diagnostic(code(dbx::unprovision::rbac))]
    RoleAssignment { principal: String, reason: String },

    #[error("Failed to delete workspace '{name}': {source}")]
    #[diagnostic(code(dbx::unprovision::workspace))]
    DeleteWorkspace { name: String, source: ApiError },

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl UnprovisionError {
    pub fn is_retriable(&self) -> bool {
        true
    }
}

// --- STATE MACHINE ---

#[derive(Error, Debug, Diagnostic, Clone, PartialEq)]
pub enum LifecycleError {
    #[error("Illegal lifecycle transition {from} -> {to}")]
    #[diagnostic(code(dbx::lifecycle::transition))]
    IllegalTransition {
        from: LifecycleState,
        to: LifecycleState,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(ApiError::http("arm", 503, "busy").is_transient());
        assert!(ApiError::http("arm", 429, "throttled").is_transient());
        assert!(ApiError::network("arm", "connection reset").is_transient());
        assert!(!ApiError::http("arm", 403, "forbidden").is_transient());
        assert!(!ApiError::http("arm", 400, "bad request").is_transient());
    }

    #[test]
    fn test_retriable_policy_per_stage() {
        let conflict = ProvisionError::SpecConflict {
            name: "ws".into(),
            requested: SkuType::Premium,
            found: SkuType::Trial,
        };
        assert!(!conflict.is_retriable());
        assert!(ProvisionError::Api(ApiError::http("arm", 502, "gateway")).is_retriable());
        assert!(!GitError::AuthRejected("bad token".into()).is_retriable());
        assert!(
            PermissionError::Partial {
                applied: vec![],
                failures: vec!["x".into()]
            }
            .is_retriable()
        );
        assert!(!PermissionError::UnknownConsumers(vec!["ghost".into()]).is_retriable());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::http("databricks", 404, "RESOURCE_DOES_NOT_EXIST");
        assert_eq!(
            err.to_string(),
            "databricks call failed (HTTP 404): RESOURCE_DOES_NOT_EXIST"
        );
    }
}
