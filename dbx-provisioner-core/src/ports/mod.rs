// dbx-provisioner-core/src/ports/mod.rs

// One capability per trust domain. Each adapter carries its own credentials;
// nothing here knows how a token is obtained.

pub mod azure;
pub mod databricks;
pub mod directory;
pub mod git;

pub use azure::{RoleAssignmentApi, RoleAssignmentRequest, WorkspaceApi, WorkspaceCreateRequest};
pub use databricks::{DatabricksApi, ObjectRef};
pub use directory::PrincipalDirectory;
pub use git::{GitBinder, GitCredentialStore};

use std::sync::Arc;

/// Every capability the engine talks to, wired once at start-up.
#[derive(Clone)]
pub struct EnginePorts {
    pub workspaces: Arc<dyn WorkspaceApi>,
    pub role_assignments: Arc<dyn RoleAssignmentApi>,
    pub directory: Arc<dyn PrincipalDirectory>,
    pub databricks: Arc<dyn DatabricksApi>,
    pub git: Arc<dyn GitBinder>,
    pub git_credentials: Arc<dyn GitCredentialStore>,
}
