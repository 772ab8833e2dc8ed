// dbx-provisioner-core/src/ports/git.rs

use async_trait::async_trait;

use crate::domain::error::ApiError;
use crate::domain::git::{GitCredentials, GitProvider};
use crate::domain::workspace::WorkspaceHandle;

/// Uniform binding capability, whatever the provider.
#[async_trait]
pub trait GitBinder: Send + Sync {
    /// Binds the credentials to the workspace; returns the backend credential id.
    async fn bind_repo(
        &self,
        workspace: &WorkspaceHandle,
        provider: GitProvider,
        credentials: &GitCredentials,
    ) -> Result<String, ApiError>;
}

/// Credentials are looked up by provider identity, never carried in a descriptor.
pub trait GitCredentialStore: Send + Sync {
    fn lookup(&self, provider: GitProvider) -> Option<GitCredentials>;
}
