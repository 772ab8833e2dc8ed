// dbx-provisioner-core/src/application/git.rs

use chrono::Utc;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::error::GitError;
use crate::domain::git::{GitLinkage, GitProvider};
use crate::domain::workspace::WorkspaceHandle;
use crate::ports::{GitBinder, GitCredentialStore};

pub struct GitLinkageManager {
    binder: Arc<dyn GitBinder>,
    credentials: Arc<dyn GitCredentialStore>,
}

impl GitLinkageManager {
    pub fn new(binder: Arc<dyn GitBinder>, credentials: Arc<dyn GitCredentialStore>) -> Self {
        Self { binder, credentials }
    }

    /// Binds the stored credentials of `provider` to the workspace. A second
    /// call replaces the previous linkage.
    #[instrument(skip(self, handle), fields(workspace = handle.name()))]
    pub async fn link_git(&self, handle: &WorkspaceHandle, provider: &str) -> Result<GitLinkage, GitError> {
        let provider = GitProvider::parse(provider)?;
        let credentials = self
            .credentials
            .lookup(provider)
            .filter(|c| !c.token.is_empty())
            .ok_or(GitError::MissingCredentials(provider))?;

        let credential_id = self
            .binder
            .bind_repo(handle, provider, &credentials)
            .await
            .map_err(|e| {
                if e.is_auth_rejected() {
                    GitError::AuthRejected(e.message)
                } else {
                    GitError::Api(e)
                }
            })?;

        info!(%provider, credential_id = %credential_id, "🔗 Git linked");
        Ok(GitLinkage {
            provider,
            credential_id,
            username: credentials.username,
            workspace: handle.host().to_string(),
            linked_at: Utc::now(),
        })
    }
}
