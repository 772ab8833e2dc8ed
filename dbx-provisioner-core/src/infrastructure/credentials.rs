// dbx-provisioner-core/src/infrastructure/credentials.rs
//
// Three trust domains, three credential sets. Nothing is shared between them.

use std::collections::HashMap;
use tracing::info;

use crate::domain::git::{GitCredentials, GitProvider, Secret};
use crate::infrastructure::error::InfrastructureError;
use crate::ports::GitCredentialStore;

/// An Entra ID application registration (OAuth2 client credentials).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: Secret,
}

impl ClientCredentials {
    /// Reads `{prefix}_TENANT_ID`, `{prefix}_CLIENT_ID` and `{prefix}_CLIENT_SECRET`.
    pub fn from_lookup<F>(prefix: &str, lookup: &F) -> Result<Self, InfrastructureError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            let key = format!("{}_{}", prefix, suffix);
            lookup(&key)
                .filter(|v| !v.trim().is_empty())
                .ok_or(InfrastructureError::MissingCredential(key))
        };
        Ok(Self {
            tenant_id: read("TENANT_ID")?,
            client_id: read("CLIENT_ID")?,
            client_secret: Secret::new(read("CLIENT_SECRET")?),
        })
    }
}

/// Every credential the engine needs, grouped by trust domain.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// ARM workspace management and Databricks workspace APIs.
    pub arm: ClientCredentials,
    /// Graph directory lookups and RBAC role assignments.
    pub permissions: ClientCredentials,
    pub git: StaticGitCredentialStore,
}

impl Credentials {
    pub fn from_env(git_provider: GitProvider) -> Result<Self, InfrastructureError> {
        Self::from_lookup(git_provider, &|key: &str| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(git_provider: GitProvider, lookup: &F) -> Result<Self, InfrastructureError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let arm = ClientCredentials::from_lookup("AZURE", lookup)?;
        let permissions = ClientCredentials::from_lookup("PERMISSIONS_AUTH", lookup)?;
        let git = StaticGitCredentialStore::from_lookup(git_provider, lookup);
        info!(
            arm_client = %arm.client_id,
            permissions_client = %permissions.client_id,
            git_provider = %git_provider,
            "🔑 Credentials loaded"
        );
        Ok(Self {
            arm,
            permissions,
            git,
        })
    }
}

// --- GIT CREDENTIAL STORE ---

#[derive(Debug, Clone, Default)]
pub struct StaticGitCredentialStore {
    entries: HashMap<GitProvider, GitCredentials>,
}

impl StaticGitCredentialStore {
    /// `GIT_USERNAME` / `GIT_TOKEN`, registered under the configured provider.
    /// Missing values leave the store empty; the git stage reports it.
    pub fn from_lookup<F>(provider: GitProvider, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut store = Self::default();
        let username = lookup("GIT_USERNAME").filter(|v| !v.trim().is_empty());
        let token = lookup("GIT_TOKEN").filter(|v| !v.trim().is_empty());
        if let (Some(username), Some(token)) = (username, token) {
            store = store.with(
                provider,
                GitCredentials {
                    username,
                    token: Secret::new(token),
                },
            );
        }
        store
    }

    pub fn with(mut self, provider: GitProvider, credentials: GitCredentials) -> Self {
        self.entries.insert(provider, credentials);
        self
    }
}

impl GitCredentialStore for StaticGitCredentialStore {
    fn lookup(&self, provider: GitProvider) -> Option<GitCredentials> {
        self.entries.get(&provider).cloned()
    }
}
