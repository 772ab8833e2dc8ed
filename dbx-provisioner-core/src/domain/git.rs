// dbx-provisioner-core/src/domain/git.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::error::GitError;

/// Git providers understood by the Databricks git-credentials API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GitProvider {
    #[serde(rename = "gitHub")]
    GitHub,
    #[serde(rename = "gitHubEnterprise")]
    GitHubEnterprise,
    #[serde(rename = "gitLab")]
    GitLab,
    #[serde(rename = "gitLabEnterpriseEdition")]
    GitLabEnterpriseEdition,
    #[serde(rename = "bitbucketCloud")]
    BitbucketCloud,
    #[serde(rename = "bitbucketServer")]
    BitbucketServer,
    #[serde(rename = "azureDevOpsServices")]
    AzureDevOpsServices,
    #[serde(rename = "awsCodeCommit")]
    AwsCodeCommit,
}

impl GitProvider {
    pub const ALL: [GitProvider; 8] = [
        Self::GitHub,
        Self::GitHubEnterprise,
        Self::GitLab,
        Self::GitLabEnterpriseEdition,
        Self::BitbucketCloud,
        Self::BitbucketServer,
        Self::AzureDevOpsServices,
        Self::AwsCodeCommit,
    ];

    /// Value of the `git_provider` field in Databricks API payloads.
    pub fn as_api_name(&self) -> &'static str {
        match self {
            Self::GitHub => "gitHub",
            Self::GitHubEnterprise => "gitHubEnterprise",
            Self::GitLab => "gitLab",
            Self::GitLabEnterpriseEdition => "gitLabEnterpriseEdition",
            Self::BitbucketCloud => "bitbucketCloud",
            Self::BitbucketServer => "bitbucketServer",
            Self::AzureDevOpsServices => "azureDevOpsServices",
            Self::AwsCodeCommit => "awsCodeCommit",
        }
    }

    /// Case-insensitive; `GITLAB`, `git_lab` and `gitLab` are the same provider.
    pub fn parse(raw: &str) -> Result<Self, GitError> {
        let wanted = normalize(raw);
        Self::ALL
            .into_iter()
            .find(|p| normalize(p.as_api_name()) == wanted)
            .ok_or_else(|| GitError::UnsupportedProvider(raw.trim().to_string()))
    }
}

fn normalize(raw: &str) -> String {
    raw.trim()
        .chars()
        .filter(|c| *c != '_' && *c != '-' && *c != ' ')
        .collect::<String>()
        .to_lowercase()
}

impl fmt::Display for GitProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_api_name())
    }
}

impl std::str::FromStr for GitProvider {
    type Err = GitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

// --- SECRETS ---

/// A credential value that never shows up in logs or debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Secret(***)")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitCredentials {
    pub username: String,
    pub token: Secret,
}

/// Result of binding Git credentials to a workspace. Holds the credential
/// reference only, never the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitLinkage {
    pub provider: GitProvider,
    pub credential_id: String,
    pub username: String,
    pub workspace: String,
    pub linked_at: DateTime<Utc>,
}
