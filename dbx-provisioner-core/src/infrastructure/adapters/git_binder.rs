// dbx-provisioner-core/src/infrastructure/adapters/git_binder.rs

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument};

use crate::domain::error::ApiError;
use crate::domain::git::{GitCredentials, GitProvider};
use crate::domain::workspace::WorkspaceHandle;
use crate::infrastructure::adapters::token::TokenProvider;
use crate::infrastructure::http::{HttpTransport, id_field, str_field};
use crate::ports::GitBinder;

const GIT_CREDENTIALS_PATH: &str = "/api/2.0/git-credentials";

/// Databricks git-credentials API. A workspace holds at most one credential
/// per provider, so an existing one is updated in place.
pub struct DatabricksGitBinder {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenProvider>,
    base_url_override: Option<String>,
}

impl DatabricksGitBinder {
    pub fn new(transport: Arc<HttpTransport>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            transport,
            tokens,
            base_url_override: None,
        }
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url_override = base_url.map(|u| u.trim_end_matches('/').to_string());
        self
    }

    fn url(&self, workspace: &WorkspaceHandle, suffix: &str) -> String {
        let base = self
            .base_url_override
            .clone()
            .unwrap_or_else(|| workspace.url());
        format!("{}{}{}", base, GIT_CREDENTIALS_PATH, suffix)
    }
}

#[async_trait]
impl GitBinder for DatabricksGitBinder {
    #[instrument(skip(self, workspace, credentials), fields(workspace = %workspace.host(), provider = %provider))]
    async fn bind_repo(
        &self,
        workspace: &WorkspaceHandle,
        provider: GitProvider,
        credentials: &GitCredentials,
    ) -> Result<String, ApiError> {
        let token = self.tokens.token().await?;
        let listing = self
            .transport
            .send(Method::GET, &self.url(workspace, ""), &[], &token, None)
            .await?;
        let existing = listing
            .get("credentials")
            .and_then(Value::as_array)
            .and_then(|items| {
                items.iter().find(|c| {
                    str_field(c, "/git_provider")
                        .and_then(|p| GitProvider::parse(p).ok())
                        == Some(provider)
                })
            })
            .and_then(|c| id_field(c, "credential_id"));

        let body = json!({
            "git_provider": provider.as_api_name(),
            "git_username": credentials.username,
            "personal_access_token": credentials.token.expose(),
        });

        match existing {
            Some(id) => {
                let url = self.url(workspace, &format!("/{}", id));
                self.transport
                    .send(Method::PATCH, &url, &[], &token, Some(&body))
                    .await?;
                info!(credential_id = %id, "🔗 Git credential updated");
                Ok(id)
            }
            None => {
                let created = self
                    .transport
                    .send_once(Method::POST, &self.url(workspace, ""), &[], &token, Some(&body))
                    .await?;
                let id = id_field(&created, "credential_id").ok_or_else(|| {
                    ApiError::network(self.transport.service(), "git credential created without an id")
                })?;
                info!(credential_id = %id, "🔗 Git credential created");
                Ok(id)
            }
        }
    }
}
