// dbx-provisioner-core/src/infrastructure/adapters/mod.rs

pub mod arm;
pub mod databricks;
pub mod git_binder;
pub mod graph;
pub mod token;

use std::sync::Arc;
use tracing::info;

use crate::infrastructure::config::AppSettings;
use crate::infrastructure::credentials::Credentials;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::http::HttpTransport;
use crate::ports::EnginePorts;

use arm::{ArmRoleAssignmentClient, ArmWorkspaceClient};
use databricks::DatabricksRestClient;
use git_binder::DatabricksGitBinder;
use graph::GraphDirectory;
use token::{ARM_SCOPE, DATABRICKS_SCOPE, GRAPH_SCOPE, TokenProvider};

/// Wires the live adapters. Each trust domain gets its own token provider;
/// the permissions identity never signs a workspace or Databricks call.
pub fn live_ports(settings: &AppSettings, credentials: &Credentials) -> Result<EnginePorts, InfrastructureError> {
    let engine = &settings.engine;
    let transport = |service: &str| {
        HttpTransport::new(service, engine.request_timeout(), engine.retry.clone()).map(Arc::new)
    };
    let entra = transport("entra")?;
    let arm_http = transport("arm")?;
    let graph_http = transport("graph")?;
    let databricks_http = transport("databricks")?;

    let arm_tokens = Arc::new(TokenProvider::new(entra.clone(), credentials.arm.clone(), ARM_SCOPE));
    let rbac_tokens = Arc::new(TokenProvider::new(
        entra.clone(),
        credentials.permissions.clone(),
        ARM_SCOPE,
    ));
    let graph_tokens = Arc::new(TokenProvider::new(
        entra.clone(),
        credentials.permissions.clone(),
        GRAPH_SCOPE,
    ));
    let databricks_tokens = Arc::new(TokenProvider::new(entra, credentials.arm.clone(), DATABRICKS_SCOPE));

    let git_provider = settings.git_provider()?;
    let base_url = settings.databricks.base_url_override.clone();
    let subscription = settings.azure.subscription_id.clone();

    info!(
        subscription = %subscription,
        retry = %engine.retry,
        timeout_secs = engine.request_timeout_secs,
        "🔌 Live adapters ready"
    );

    Ok(EnginePorts {
        workspaces: Arc::new(ArmWorkspaceClient::new(arm_http.clone(), arm_tokens, subscription.clone())),
        role_assignments: Arc::new(ArmRoleAssignmentClient::new(arm_http, rbac_tokens, subscription)),
        directory: Arc::new(GraphDirectory::new(graph_http, graph_tokens)),
        databricks: Arc::new(
            DatabricksRestClient::new(databricks_http.clone(), databricks_tokens.clone(), git_provider)
                .with_base_url(base_url.clone()),
        ),
        git: Arc::new(DatabricksGitBinder::new(databricks_http, databricks_tokens).with_base_url(base_url)),
        git_credentials: Arc::new(credentials.git.clone()),
    })
}
