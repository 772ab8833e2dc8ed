// dbx-provisioner-core/src/infrastructure/adapters/arm.rs
//
// Azure Resource Manager: Microsoft.Databricks/workspaces and role assignments.

use async_trait::async_trait;
use reqwest::Method;
use serde_json::{Value, json};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::domain::error::ApiError;
use crate::domain::permission::RoleAssignment;
use crate::domain::workspace::{AzureResourceId, AzureWorkspace, ProvisioningState, SkuType};
use crate::infrastructure::adapters::token::TokenProvider;
use crate::infrastructure::http::{HttpTransport, str_field};
use crate::ports::{RoleAssignmentApi, RoleAssignmentRequest, WorkspaceApi, WorkspaceCreateRequest};

pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";
const WORKSPACE_API_VERSION: &str = "2024-05-01";
const ROLE_ASSIGNMENT_API_VERSION: &str = "2022-04-01";

// --- WORKSPACES ---

pub struct ArmWorkspaceClient {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenProvider>,
    endpoint: String,
    subscription_id: String,
}

impl ArmWorkspaceClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenProvider>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            subscription_id: subscription_id.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    async fn call(&self, method: Method, url: &str, body: Option<&Value>) -> Result<Value, ApiError> {
        let token = self.tokens.token().await?;
        self.transport
            .send(method, url, &[("api-version", WORKSPACE_API_VERSION)], &token, body)
            .await
    }
}

fn service_error(message: impl Into<String>) -> ApiError {
    ApiError::network("arm", message)
}

/// Maps an ARM workspace resource to the domain type.
pub fn parse_workspace(value: &Value) -> Result<AzureWorkspace, ApiError> {
    let id = str_field(value, "/id").ok_or_else(|| service_error("workspace without id"))?;
    let resource_id: AzureResourceId = id.parse().map_err(service_error)?;
    let sku = match str_field(value, "/sku/name") {
        Some(name) => name.parse::<SkuType>().map_err(service_error)?,
        None => SkuType::default(),
    };
    Ok(AzureWorkspace {
        resource_id,
        workspace_id: value
            .pointer("/properties/workspaceId")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        host: str_field(value, "/properties/workspaceUrl")
            .unwrap_or_default()
            .to_lowercase(),
        sku,
        location: str_field(value, "/location").unwrap_or_default().to_string(),
        managed_resource_group_id: str_field(value, "/properties/managedResourceGroupId")
            .unwrap_or_default()
            .to_string(),
        state: ProvisioningState::parse(
            str_field(value, "/properties/provisioningState").unwrap_or("Accepted"),
        ),
    })
}

#[async_trait]
impl WorkspaceApi for ArmWorkspaceClient {
    #[instrument(skip(self), fields(workspace = %id.name))]
    async fn get_workspace(&self, id: &AzureResourceId) -> Result<Option<AzureWorkspace>, ApiError> {
        let url = format!("{}{}", self.endpoint, id);
        match self.call(Method::GET, &url, None).await {
            Ok(value) => parse_workspace(&value).map(Some),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn find_workspace_by_host(&self, host: &str) -> Result<Option<AzureWorkspace>, ApiError> {
        let token = self.tokens.token().await?;
        let mut next = Some(format!(
            "{}/subscriptions/{}/providers/Microsoft.Databricks/workspaces?api-version={}",
            self.endpoint, self.subscription_id, WORKSPACE_API_VERSION
        ));
        while let Some(url) = next.take() {
            let page = self.transport.send(Method::GET, &url, &[], &token, None).await?;
            if let Some(items) = page.get("value").and_then(Value::as_array) {
                for item in items {
                    let matches = str_field(item, "/properties/workspaceUrl")
                        .is_some_and(|u| u.eq_ignore_ascii_case(host));
                    if matches {
                        return parse_workspace(item).map(Some);
                    }
                }
            }
            next = str_field(&page, "/nextLink").map(str::to_string);
        }
        Ok(None)
    }

    #[instrument(skip(self, request), fields(workspace = %request.resource_id.name, sku = %request.sku))]
    async fn create_workspace(&self, request: &WorkspaceCreateRequest) -> Result<AzureWorkspace, ApiError> {
        let url = format!("{}{}", self.endpoint, request.resource_id);
        let body = json!({
            "location": request.location,
            "sku": { "name": request.sku.arm_name() },
            "properties": { "managedResourceGroupId": request.managed_resource_group_id },
        });
        info!("🏗️  PUT workspace");
        let value = self.call(Method::PUT, &url, Some(&body)).await?;
        parse_workspace(&value)
    }

    #[instrument(skip(self), fields(workspace = %id.name))]
    async fn delete_workspace(&self, id: &AzureResourceId) -> Result<(), ApiError> {
        let url = format!("{}{}", self.endpoint, id);
        match self.call(Method::DELETE, &url, None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => {
                warn!("Workspace already gone");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

// --- ROLE ASSIGNMENTS ---

pub struct ArmRoleAssignmentClient {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenProvider>,
    endpoint: String,
    subscription_id: String,
}

impl ArmRoleAssignmentClient {
    pub fn new(
        transport: Arc<HttpTransport>,
        tokens: Arc<TokenProvider>,
        subscription_id: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            tokens,
            endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            subscription_id: subscription_id.into(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }

    /// Bare GUIDs from configuration become subscription-level definition ids.
    fn qualified_role(&self, role_definition_id: &str) -> String {
        if role_definition_id.starts_with('/') {
            role_definition_id.to_string()
        } else {
            format!(
                "/subscriptions/{}/providers/Microsoft.Authorization/roleDefinitions/{}",
                self.subscription_id, role_definition_id
            )
        }
    }

    async fn call(
        &self,
        method: Method,
        url: &str,
        query: &[(&str, &str)],
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let token = self.tokens.token().await?;
        let mut params = vec![("api-version", ROLE_ASSIGNMENT_API_VERSION)];
        params.extend_from_slice(query);
        self.transport.send(method, url, &params, &token, body).await
    }
}

fn parse_assignment(value: &Value) -> Option<RoleAssignment> {
    Some(RoleAssignment {
        id: str_field(value, "/id")?.to_string(),
        scope: str_field(value, "/properties/scope")?.to_string(),
        role_definition_id: str_field(value, "/properties/roleDefinitionId")?.to_string(),
        principal_id: str_field(value, "/properties/principalId")?.to_string(),
    })
}

#[async_trait]
impl RoleAssignmentApi for ArmRoleAssignmentClient {
    #[instrument(skip(self))]
    async fn list_for_principal(
        &self,
        scope: &str,
        principal_id: &str,
    ) -> Result<Vec<RoleAssignment>, ApiError> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/roleAssignments",
            self.endpoint, scope
        );
        let filter = format!("principalId eq '{}'", principal_id);
        let page = self
            .call(Method::GET, &url, &[("$filter", filter.as_str())], None)
            .await?;
        Ok(page
            .get("value")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(parse_assignment).collect())
            .unwrap_or_default())
    }

    #[instrument(skip(self, request), fields(name = %request.name, principal = %request.principal_id))]
    async fn create(&self, request: &RoleAssignmentRequest) -> Result<(), ApiError> {
        let url = format!(
            "{}{}/providers/Microsoft.Authorization/roleAssignments/{}",
            self.endpoint, request.scope, request.name
        );
        let body = json!({
            "properties": {
                "roleDefinitionId": self.qualified_role(&request.role_definition_id),
                "principalId": request.principal_id,
                "principalType": if request.principal_is_group { "Group" } else { "User" },
            }
        });
        match self.call(Method::PUT, &url, &[], Some(&body)).await {
            Ok(_) => Ok(()),
            // RoleAssignmentExists: the same grant under another name.
            Err(e) if e.is_conflict() => {
                info!("Role assignment already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, assignment_id: &str) -> Result<(), ApiError> {
        let url = format!("{}{}", self.endpoint, assignment_id);
        match self.call(Method::DELETE, &url, &[], None).await {
            Ok(_) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::domain::git::Secret;
    use crate::infrastructure::credentials::ClientCredentials;
    use crate::infrastructure::http::RetryPolicy;
    use std::time::Duration;
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const WS_PATH: &str = "/subscriptions/sub-1/resourceGroups/rg-data/providers/Microsoft.Databricks/workspaces/sales-ws";

    async fn clients(server: &MockServer) -> anyhow::Result<(ArmWorkspaceClient, ArmRoleAssignmentClient)> {
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"access_token": "tok", "expires_in": 3600})),
            )
            .mount(server)
            .await;
        let transport = Arc::new(HttpTransport::new("arm", Duration::from_secs(5), RetryPolicy::none())?);
        let tokens = Arc::new(
            TokenProvider::new(
                transport.clone(),
                ClientCredentials {
                    tenant_id: "tenant".into(),
                    client_id: "app".into(),
                    client_secret: Secret::new("secret"),
                },
                crate::infrastructure::adapters::token::ARM_SCOPE,
            )
            .with_authority(server.uri()),
        );
        Ok((
            ArmWorkspaceClient::new(transport.clone(), tokens.clone(), "sub-1").with_endpoint(server.uri()),
            ArmRoleAssignmentClient::new(transport, tokens, "sub-1").with_endpoint(server.uri()),
        ))
    }

    fn workspace_body(state: &str) -> Value {
        json!({
            "id": WS_PATH,
            "location": "westeurope",
            "sku": {"name": "premium"},
            "properties": {
                "workspaceId": "1234",
                "workspaceUrl": "adb-1234.5.azuredatabricks.net",
                "managedResourceGroupId": "/subscriptions/sub-1/resourceGroups/sales-ws-rg",
                "provisioningState": state
            }
        })
    }

    #[tokio::test]
    async fn test_get_missing_workspace_is_none() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let (workspaces, _) = clients(&server).await?;
        Mock::given(method("GET"))
            .and(path(WS_PATH))
            .respond_with(ResponseTemplate::new(404).set_body_json(
                json!({"error": {"code": "ResourceNotFound", "message": "not found"}}),
            ))
            .mount(&server)
            .await;

        let id = AzureResourceId::workspace("sub-1", "rg-data", "sales-ws");
        assert!(workspaces.get_workspace(&id).await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_create_sends_sku_and_managed_group() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let (workspaces, _) = clients(&server).await?;
        Mock::given(method("PUT"))
            .and(path(WS_PATH))
            .and(query_param("api-version", WORKSPACE_API_VERSION))
            .and(body_partial_json(json!({
                "sku": {"name": "premium"},
                "properties": {"managedResourceGroupId": "/subscriptions/sub-1/resourceGroups/sales-ws-rg"}
            })))
            .respond_with(ResponseTemplate::new(201).set_body_json(workspace_body("Accepted")))
            .expect(1)
            .mount(&server)
            .await;

        let ws = workspaces
            .create_workspace(&WorkspaceCreateRequest {
                resource_id: AzureResourceId::workspace("sub-1", "rg-data", "sales-ws"),
                location: "westeurope".into(),
                sku: SkuType::Premium,
                managed_resource_group_id: "/subscriptions/sub-1/resourceGroups/sales-ws-rg".into(),
            })
            .await?;

        assert_eq!(ws.state, ProvisioningState::Accepted);
        assert_eq!(ws.host, "adb-1234.5.azuredatabricks.net");
        assert_eq!(ws.sku, SkuType::Premium);
        Ok(())
    }

    #[tokio::test]
    async fn test_find_by_host_follows_next_link() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let (workspaces, _) = clients(&server).await?;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/providers/Microsoft.Databricks/workspaces"))
            .and(query_param("page", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [workspace_body("Succeeded")]
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/subscriptions/sub-1/providers/Microsoft.Databricks/workspaces"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "value": [],
                "nextLink": format!(
                    "{}/subscriptions/sub-1/providers/Microsoft.Databricks/workspaces?api-version={}&page=2",
                    server.uri(), WORKSPACE_API_VERSION
                )
            })))
            .mount(&server)
            .await;

        let found = workspaces
            .find_workspace_by_host("ADB-1234.5.azuredatabricks.net")
            .await?
            .unwrap();
        assert_eq!(found.resource_id.name, "sales-ws");
        assert_eq!(found.workspace_id, "1234");
        Ok(())
    }

    #[tokio::test]
    async fn test_role_assignment_conflict_counts_as_success() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let (_, rbac) = clients(&server).await?;
        Mock::given(method("PUT"))
            .and(path(format!(
                "{}/providers/Microsoft.Authorization/roleAssignments/assignment-1",
                WS_PATH
            )))
            .and(body_partial_json(json!({"properties": {
                "roleDefinitionId": "/subscriptions/sub-1/providers/Microsoft.Authorization/roleDefinitions/role-guid",
                "principalType": "Group"
            }})))
            .respond_with(ResponseTemplate::new(409).set_body_json(
                json!({"error": {"code": "RoleAssignmentExists", "message": "The role assignment already exists."}}),
            ))
            .expect(1)
            .mount(&server)
            .await;

        rbac.create(&RoleAssignmentRequest {
            name: "assignment-1".into(),
            scope: WS_PATH.into(),
            role_definition_id: "role-guid".into(),
            principal_id: "oid-1".into(),
            principal_is_group: true,
        })
        .await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_list_assignments_filters_by_principal() -> anyhow::Result<()> {
        let server = MockServer::start().await;
        let (_, rbac) = clients(&server).await?;
        Mock::given(method("GET"))
            .and(path(format!("{}/providers/Microsoft.Authorization/roleAssignments", WS_PATH)))
            .and(query_param("$filter", "principalId eq 'oid-1'"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{
                "id": format!("{}/providers/Microsoft.Authorization/roleAssignments/a1", WS_PATH),
                "properties": {
                    "scope": WS_PATH,
                    "roleDefinitionId": "/subscriptions/sub-1/providers/Microsoft.Authorization/roleDefinitions/r1",
                    "principalId": "oid-1"
                }
            }]})))
            .mount(&server)
            .await;

        let assignments = rbac.list_for_principal(WS_PATH, "oid-1").await?;
        assert_eq!(assignments.len(), 1);
        assert!(assignments[0].is_direct_at(WS_PATH));
        assert!(assignments[0].has_role("r1"));
        Ok(())
    }
}
