// dbx-provisioner-core/src/infrastructure/adapters/graph.rs

use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::domain::descriptor::Principal;
use crate::domain::error::ApiError;
use crate::infrastructure::adapters::token::TokenProvider;
use crate::infrastructure::http::{HttpTransport, str_field};
use crate::ports::PrincipalDirectory;

pub const DEFAULT_GRAPH_ENDPOINT: &str = "https://graph.microsoft.com/v1.0";

/// Microsoft Graph lookups: groups by display name, users by mail or UPN.
pub struct GraphDirectory {
    transport: Arc<HttpTransport>,
    tokens: Arc<TokenProvider>,
    endpoint: String,
}

impl GraphDirectory {
    pub fn new(transport: Arc<HttpTransport>, tokens: Arc<TokenProvider>) -> Self {
        Self {
            transport,
            tokens,
            endpoint: DEFAULT_GRAPH_ENDPOINT.to_string(),
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into().trim_end_matches('/').to_string();
        self
    }
}

/// OData string literal escaping.
fn odata_literal(value: &str) -> String {
    value.replace('\'', "''")
}

#[async_trait]
impl PrincipalDirectory for GraphDirectory {
    #[instrument(skip(self), fields(principal = %principal))]
    async fn resolve(&self, principal: &Principal) -> Result<Option<String>, ApiError> {
        let token = self.tokens.token().await?;
        let (collection, filter) = match principal {
            Principal::Group(name) => (
                "groups",
                format!("displayName eq '{}'", odata_literal(name)),
            ),
            Principal::User(mail) => {
                let mail = odata_literal(mail);
                (
                    "users",
                    format!("mail eq '{}' or userPrincipalName eq '{}'", mail, mail),
                )
            }
        };
        let url = format!("{}/{}", self.endpoint, collection);
        let page = self
            .transport
            .send(
                Method::GET,
                &url,
                &[("$filter", filter.as_str()), ("$select", "id")],
                &token,
                None,
            )
            .await?;

        let ids: Vec<&str> = page
            .get("value")
            .and_then(Value::as_array)
            .map(|items| items.iter().filter_map(|i| str_field(i, "/id")).collect())
            .unwrap_or_default();
        if ids.len() > 1 {
            warn!(matches = ids.len(), "Ambiguous principal, using the first match");
        }
        debug!(found = ids.first().copied().unwrap_or("-"), "Directory lookup");
        Ok(ids.first().map(|id| id.to_string()))
    }
}
