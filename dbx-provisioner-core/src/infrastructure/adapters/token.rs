// dbx-provisioner-core/src/infrastructure/adapters/token.rs

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

use crate::domain::error::ApiError;
use crate::domain::git::Secret;
use crate::infrastructure::credentials::ClientCredentials;
use crate::infrastructure::http::{HttpTransport, str_field};

pub const DEFAULT_AUTHORITY: &str = "https://login.microsoftonline.com";
pub const ARM_SCOPE: &str = "https://management.azure.com/.default";
pub const GRAPH_SCOPE: &str = "https://graph.microsoft.com/.default";
/// Well-known application id of the Azure Databricks resource.
pub const DATABRICKS_SCOPE: &str = "2ff814a6-3304-4ab8-85cb-cd0e6f879c1d/.default";

/// Tokens are renewed this long before they expire.
const EXPIRY_MARGIN: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
struct CachedToken {
    value: Secret,
    expires_at: Instant,
}

/// OAuth2 client-credentials flow against Entra ID, cached until close to expiry.
#[derive(Debug)]
pub struct TokenProvider {
    transport: Arc<HttpTransport>,
    credentials: ClientCredentials,
    scope: String,
    authority: String,
    cache: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new(
        transport: Arc<HttpTransport>,
        credentials: ClientCredentials,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            credentials,
            scope: scope.into(),
            authority: DEFAULT_AUTHORITY.to_string(),
            cache: Mutex::new(None),
        }
    }

    pub fn with_authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = authority.into().trim_end_matches('/').to_string();
        self
    }

    pub async fn token(&self) -> Result<String, ApiError> {
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref()
            && cached.expires_at > Instant::now() + EXPIRY_MARGIN
        {
            return Ok(cached.value.expose().to_string());
        }

        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, self.credentials.tenant_id
        );
        debug!(scope = %self.scope, client_id = %self.credentials.client_id, "Requesting access token");
        let response = self
            .transport
            .send_form(
                &url,
                &[
                    ("grant_type", "client_credentials"),
                    ("client_id", &self.credentials.client_id),
                    ("client_secret", self.credentials.client_secret.expose()),
                    ("scope", &self.scope),
                ],
            )
            .await?;

        let value = str_field(&response, "/access_token")
            .ok_or_else(|| {
                ApiError::network(self.transport.service(), "token response without access_token")
            })?
            .to_string();
        let lifetime = response
            .get("expires_in")
            .and_then(|v| v.as_u64().or_else(|| v.as_str().and_then(|s| s.parse().ok())))
            .unwrap_or(3600);

        *cache = Some(CachedToken {
            value: Secret::new(value.clone()),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(value)
    }
}
