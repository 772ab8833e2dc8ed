// dbx-provisioner-core/src/infrastructure/config/settings.rs

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use tracing::{info, instrument};
use validator::Validate;

use crate::domain::git::GitProvider;
use crate::domain::permission::{PermissionMatrix, RoleDefinition};
use crate::domain::template::UseCaseTemplateIds;
use crate::domain::workspace::SkuType;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::http::RetryPolicy;

pub const DEFAULT_CONFIG_PATH: &str = "config/application.yaml";

// --- SECTIONS ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AppSettings {
    #[validate(nested)]
    #[serde(default)]
    pub azure: AzureSettings,

    #[serde(default)]
    pub databricks: DatabricksSettings,

    #[serde(default)]
    pub git: GitSettings,

    #[serde(default, alias = "usecasetemplateid", alias = "useCaseTemplateId")]
    pub use_case_template_ids: UseCaseTemplateIds,

    #[validate(nested)]
    #[serde(default)]
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct AzureSettings {
    #[validate(length(min = 1, message = "azure.subscription_id is required"))]
    #[serde(default)]
    pub subscription_id: String,

    #[validate(length(min = 1, message = "azure.resource_group is required"))]
    #[serde(default)]
    pub resource_group: String,

    #[validate(length(min = 1, message = "azure.region is required"))]
    #[serde(default)]
    pub region: String,

    #[serde(default)]
    pub sku: SkuType,

    /// Only used to render portal links in reports.
    #[serde(default)]
    pub tenant_id: Option<String>,

    #[serde(default)]
    pub permissions: AzureRoleSettings,
}

/// Role definitions applied at workspace scope. `no_permissions` strips
/// every direct assignment of the principal; leaving a field out does nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AzureRoleSettings {
    #[serde(default)]
    pub dp_owner_role_definition_id: RoleDefinition,
    #[serde(default)]
    pub dev_group_role_definition_id: RoleDefinition,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DatabricksSettings {
    #[serde(default)]
    pub permissions: PermissionMatrix,
    /// Replaces `https://<workspace host>` for every workspace API call.
    #[serde(default)]
    pub base_url_override: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitSettings {
    #[serde(default = "default_git_provider")]
    pub provider: String,
}

fn default_git_provider() -> String {
    "GITLAB".to_string()
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            provider: default_git_provider(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct EngineSettings {
    #[validate(range(min = 1, message = "engine.poll_interval_secs must be >= 1"))]
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[validate(range(min = 1, message = "engine.poll_timeout_secs must be >= 1"))]
    #[serde(default = "default_poll_timeout")]
    pub poll_timeout_secs: u64,

    #[validate(range(min = 1, message = "engine.request_timeout_secs must be >= 1"))]
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Upper bound of components provisioned at the same time.
    #[validate(range(min = 1, max = 64))]
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_poll_interval() -> u64 {
    15
}
fn default_poll_timeout() -> u64 {
    20 * 60
}
fn default_request_timeout() -> u64 {
    60
}
fn default_concurrency() -> usize {
    4
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval(),
            poll_timeout_secs: default_poll_timeout(),
            request_timeout_secs: default_request_timeout(),
            concurrency: default_concurrency(),
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_secs(self.poll_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl AppSettings {
    pub fn git_provider(&self) -> Result<GitProvider, InfrastructureError> {
        GitProvider::parse(&self.git.provider)
            .map_err(|e| InfrastructureError::ConfigError(e.to_string()))
    }

    /// Coordinates required before anything is sent to Azure.
    pub fn validate_for_provisioning(&self) -> Result<(), InfrastructureError> {
        self.validate()
            .map_err(|e| InfrastructureError::ConfigError(e.to_string()))
    }
}

// --- LOADER ---

/// Loads the YAML file, layers environment overrides on top and checks the
/// permission matrix. A missing file is an error.
#[instrument]
pub fn load_settings(path: &Path) -> Result<AppSettings, InfrastructureError> {
    if !path.exists() {
        return Err(InfrastructureError::ConfigNotFound(
            path.display().to_string(),
        ));
    }
    info!(path = ?path, "Loading application settings");
    let content = fs::read_to_string(path)?;
    let settings: AppSettings = serde_yaml::from_str(&content)?;
    finish(settings)
}

/// Same as [`load_settings`], but falls back to defaults when the file does
/// not exist. Offline commands need no Azure coordinates.
pub fn load_settings_or_default(path: &Path) -> Result<AppSettings, InfrastructureError> {
    if path.exists() {
        load_settings(path)
    } else {
        info!(path = ?path, "No settings file, using defaults");
        finish(AppSettings::default())
    }
}

fn finish(mut settings: AppSettings) -> Result<AppSettings, InfrastructureError> {
    apply_env_overrides(&mut settings, |key| std::env::var(key).ok())?;
    check_matrix(&settings)?;
    Ok(settings)
}

fn check_matrix(settings: &AppSettings) -> Result<(), InfrastructureError> {
    settings
        .databricks
        .permissions
        .validate()
        .map_err(|errors| InfrastructureError::ConfigError(errors.join("; ")))
}

/// Layering: `DBX_AZURE_SUBSCRIPTION_ID=... dbx-provisioner provision ...`
pub fn apply_env_overrides<F>(settings: &mut AppSettings, lookup: F) -> Result<(), InfrastructureError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(val) = lookup("DBX_AZURE_SUBSCRIPTION_ID") {
        info!(new = %val, "Overriding azure.subscription_id via ENV");
        settings.azure.subscription_id = val;
    }
    if let Some(val) = lookup("DBX_AZURE_RESOURCE_GROUP") {
        info!(old = %settings.azure.resource_group, new = %val, "Overriding azure.resource_group via ENV");
        settings.azure.resource_group = val;
    }
    if let Some(val) = lookup("DBX_AZURE_REGION") {
        info!(old = %settings.azure.region, new = %val, "Overriding azure.region via ENV");
        settings.azure.region = val;
    }
    if let Some(val) = lookup("DBX_AZURE_SKU") {
        settings.azure.sku = val
            .parse()
            .map_err(InfrastructureError::ConfigError)?;
        info!(sku = %settings.azure.sku, "Overriding azure.sku via ENV");
    }
    if let Some(val) = lookup("DBX_GIT_PROVIDER") {
        info!(old = %settings.git.provider, new = %val, "Overriding git.provider via ENV");
        settings.git.provider = val;
    }
    Ok(())
}
