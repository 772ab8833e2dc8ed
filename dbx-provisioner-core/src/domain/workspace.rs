// dbx-provisioner-core/src/domain/workspace.rs

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SkuType {
    #[default]
    Premium,
    Trial,
    /// Only ever observed on workspaces created outside the engine.
    Standard,
}

impl SkuType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Premium => "PREMIUM",
            Self::Trial => "TRIAL",
            Self::Standard => "STANDARD",
        }
    }

    /// Name used by the `Microsoft.Databricks/workspaces` sku object.
    pub fn arm_name(&self) -> &'static str {
        match self {
            Self::Premium => "premium",
            Self::Trial => "trial",
            Self::Standard => "standard",
        }
    }
}

impl fmt::Display for SkuType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SkuType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "premium" => Ok(Self::Premium),
            "trial" => Ok(Self::Trial),
            "standard" => Ok(Self::Standard),
            _ => Err(format!("Unknown SKU: {}", s)),
        }
    }
}

/// ARM provisioning state of a workspace resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProvisioningState {
    Accepted,
    Creating,
    Updating,
    Deleting,
    Succeeded,
    Failed,
    Canceled,
    Deleted,
    Other(String),
}

impl ProvisioningState {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "accepted" => Self::Accepted,
            "creating" | "created" | "running" => Self::Creating,
            "updating" => Self::Updating,
            "deleting" => Self::Deleting,
            "succeeded" | "ready" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            "deleted" => Self::Deleted,
            _ => Self::Other(raw.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded | Self::Failed | Self::Canceled | Self::Deleted
        )
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, Self::Succeeded)
    }
}

impl fmt::Display for ProvisioningState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Other(s) => write!(f, "{}", s),
            other => write!(f, "{:?}", other),
        }
    }
}

// --- ARM RESOURCE ID ---

/// `/subscriptions/{s}/resourceGroups/{rg}/providers/Microsoft.Databricks/workspaces/{name}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AzureResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

impl AzureResourceId {
    pub fn workspace(
        subscription_id: impl Into<String>,
        resource_group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group: resource_group.into(),
            name: name.into(),
        }
    }

    /// Case-insensitive key used for per-workspace locking.
    pub fn lock_key(&self) -> String {
        self.to_string().to_lowercase()
    }

    /// Portal deep link for reports.
    pub fn portal_url(&self, tenant_id: &str) -> String {
        format!("https://portal.azure.com/#@{}/resource{}", tenant_id, self)
    }
}

impl fmt::Display for AzureResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Databricks/workspaces/{}",
            self.subscription_id, self.resource_group, self.name
        )
    }
}

impl std::str::FromStr for AzureResourceId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().trim_matches('/').split('/').collect();
        let valid = parts.len() == 8
            && parts[0].eq_ignore_ascii_case("subscriptions")
            && parts[2].eq_ignore_ascii_case("resourceGroups")
            && parts[4].eq_ignore_ascii_case("providers")
            && parts[5].eq_ignore_ascii_case("Microsoft.Databricks")
            && parts[6].eq_ignore_ascii_case("workspaces");
        if !valid {
            return Err(format!("Not a Databricks workspace resource id: {}", s));
        }
        Ok(Self::workspace(parts[1], parts[3], parts[7]))
    }
}

impl TryFrom<String> for AzureResourceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AzureResourceId> for String {
    fn from(value: AzureResourceId) -> Self {
        value.to_string()
    }
}

// --- OBSERVED & OWNED STATE ---

/// A workspace as reported by Azure Resource Manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AzureWorkspace {
    pub resource_id: AzureResourceId,
    pub workspace_id: String,
    pub host: String,
    pub sku: SkuType,
    pub location: String,
    pub managed_resource_group_id: String,
    pub state: ProvisioningState,
}

/// Handle on the target workspace.
///
/// `managed` is fixed by the constructor that built the handle; nothing can
/// flip it afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceHandle {
    resource_id: AzureResourceId,
    workspace_id: String,
    host: String,
    sku: SkuType,
    managed: bool,
    state: ProvisioningState,
}

impl WorkspaceHandle {
    pub fn managed(workspace: AzureWorkspace) -> Self {
        Self::from_workspace(workspace, true)
    }

    pub fn unmanaged(workspace: AzureWorkspace) -> Self {
        Self::from_workspace(workspace, false)
    }

    fn from_workspace(ws: AzureWorkspace, managed: bool) -> Self {
        Self {
            resource_id: ws.resource_id,
            workspace_id: ws.workspace_id,
            host: ws.host,
            sku: ws.sku,
            managed,
            state: ws.state,
        }
    }

    pub fn resource_id(&self) -> &AzureResourceId {
        &self.resource_id
    }

    pub fn workspace_id(&self) -> &str {
        &self.workspace_id
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn url(&self) -> String {
        format!("https://{}", self.host)
    }

    pub fn sku(&self) -> SkuType {
        self.sku
    }

    pub fn is_managed(&self) -> bool {
        self.managed
    }

    pub fn state(&self) -> &ProvisioningState {
        &self.state
    }

    pub fn name(&self) -> &str {
        &self.resource_id.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(state: ProvisioningState) -> AzureWorkspace {
        AzureWorkspace {
            resource_id: AzureResourceId::workspace("sub-1", "rg-data", "sales-ws"),
            workspace_id: "123".into(),
            host: "adb-123.4.azuredatabricks.net".into(),
            sku: SkuType::Premium,
            location: "westeurope".into(),
            managed_resource_group_id: "/subscriptions/sub-1/resourceGroups/sales-ws-rg".into(),
            state,
        }
    }

    #[test]
    fn test_resource_id_format_and_parse() -> anyhow::Result<()> {
        let id = AzureResourceId::workspace("sub-1", "rg-data", "sales-ws");
        let text = id.to_string();
        assert_eq!(
            text,
            "/subscriptions/sub-1/resourceGroups/rg-data/providers/Microsoft.Databricks/workspaces/sales-ws"
        );
        let parsed: AzureResourceId = text
            .to_lowercase()
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;
        assert_eq!(parsed.name, "sales-ws");
        assert!(
            "/subscriptions/s/resourceGroups/r/providers/Microsoft.Sql/servers/x"
                .parse::<AzureResourceId>()
                .is_err()
        );
        Ok(())
    }

    #[test]
    fn test_handle_managed_flag_comes_from_constructor() {
        let managed = WorkspaceHandle::managed(sample(ProvisioningState::Succeeded));
        let unmanaged = WorkspaceHandle::unmanaged(sample(ProvisioningState::Succeeded));
        assert!(managed.is_managed());
        assert!(!unmanaged.is_managed());
        assert_eq!(managed.url(), "https://adb-123.4.azuredatabricks.net");
    }

    #[test]
    fn test_provisioning_state_terminal() {
        assert!(ProvisioningState::parse("Succeeded").is_terminal());
        assert!(ProvisioningState::parse("FAILED").is_terminal());
        assert!(!ProvisioningState::parse("Accepted").is_terminal());
        assert!(!ProvisioningState::parse("Creating").is_terminal());
    }

    #[test]
    fn test_sku_default_is_premium() {
        assert_eq!(SkuType::default(), SkuType::Premium);
        assert_eq!(SkuType::Trial.arm_name(), "trial");
    }
}
