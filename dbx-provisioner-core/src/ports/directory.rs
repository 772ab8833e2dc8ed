// dbx-provisioner-core/src/ports/directory.rs

use async_trait::async_trait;

use crate::domain::descriptor::Principal;
use crate::domain::error::ApiError;

/// Identity directory (Microsoft Graph), authorised with the permissions credentials.
#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Object id of the principal, `Ok(None)` when the directory has no match.
    async fn resolve(&self, principal: &Principal) -> Result<Option<String>, ApiError>;
}
