// dbx-provisioner-core/src/error.rs

use crate::domain::error::{
    GitError, LifecycleError, PermissionError, ProvisionError, ResolutionError, UnprovisionError,
};
use crate::infrastructure::error::InfrastructureError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProvisionerError {
    // --- STAGE ERRORS (one per engine component) ---
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error(transparent)]
    Provision(#[from] ProvisionError),

    #[error(transparent)]
    Permission(#[from] PermissionError),

    #[error(transparent)]
    Git(#[from] GitError),

    #[error(transparent)]
    Unprovision(#[from] UnprovisionError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    // --- INFRASTRUCTURE (config, credentials, IO) ---
    #[error(transparent)]
    Infrastructure(#[from] InfrastructureError),
}

impl ProvisionerError {
    /// Whether re-invoking the same request may succeed without operator action.
    pub fn is_retriable(&self) -> bool {
        match self {
            Self::Resolution(_) => false,
            Self::Provision(e) => e.is_retriable(),
            Self::Permission(e) => e.is_retriable(),
            Self::Git(e) => e.is_retriable(),
            Self::Unprovision(e) => e.is_retriable(),
            Self::Lifecycle(_) => false,
            Self::Infrastructure(_) => false,
        }
    }
}

impl From<std::io::Error> for ProvisionerError {
    fn from(err: std::io::Error) -> Self {
        ProvisionerError::Infrastructure(InfrastructureError::Io(err))
    }
}
