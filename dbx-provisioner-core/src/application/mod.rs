// dbx-provisioner-core/src/application/mod.rs

pub mod git;
pub mod locks;
pub mod permissions;
pub mod pipeline;
pub mod resolver;
pub mod unprovision;
pub mod workspace;

// --- RE-EXPORTS (FACADE) ---
// The CLI only needs `use dbx_provisioner_core::application::{ProvisioningEngine, ...}`.

pub use git::GitLinkageManager;
pub use locks::WorkspaceLocks;
pub use permissions::{AclUpdate, PermissionReconciler};
pub use pipeline::{
    EngineOptions, ProvisionOutcome, ProvisionRequest, ProvisioningEngine, StageFailure,
    UnprovisionOutcome,
};
pub use resolver::DescriptorResolver;
pub use unprovision::{UnprovisionCoordinator, UnprovisionOptions, UnprovisionResult};
pub use workspace::{AzureCoordinates, PollSettings, WorkspaceLifecycleManager};
