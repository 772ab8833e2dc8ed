// dbx-provisioner-core/src/domain/mod.rs

pub mod descriptor;
pub mod error;
pub mod git;
pub mod lifecycle;
pub mod permission;
pub mod plan;
pub mod template;
pub mod workspace;

pub use error::{
    ApiError, GitError, LifecycleError, PermissionError, ProvisionError, ResolutionError,
    UnprovisionError,
};
