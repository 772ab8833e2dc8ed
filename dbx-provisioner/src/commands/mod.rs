// dbx-provisioner/src/commands/mod.rs

pub mod plan;
pub mod provision;
pub mod resolve;
pub mod status;
pub mod unprovision;
pub mod update_acl;

mod report;
