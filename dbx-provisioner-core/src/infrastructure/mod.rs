// dbx-provisioner-core/src/infrastructure/mod.rs

pub mod adapters;
pub mod config;
pub mod credentials;
pub mod descriptor_file;
pub mod error;
pub mod fs;
pub mod http;
pub mod state;
