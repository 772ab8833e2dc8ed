// dbx-provisioner-core/src/lib.rs

#![allow(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::perf)]

// --- HEXAGONAL MODULES ---

// 1. Ports (traits at the trust-domain seams: ARM, Graph, Databricks, Git)
pub mod ports;

// 2. Domain (descriptor model, permission matrix, convergence planning, lifecycle)
// Pure: no network, no filesystem.
pub mod domain;

// 3. Infrastructure (config, credentials, HTTP adapters, run state store)
pub mod infrastructure;

// 4. Application (resolver, workspace lifecycle, reconciler, git linkage, unprovision, pipeline)
pub mod application;

// --- GLOBAL ERROR ---
pub mod error;

pub use error::ProvisionerError;
