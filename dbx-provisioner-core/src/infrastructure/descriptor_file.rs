// dbx-provisioner-core/src/infrastructure/descriptor_file.rs

use std::fs;
use std::path::Path;
use tracing::{info, instrument};

use crate::domain::descriptor::RawDescriptor;
use crate::infrastructure::error::InfrastructureError;

/// Reads a `RawDescriptor` from YAML or JSON. JSON is a subset of YAML, so
/// only `.json` files go through `serde_json` for sharper error positions.
#[instrument]
pub fn load_descriptor(path: &Path) -> Result<RawDescriptor, InfrastructureError> {
    if !path.exists() {
        return Err(InfrastructureError::ConfigNotFound(path.display().to_string()));
    }
    let content = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    let raw: RawDescriptor = if is_json {
        serde_json::from_str(&content)?
    } else {
        serde_yaml::from_str(&content)?
    };
    info!(component = %raw.id, "Descriptor loaded");
    Ok(raw)
}
