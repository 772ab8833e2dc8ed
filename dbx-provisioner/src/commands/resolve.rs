// dbx-provisioner/src/commands/resolve.rs
//
// USE CASE: Descriptor validation, offline. Nothing is sent to Azure.

use anyhow::Context;
use std::path::Path;

use dbx_provisioner_core::application::DescriptorResolver;
use dbx_provisioner_core::infrastructure::config::load_settings_or_default;
use dbx_provisioner_core::infrastructure::descriptor_file::load_descriptor;

pub fn execute(config: &Path, descriptor: &Path) -> anyhow::Result<()> {
    println!("⚙️  Loading configuration...");
    let settings = load_settings_or_default(config)?;

    let raw = load_descriptor(descriptor)
        .with_context(|| format!("Failed to read descriptor {}", descriptor.display()))?;
    let resolved = DescriptorResolver::new(settings.use_case_template_ids.clone())
        .resolve(&raw)
        .with_context(|| format!("Descriptor '{}' is invalid", raw.id))?;

    println!("   Component: {} ({})", resolved.component_id, resolved.kind);
    println!("   Workspace: {}", resolved.workspace.display_name());
    println!("   Fingerprint: {}", resolved.fingerprint());
    println!("{}", serde_json::to_string_pretty(&resolved)?);
    println!("\n✅ Descriptor is valid.");
    Ok(())
}
