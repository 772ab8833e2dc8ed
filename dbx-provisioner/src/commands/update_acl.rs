// dbx-provisioner/src/commands/update_acl.rs
//
// USE CASE: Replace the consumer list of a provisioned output port.

use anyhow::Context;
use std::path::Path;

use dbx_provisioner_core::ProvisionerError;
use dbx_provisioner_core::application::ProvisioningEngine;
use dbx_provisioner_core::domain::error::PermissionError;
use dbx_provisioner_core::infrastructure::config::load_settings;
use dbx_provisioner_core::infrastructure::descriptor_file::load_descriptor;

pub async fn execute(config: &Path, descriptor: &Path, consumers: &[String]) -> anyhow::Result<()> {
    println!("⚙️  Loading configuration...");
    let settings = load_settings(config)?;
    let engine = ProvisioningEngine::connect(&settings)?;

    let raw = load_descriptor(descriptor)
        .with_context(|| format!("Failed to read descriptor {}", descriptor.display()))?;

    match engine.update_acl(&raw, consumers).await {
        Ok(update) => {
            println!("\n📦 {} ({})", raw.id.trim(), update.table);
            for principal in &update.granted {
                println!("   ✅ {} granted", principal);
            }
            for principal in &update.revoked {
                println!("   🔓 {} revoked", principal);
            }
            for principal in &update.kept {
                println!("   🛡️  {} kept", principal);
            }
            println!(
                "\n✨ SUCCESS! {} granted, {} revoked.",
                update.granted.len(),
                update.revoked.len()
            );
            Ok(())
        }
        Err(e) => {
            eprintln!("\n❌ FAILURE: {}", e);
            if let ProvisionerError::Permission(PermissionError::Partial { failures, .. }) = &e {
                for failure in failures {
                    eprintln!("   - {}", failure);
                }
            }
            std::process::exit(1);
        }
    }
}
