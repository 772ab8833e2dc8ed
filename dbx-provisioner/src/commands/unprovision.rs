// dbx-provisioner/src/commands/unprovision.rs
//
// USE CASE: Tear a component down (grants -> objects -> RBAC -> workspace).

use anyhow::Context;
use std::path::Path;

use dbx_provisioner_core::application::{ProvisioningEngine, UnprovisionOptions};
use dbx_provisioner_core::infrastructure::config::load_settings;
use dbx_provisioner_core::infrastructure::descriptor_file::load_descriptor;
use dbx_provisioner_core::infrastructure::state::RunStateStore;

use super::report;

pub async fn execute(
    config: &Path,
    state_dir: &Path,
    descriptor: &Path,
    remove_data: bool,
    keep_workspace: bool,
) -> anyhow::Result<()> {
    println!("⚙️  Loading configuration...");
    let settings = load_settings(config)?;
    let engine = ProvisioningEngine::connect(&settings)?;

    let raw = load_descriptor(descriptor)
        .with_context(|| format!("Failed to read descriptor {}", descriptor.display()))?;
    let store = RunStateStore::new(state_dir);
    let previous = store.get(raw.id.trim())?;

    let options = UnprovisionOptions {
        remove_data,
        delete_workspace: !keep_workspace,
    };
    let outcome = engine.unprovision(&raw, previous.as_ref(), options).await;
    report::print_component(&outcome.component_id, &outcome.state, &outcome.stages);

    if let Some(result) = &outcome.result {
        for revoked in &result.revoked {
            println!("   🔓 {}", revoked);
        }
        for object in &result.deleted_objects {
            println!("   🗑️  {} '{}'", object.kind, object.name);
        }
    }

    if !outcome.fingerprint.is_empty() {
        store
            .put(&outcome.record())
            .with_context(|| format!("Failed to write run state to {}", store.path().display()))?;
    }

    if outcome.is_success() {
        println!("\n✨ SUCCESS! {} unprovisioned.", outcome.component_id);
        Ok(())
    } else {
        if let Some(failure) = &outcome.failure {
            eprintln!("\n❌ FAILURE at {}: {}", failure.stage, failure.message);
        }
        std::process::exit(1);
    }
}
