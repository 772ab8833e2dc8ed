// dbx-provisioner/src/commands/provision.rs
//
// USE CASE: Provision components end to end (workspace -> permissions -> git).

use anyhow::Context;
use std::path::{Path, PathBuf};
use std::time::Instant;

use dbx_provisioner_core::application::{ProvisionRequest, ProvisioningEngine};
use dbx_provisioner_core::infrastructure::config::load_settings;
use dbx_provisioner_core::infrastructure::descriptor_file::load_descriptor;
use dbx_provisioner_core::infrastructure::state::RunStateStore;

use super::report;

pub async fn execute(config: &Path, state_dir: &Path, descriptors: Vec<PathBuf>) -> anyhow::Result<()> {
    let start = Instant::now();

    // A. Configuration
    println!("⚙️  Loading configuration...");
    let settings = load_settings(config)?;
    println!(
        "   Subscription: {} / {} ({})",
        settings.azure.subscription_id, settings.azure.resource_group, settings.azure.region
    );

    // B. Credentials, adapters & engine
    let engine = ProvisioningEngine::connect(&settings)?;

    // C. Requests, resumed from the recorded runs
    let store = RunStateStore::new(state_dir);
    let recorded = store
        .load()
        .with_context(|| format!("Failed to read run state from {}", store.path().display()))?;
    let mut requests = Vec::with_capacity(descriptors.len());
    for path in &descriptors {
        let raw = load_descriptor(path)
            .with_context(|| format!("Failed to read descriptor {}", path.display()))?;
        let previous = recorded.get(raw.id.trim()).cloned();
        requests.push(ProvisionRequest::new(raw).resuming(previous));
    }

    // D. Run
    let outcomes = engine.provision_many(requests).await;
    for outcome in &outcomes {
        report::print_component(&outcome.component_id, &outcome.state, &outcome.stages);
        if let Some(workspace) = &outcome.workspace {
            println!("   Workspace: {}", workspace.url());
            if let Some(tenant) = settings.azure.tenant_id.as_deref()
                && workspace.is_managed()
            {
                println!("   Portal: {}", workspace.resource_id().portal_url(tenant));
            }
        }
    }

    // E. Persist. A descriptor that never resolved leaves its record alone.
    let records: Vec<_> = outcomes
        .iter()
        .filter(|o| !o.fingerprint.is_empty())
        .map(|o| o.record())
        .collect();
    store
        .put_all(&records)
        .with_context(|| format!("Failed to write run state to {}", store.path().display()))?;

    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
    if failed.is_empty() {
        println!(
            "\n✨ SUCCESS! {} component(s) provisioned in {:.2?}",
            outcomes.len(),
            start.elapsed()
        );
        Ok(())
    } else {
        eprintln!("\n❌ FAILURE. {} of {} component(s) failed.", failed.len(), outcomes.len());
        for outcome in failed {
            if let Some(failure) = &outcome.failure {
                let hint = if failure.retriable { " (retriable)" } else { "" };
                eprintln!(
                    "   ❌ {} at {}: {}{}",
                    outcome.component_id, failure.stage, failure.message, hint
                );
            }
        }
        // Exit with error code for CI/CD
        std::process::exit(1);
    }
}
