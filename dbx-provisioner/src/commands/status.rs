// dbx-provisioner/src/commands/status.rs
//
// USE CASE: Inspect the last recorded run of a component.

use anyhow::bail;
use comfy_table::Table;
use std::path::Path;

use dbx_provisioner_core::infrastructure::state::RunStateStore;

use super::report;

pub fn execute(state_dir: &Path, component: &str, json: bool) -> anyhow::Result<()> {
    let store = RunStateStore::new(state_dir);
    let Some(record) = store.get(component)? else {
        bail!(
            "No recorded run for '{}' in {}",
            component,
            store.path().display()
        );
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    let mut summary = Table::new();
    summary.set_header(vec!["Field", "Value"]);
    summary.add_row(vec!["State".to_string(), record.state.to_string()]);
    summary.add_row(vec!["Fingerprint".to_string(), record.fingerprint.clone()]);
    if let Some(workspace) = &record.workspace {
        let origin = if workspace.is_managed() { "managed" } else { "existing" };
        summary.add_row(vec![
            "Workspace".to_string(),
            format!("{} ({})", workspace.url(), origin),
        ]);
    }
    if let Some(git) = &record.git {
        summary.add_row(vec![
            "Git".to_string(),
            format!("{} as {} ({})", git.provider, git.username, git.credential_id),
        ]);
    }
    summary.add_row(vec!["Updated".to_string(), record.updated_at.to_rfc3339()]);

    println!("📊 {}", record.component_id);
    println!("{summary}");
    println!("{}", report::stage_table(&record.stages));
    Ok(())
}
