// dbx-provisioner/src/commands/report.rs
//
// Console rendering shared by the commands that run the engine.

use comfy_table::Table;

use dbx_provisioner_core::domain::lifecycle::{LifecycleState, StageReport};

pub fn stage_table(stages: &[StageReport]) -> Table {
    let mut table = Table::new();
    table.set_header(vec!["Stage", "Status", "Detail"]);
    for report in stages {
        table.add_row(vec![
            report.stage.to_string(),
            report.status.to_string(),
            report.detail.clone(),
        ]);
    }
    table
}

pub fn print_component(component_id: &str, state: &LifecycleState, stages: &[StageReport]) {
    println!("\n📦 {} -> {}", component_id, state);
    println!("{}", stage_table(stages));
}
