// dbx-provisioner/src/commands/plan.rs
//
// USE CASE: Dry run of the permission matrix for one descriptor, offline.

use anyhow::Context;
use comfy_table::Table;
use std::path::Path;

use dbx_provisioner_core::application::DescriptorResolver;
use dbx_provisioner_core::domain::permission::{RoleDefinition, SubjectRole};
use dbx_provisioner_core::domain::plan::desired_assignments;
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

    println!(
        "📋 Plan for {} ({}) on {}",
        resolved.component_id,
        resolved.kind,
        resolved.workspace.display_name()
    );

    let mut objects = Table::new();
    objects.set_header(vec!["Kind", "Object"]);
    for spec in &resolved.resources {
        objects.add_row(vec![spec.kind().to_string(), spec.name().to_string()]);
    }
    println!("{objects}");

    let mut grants = Table::new();
    grants.set_header(vec!["Role", "Principal", "Kind", "Level"]);
    for assignment in desired_assignments(&resolved, &settings.databricks.permissions) {
        let principal = match assignment.role {
            SubjectRole::Owner => &resolved.owner,
            SubjectRole::Developer => &resolved.developers,
        };
        grants.add_row(vec![
            assignment.role.to_string(),
            principal.to_string(),
            assignment.kind.to_string(),
            assignment.level.to_string(),
        ]);
    }
    println!("{grants}");

    if resolved.workspace.is_managed() {
        let roles = &settings.azure.permissions;
        for (principal, definition) in [
            (&resolved.owner, &roles.dp_owner_role_definition_id),
            (&resolved.developers, &roles.dev_group_role_definition_id),
        ] {
            let action = match definition {
                RoleDefinition::Unset => "left untouched".to_string(),
                RoleDefinition::Strip => "direct assignments removed".to_string(),
                RoleDefinition::RoleId(id) => format!("assigned {id}"),
            };
            println!("   RBAC {principal}: {action}");
        }
    } else {
        println!("   RBAC: existing workspace, left untouched");
    }
    Ok(())
}
