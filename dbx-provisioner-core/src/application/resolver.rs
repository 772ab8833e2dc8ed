// dbx-provisioner-core/src/application/resolver.rs

use std::str::FromStr;
use tracing::{debug, instrument};

use crate::domain::descriptor::{
    ComponentDescriptor, ComponentKind, Principal, RawDescriptor, ResourceSpec, WorkspaceTarget,
};
use crate::domain::error::ResolutionError;
use crate::domain::template::{UseCaseTemplateIds, versionless_template_id};

/// Turns a raw request into a validated, immutable descriptor. No I/O.
#[derive(Debug, Clone)]
pub struct DescriptorResolver {
    templates: UseCaseTemplateIds,
}

impl DescriptorResolver {
    pub fn new(templates: UseCaseTemplateIds) -> Self {
        Self { templates }
    }

    #[instrument(skip(self, raw), fields(component = %raw.id))]
    pub fn resolve(&self, raw: &RawDescriptor) -> Result<ComponentDescriptor, ResolutionError> {
        let template = versionless_template_id(&raw.use_case_template_id);
        let kind = self
            .templates
            .classify(&template)
            .ok_or_else(|| ResolutionError::UnknownTemplate(raw.use_case_template_id.trim().to_string()))?;

        if let Some(declared) = raw.kind.as_deref().map(str::trim).filter(|d| !d.is_empty())
            && ComponentKind::from_str(declared).ok() != Some(kind)
        {
            return Err(ResolutionError::KindMismatch {
                template,
                template_kind: kind,
                declared: declared.to_string(),
            });
        }

        let component_id = raw.id.trim();
        if component_id.is_empty() {
            return Err(ResolutionError::MissingField { kind, field: "id" });
        }

        let workspace = WorkspaceTarget::parse(&raw.workspace)?;
        let owner = owner_principal(&raw.owner)?;
        let developers = developer_group(&raw.developer_group)?;
        let resources = resources_for(kind, component_id, raw)?;

        debug!(%kind, workspace = workspace.display_name(), resources = resources.len(), "Descriptor resolved");
        Ok(ComponentDescriptor {
            component_id: component_id.to_string(),
            use_case_template_id: template,
            kind,
            workspace,
            owner,
            developers,
            resources,
        })
    }
}

fn owner_principal(raw: &str) -> Result<Principal, ResolutionError> {
    if raw.trim().is_empty() {
        return Err(ResolutionError::MissingPrincipal("data product owner".into()));
    }
    Principal::parse(raw)
}

/// The developer principal is always a group, prefixed or not.
fn developer_group(raw: &str) -> Result<Principal, ResolutionError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ResolutionError::MissingPrincipal("developer group".into()));
    }
    match Principal::parse(trimmed)? {
        group @ Principal::Group(_) => Ok(group),
        Principal::User(_) => Err(ResolutionError::InvalidPrincipal(trimmed.to_string())),
    }
}

/// Last `:` segment of the component id, the default object name.
fn default_name(component_id: &str) -> &str {
    component_id
        .rsplit(':')
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(component_id)
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn repo_for(kind: ComponentKind, raw: &RawDescriptor) -> Result<Option<ResourceSpec>, ResolutionError> {
    let specific = &raw.specific;
    match (non_empty(&specific.repo_path), non_empty(&specific.git_repo_url)) {
        (Some(path), Some(url)) => Ok(Some(ResourceSpec::Repo {
            path: path.to_string(),
            git_url: url.to_string(),
        })),
        (None, None) => Ok(None),
        (Some(_), None) => Err(ResolutionError::MissingField {
            kind,
            field: "specific.gitRepoUrl",
        }),
        (None, Some(_)) => Err(ResolutionError::MissingField {
            kind,
            field: "specific.repoPath",
        }),
    }
}

fn resources_for(
    kind: ComponentKind,
    component_id: &str,
    raw: &RawDescriptor,
) -> Result<Vec<ResourceSpec>, ResolutionError> {
    let specific = &raw.specific;
    let fallback = default_name(component_id);
    let mut resources: Vec<ResourceSpec> = Vec::new();

    match kind {
        ComponentKind::Job => {
            resources.extend(repo_for(kind, raw)?);
            resources.push(ResourceSpec::Job {
                name: non_empty(&specific.job_name).unwrap_or(fallback).to_string(),
            });
        }
        ComponentKind::Dlt => {
            resources.extend(repo_for(kind, raw)?);
            resources.push(ResourceSpec::Pipeline {
                name: non_empty(&specific.pipeline_name).unwrap_or(fallback).to_string(),
            });
        }
        ComponentKind::Workflow => {
            resources.extend(repo_for(kind, raw)?);
            resources.push(ResourceSpec::Job {
                name: non_empty(&specific.job_name).unwrap_or(fallback).to_string(),
            });
            let mut seen: Vec<&str> = Vec::new();
            for task in specific.pipeline_tasks.iter().map(|t| t.trim()) {
                if task.is_empty() || seen.contains(&task) {
                    continue;
                }
                seen.push(task);
                resources.push(ResourceSpec::Pipeline {
                    name: task.to_string(),
                });
            }
        }
        ComponentKind::OutputPort => {
            let table = non_empty(&specific.table).ok_or(ResolutionError::MissingField {
                kind,
                field: "specific.table",
            })?;
            resources.push(ResourceSpec::OutputPort {
                table: table.to_string(),
            });
        }
    }
    Ok(resources)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::descriptor::RawSpecific;
    use crate::domain::permission::ResourceKind;

    fn raw(template: &str) -> RawDescriptor {
        RawDescriptor {
            id: "urn:dmb:cmp:sales:1:ingest".into(),
            use_case_template_id: template.into(),
            kind: None,
            workspace: "sales-ws".into(),
            owner: "user:john.doe_company.com".into(),
            developer_group: "dp-devs".into(),
            specific: RawSpecific::default(),
        }
    }

    fn resolver() -> DescriptorResolver {
        DescriptorResolver::new(UseCaseTemplateIds::default())
    }

    #[test]
    fn test_dlt_on_managed_workspace() -> anyhow::Result<()> {
        let mut input = raw("urn:dmb:utm:databricks-workload-dlt-template:0.1.0");
        input.specific.repo_path = Some("/Repos/sales/ingest".into());
        input.specific.git_repo_url = Some("https://gitlab.com/sales/ingest.git".into());

        let d = resolver().resolve(&input)?;

        assert_eq!(d.kind, ComponentKind::Dlt);
        assert_eq!(d.use_case_template_id, "urn:dmb:utm:databricks-workload-dlt-template");
        assert!(d.workspace.is_managed());
        assert_eq!(d.owner, Principal::User("john.doe@company.com".into()));
        assert_eq!(d.developers, Principal::Group("dp-devs".into()));
        assert_eq!(d.resource_kinds(), vec![ResourceKind::Repo, ResourceKind::Pipeline]);
        assert_eq!(
            d.resources[1],
            ResourceSpec::Pipeline {
                name: "ingest".into()
            }
        );
        Ok(())
    }

    #[test]
    fn test_unknown_template() {
        let err = resolver().resolve(&raw("urn:dmb:utm:airflow-template:1.0.0")).err();
        assert_eq!(
            err,
            Some(ResolutionError::UnknownTemplate("urn:dmb:utm:airflow-template:1.0.0".into()))
        );
    }

    #[test]
    fn test_declared_kind_must_match_template() {
        let mut input = raw("urn:dmb:utm:databricks-workload-job-template:0.1.0");
        input.kind = Some("dlt".into());
        assert!(matches!(
            resolver().resolve(&input),
            Err(ResolutionError::KindMismatch { .. })
        ));

        input.kind = Some("JOB".into());
        assert!(resolver().resolve(&input).is_ok());
    }

    #[test]
    fn test_missing_principals() {
        let mut input = raw("urn:dmb:utm:databricks-workload-job-template:0.1.0");
        input.developer_group = "  ".into();
        assert!(matches!(
            resolver().resolve(&input),
            Err(ResolutionError::MissingPrincipal(_))
        ));

        let mut input = raw("urn:dmb:utm:databricks-workload-job-template:0.1.0");
        input.developer_group = "user:someone_company.com".into();
        assert!(matches!(
            resolver().resolve(&input),
            Err(ResolutionError::InvalidPrincipal(_))
        ));
    }

    #[test]
    fn test_workflow_adds_one_pipeline_per_task() -> anyhow::Result<()> {
        let mut input = raw("urn:dmb:utm:databricks-workload-workflow-template:0.1.0");
        input.specific.job_name = Some("nightly".into());
        input.specific.pipeline_tasks = vec!["bronze".into(), "silver".into(), "bronze".into()];

        let d = resolver().resolve(&input)?;
        assert_eq!(
            d.resources,
            vec![
                ResourceSpec::Job {
                    name: "nightly".into()
                },
                ResourceSpec::Pipeline {
                    name: "bronze".into()
                },
                ResourceSpec::Pipeline {
                    name: "silver".into()
                },
            ]
        );
        assert_eq!(d.resource_kinds(), vec![ResourceKind::Job, ResourceKind::Pipeline]);
        Ok(())
    }

    #[test]
    fn test_output_port_requires_table() {
        let input = raw("urn:dmb:utm:databricks-outputport-template:0.0.0");
        assert_eq!(
            resolver().resolve(&input).err(),
            Some(ResolutionError::MissingField {
                kind: ComponentKind::OutputPort,
                field: "specific.table",
            })
        );
    }

    #[test]
    fn test_half_declared_repo_is_rejected() {
        let mut input = raw("urn:dmb:utm:databricks-workload-job-template:0.1.0");
        input.specific.repo_path = Some("/Repos/sales/ingest".into());
        assert!(matches!(
            resolver().resolve(&input),
            Err(ResolutionError::MissingField {
                field: "specific.gitRepoUrl",
                ..
            })
        ));
    }

    #[test]
    fn test_existing_workspace_url() -> anyhow::Result<()> {
        let mut input = raw("urn:dmb:utm:databricks-workload-job-template:0.1.0");
        input.workspace = "https://adb-1234.5.azuredatabricks.net".into();
        let d = resolver().resolve(&input)?;
        assert!(!d.workspace.is_managed());
        Ok(())
    }
}
