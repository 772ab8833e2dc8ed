// dbx-provisioner-core/src/domain/template.rs

use serde::{Deserialize, Serialize};

use crate::domain::descriptor::ComponentKind;

/// Removes the version suffix of a use case template URN.
///
/// `urn:dmb:utm:databricks-workload-job-template:0.1.0` becomes
/// `urn:dmb:utm:databricks-workload-job-template`. The last segment is only
/// dropped when it looks like a version, so ids that are already versionless
/// are left as they are.
pub fn versionless_template_id(raw: &str) -> String {
    let cleaned = raw.replace('"', "");
    let cleaned = cleaned.trim();
    match cleaned.rsplit_once(':') {
        Some((base, suffix)) if is_version(suffix) => base.trim().to_string(),
        _ => cleaned.to_string(),
    }
}

fn is_version(segment: &str) -> bool {
    let s = segment.trim();
    let s = s.strip_prefix('v').unwrap_or(s);
    s.chars().next().is_some_and(|c| c.is_ascii_digit())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-')
}

/// The four configured template-id sets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UseCaseTemplateIds {
    #[serde(default = "default_job")]
    pub job: Vec<String>,
    #[serde(default = "default_dlt")]
    pub dlt: Vec<String>,
    #[serde(default = "default_workflow")]
    pub workflow: Vec<String>,
    #[serde(rename = "outputPort", alias = "output_port", default = "default_output_port")]
    pub output_port: Vec<String>,
}

fn default_job() -> Vec<String> {
    vec!["urn:dmb:utm:databricks-workload-job-template".to_string()]
}
fn default_dlt() -> Vec<String> {
    vec!["urn:dmb:utm:databricks-workload-dlt-template".to_string()]
}
fn default_workflow() -> Vec<String> {
    vec!["urn:dmb:utm:databricks-workload-workflow-template".to_string()]
}
fn default_output_port() -> Vec<String> {
    vec!["urn:dmb:utm:databricks-outputport-template".to_string()]
}

impl Default for UseCaseTemplateIds {
    fn default() -> Self {
        Self {
            job: default_job(),
            dlt: default_dlt(),
            workflow: default_workflow(),
            output_port: default_output_port(),
        }
    }
}

impl UseCaseTemplateIds {
    /// Classifies a (possibly versioned) template id. Configured ids are
    /// compared versionless too, so a set may list either form.
    pub fn classify(&self, template_id: &str) -> Option<ComponentKind> {
        let wanted = versionless_template_id(template_id);
        let sets = [
            (ComponentKind::Job, &self.job),
            (ComponentKind::Dlt, &self.dlt),
            (ComponentKind::Workflow, &self.workflow),
            (ComponentKind::OutputPort, &self.output_port),
        ];
        sets.into_iter()
            .find(|(_, ids)| {
                ids.iter()
                    .any(|id| versionless_template_id(id).eq_ignore_ascii_case(&wanted))
            })
            .map(|(kind, _)| kind)
    }
}
