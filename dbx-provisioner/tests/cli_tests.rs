use anyhow::{Context, Result};
use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::path::PathBuf;
use std::process::Command;
use tempfile::TempDir;

/// Scratch directory with the shipped settings and demo descriptors copied in.
struct CliTestEnv {
    _tmp: TempDir,
    root: PathBuf,
}

impl CliTestEnv {
    fn new() -> Result<Self> {
        let tmp = tempfile::tempdir()?;
        let repo_root = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .parent()
            .context("Workspace root not found")?
            .to_path_buf();

        let root = tmp.path().to_path_buf();
        std::fs::create_dir_all(root.join("config"))?;
        std::fs::copy(
            repo_root.join("config/application.yaml"),
            root.join("config/application.yaml"),
        )?;
        for demo in ["sales-ingest-dlt.yaml", "finance-workflow.yaml", "sales-orders-output-port.json"] {
            std::fs::copy(repo_root.join("demos").join(demo), root.join(demo))?;
        }

        Ok(Self { _tmp: tmp, root })
    }

    fn write(&self, name: &str, content: &str) -> Result<PathBuf> {
        let path = self.root.join(name);
        std::fs::write(&path, content)?;
        Ok(path)
    }

    fn dbx(&self) -> Command {
        let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("dbx-provisioner"));
        cmd.current_dir(&self.root);
        for key in [
            "DBX_AZURE_SUBSCRIPTION_ID",
            "DBX_AZURE_RESOURCE_GROUP",
            "DBX_AZURE_REGION",
            "DBX_AZURE_SKU",
            "DBX_GIT_PROVIDER",
        ] {
            cmd.env_remove(key);
        }
        cmd
    }
}

#[test]
fn test_resolve_prints_managed_dlt_component() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args(["resolve", "--descriptor", "sales-ingest-dlt.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("urn:dmb:cmp:sales:1:ingest"))
        .stdout(predicate::str::contains("sales-ingest"))
        .stdout(predicate::str::contains("john.doe@company.com"))
        .stdout(predicate::str::contains("Descriptor is valid"));
    Ok(())
}

#[test]
fn test_resolve_works_without_settings_file() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args([
            "resolve",
            "--config",
            "missing.yaml",
            "--descriptor",
            "sales-orders-output-port.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("sales.gold.orders"));
    Ok(())
}

#[test]
fn test_resolve_rejects_unknown_template() -> Result<()> {
    let env = CliTestEnv::new()?;
    env.write(
        "bad.yaml",
        r#"
id: "urn:dmb:cmp:sales:1:mystery"
useCaseTemplateId: "urn:dmb:utm:something-else:1.0.0"
workspace: "sales-ws"
dataProductOwner: "user:john.doe_company.com"
devGroup: "sales-devs"
"#,
    )?;

    env.dbx()
        .args(["resolve", "--descriptor", "bad.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is invalid"));
    Ok(())
}

#[test]
fn test_resolve_rejects_user_as_developer_group() -> Result<()> {
    let env = CliTestEnv::new()?;
    env.write(
        "user-devs.yaml",
        r#"
id: "urn:dmb:cmp:sales:1:ingest"
useCaseTemplateId: "urn:dmb:utm:databricks-workload-job-template"
workspace: "sales-ws"
dataProductOwner: "user:john.doe_company.com"
devGroup: "user:jane.roe_company.com"
"#,
    )?;

    env.dbx()
        .args(["resolve", "--descriptor", "user-devs.yaml"])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn test_plan_applies_configured_matrix() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args(["plan", "--descriptor", "sales-ingest-dlt.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("CAN_EDIT"))
        .stdout(predicate::str::contains("CAN_RUN"))
        .stdout(predicate::str::contains("group:sales-devs"))
        .stdout(predicate::str::contains("direct assignments removed"));
    Ok(())
}

#[test]
fn test_plan_leaves_existing_workspace_rbac_alone() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args(["plan", "--descriptor", "finance-workflow.yaml"])
        .assert()
        .success()
        .stdout(predicate::str::contains("ledger-silver"))
        .stdout(predicate::str::contains("existing workspace, left untouched"));
    Ok(())
}

#[test]
fn test_status_without_record_fails() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args(["status", "--component", "urn:dmb:cmp:sales:1:ingest"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No recorded run"));
    Ok(())
}

#[test]
fn test_status_prints_recorded_run() -> Result<()> {
    let env = CliTestEnv::new()?;
    std::fs::create_dir_all(env.root.join(".dbx-provisioner"))?;
    env.write(
        ".dbx-provisioner/runs.json",
        r#"{
  "runs": {
    "urn:dmb:cmp:sales:1:ingest": {
      "component_id": "urn:dmb:cmp:sales:1:ingest",
      "fingerprint": "f-1",
      "state": { "state": "failed", "stage": "git" },
      "stages": [
        { "stage": "git", "status": "failed", "detail": "credentials rejected" }
      ],
      "updated_at": "2026-01-05T10:00:00Z"
    }
  }
}"#,
    )?;

    env.dbx()
        .args(["status", "--component", "urn:dmb:cmp:sales:1:ingest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Failed(git)"))
        .stdout(predicate::str::contains("credentials rejected"));
    Ok(())
}

#[test]
fn test_update_acl_requires_settings_file() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args([
            "update-acl",
            "--config",
            "nowhere.yaml",
            "--descriptor",
            "sales-orders-output-port.json",
            "--consumer",
            "group:analysts",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration not found"));
    Ok(())
}

#[test]
fn test_provision_requires_settings_file() -> Result<()> {
    let env = CliTestEnv::new()?;

    env.dbx()
        .args([
            "provision",
            "--config",
            "nowhere.yaml",
            "--descriptor",
            "sales-ingest-dlt.yaml",
        ])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Configuration not found"));
    Ok(())
}
