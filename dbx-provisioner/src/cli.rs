// dbx-provisioner/src/cli.rs
//
// Single source of truth for all CLI definitions (Clap structs).

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use dbx_provisioner_core::infrastructure::config::DEFAULT_CONFIG_PATH;
use dbx_provisioner_core::infrastructure::state::DEFAULT_STATE_DIR;

#[derive(Parser)]
#[command(name = "dbx-provisioner")]
#[command(about = "Provisions Azure Databricks workspaces, permissions and Git linkage from component descriptors", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Application settings (YAML)
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Directory holding the recorded runs
    #[arg(long, global = true, default_value = DEFAULT_STATE_DIR)]
    pub state_dir: PathBuf,

    /// Debug logging (RUST_LOG wins when set)
    #[arg(long, short, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 🔎 Validates a descriptor and prints what it resolves to (offline)
    Resolve {
        #[arg(long, short)]
        descriptor: PathBuf,
    },

    /// 📋 Prints the permission assignments a descriptor would receive (offline)
    Plan {
        #[arg(long, short)]
        descriptor: PathBuf,
    },

    /// 🚀 Provisions one or more components (workspace, permissions, git)
    Provision {
        /// Repeat to provision several components concurrently
        #[arg(long, short, required = true, num_args = 1..)]
        descriptor: Vec<PathBuf>,
    },

    /// 🧹 Tears a component down
    Unprovision {
        #[arg(long, short)]
        descriptor: PathBuf,

        /// Also delete the Git repo checkout
        #[arg(long, default_value = "false")]
        remove_data: bool,

        /// Leave a managed workspace in place
        #[arg(long, default_value = "false")]
        keep_workspace: bool,
    },

    /// 🔐 Replaces the consumers allowed to read an output port's table
    UpdateAcl {
        #[arg(long, short)]
        descriptor: PathBuf,

        /// `user:<id>` or `group:<name>`; repeat for several. None revokes every consumer.
        #[arg(long, short, num_args = 1..)]
        consumer: Vec<String>,
    },

    /// 📊 Shows the last recorded run of a component
    Status {
        #[arg(long, short)]
        component: String,

        /// Print the raw record as JSON
        #[arg(long, default_value = "false")]
        json: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::{Result, bail};
    use clap::Parser;

    #[test]
    fn test_cli_parse_resolve_defaults() -> Result<()> {
        let args = Cli::parse_from(["dbx-provisioner", "resolve", "--descriptor", "dp.yaml"]);
        assert_eq!(args.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(args.state_dir, PathBuf::from(DEFAULT_STATE_DIR));
        assert!(!args.verbose);
        match args.command {
            Commands::Resolve { descriptor } => {
                assert_eq!(descriptor.to_string_lossy(), "dp.yaml");
                Ok(())
            }
            _ => bail!("Expected Resolve command"),
        }
    }

    #[test]
    fn test_cli_parse_provision_many() -> Result<()> {
        let args = Cli::parse_from([
            "dbx-provisioner",
            "provision",
            "-d",
            "a.yaml",
            "-d",
            "b.yaml",
            "--config",
            "/etc/dbx.yaml",
            "--verbose",
        ]);
        assert_eq!(args.config.to_string_lossy(), "/etc/dbx.yaml");
        assert!(args.verbose);
        match args.command {
            Commands::Provision { descriptor } => {
                assert_eq!(descriptor.len(), 2);
                Ok(())
            }
            _ => bail!("Expected Provision command"),
        }
    }

    #[test]
    fn test_cli_parse_unprovision_flags() -> Result<()> {
        let args = Cli::parse_from([
            "dbx-provisioner",
            "unprovision",
            "--descriptor",
            "dp.yaml",
            "--remove-data",
            "--state-dir",
            "/tmp/runs",
        ]);
        assert_eq!(args.state_dir.to_string_lossy(), "/tmp/runs");
        match args.command {
            Commands::Unprovision {
                remove_data,
                keep_workspace,
                ..
            } => {
                assert!(remove_data);
                assert!(!keep_workspace);
                Ok(())
            }
            _ => bail!("Expected Unprovision command"),
        }
    }

    #[test]
    fn test_cli_parse_update_acl_consumers() -> Result<()> {
        let args = Cli::parse_from([
            "dbx-provisioner",
            "update-acl",
            "-d",
            "port.json",
            "--consumer",
            "group:analysts",
            "-c",
            "user:jane.roe_company.com",
        ]);
        match args.command {
            Commands::UpdateAcl { descriptor, consumer } => {
                assert_eq!(descriptor.to_string_lossy(), "port.json");
                assert_eq!(consumer, vec!["group:analysts", "user:jane.roe_company.com"]);
                Ok(())
            }
            _ => bail!("Expected UpdateAcl command"),
        }
    }

    #[test]
    fn test_cli_update_acl_without_consumers() -> Result<()> {
        let args = Cli::parse_from(["dbx-provisioner", "update-acl", "-d", "port.json"]);
        match args.command {
            Commands::UpdateAcl { consumer, .. } => {
                assert!(consumer.is_empty());
                Ok(())
            }
            _ => bail!("Expected UpdateAcl command"),
        }
    }

    #[test]
    fn test_cli_provision_requires_descriptor() {
        assert!(Cli::try_parse_from(["dbx-provisioner", "provision"]).is_err());
    }

    #[test]
    fn test_cli_parse_status() -> Result<()> {
        let args = Cli::parse_from(["dbx-provisioner", "status", "--component", "urn:dp:sales", "--json"]);
        match args.command {
            Commands::Status { component, json } => {
                assert_eq!(component, "urn:dp:sales");
                assert!(json);
                Ok(())
            }
            _ => bail!("Expected Status command"),
        }
    }
}
