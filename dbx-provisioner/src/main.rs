// dbx-provisioner/src/main.rs

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 1. Setup Logging (Tracing)
    // RUST_LOG=dbx_provisioner_core=trace dbx-provisioner provision ... for the HTTP details
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
    tracing::debug!(config = ?cli.config, state_dir = ?cli.state_dir, "CLI started");

    match cli.command {
        Commands::Resolve { descriptor } => commands::resolve::execute(&cli.config, &descriptor),
        Commands::Plan { descriptor } => commands::plan::execute(&cli.config, &descriptor),
        Commands::Provision { descriptor } => {
            commands::provision::execute(&cli.config, &cli.state_dir, descriptor).await
        }
        Commands::Unprovision {
            descriptor,
            remove_data,
            keep_workspace,
        } => {
            commands::unprovision::execute(
                &cli.config,
                &cli.state_dir,
                &descriptor,
                remove_data,
                keep_workspace,
            )
            .await
        }
        Commands::UpdateAcl { descriptor, consumer } => {
            commands::update_acl::execute(&cli.config, &descriptor, &consumer).await
        }
        Commands::Status { component, json } => {
            commands::status::execute(&cli.state_dir, &component, json)
        }
    }
}
