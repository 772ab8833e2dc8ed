// dbx-provisioner-core/src/infrastructure/error.rs

use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Debug, Diagnostic)]
pub enum InfrastructureError {
    // --- FILESYSTEM (IO) ---
    #[error("File System Error: {0}")]
    #[diagnostic(
        code(dbx::infra::io),
        help("Check file permissions or path validity.")
    )]
    Io(#[from] std::io::Error),

    // --- CONFIG / YAML / JSON ---
    #[error("YAML Parsing Error: {0}")]
    #[diagnostic(
        code(dbx::infra::yaml),
        help("Check your YAML syntax (indentation, types).")
    )]
    YamlError(#[from] serde_yaml::Error),

    #[error("JSON Error: {0}")]
    #[diagnostic(code(dbx::infra::json))]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    #[diagnostic(code(dbx::infra::config))]
    ConfigError(String),

    #[error("Configuration not found at '{0}'")]
    #[diagnostic(
        code(dbx::infra::config_missing),
        help("Pass --config <file> or create config/application.yaml.")
    )]
    ConfigNotFound(String),

    // --- CREDENTIALS ---
    #[error("Missing credential: {0}")]
    #[diagnostic(
        code(dbx::infra::credentials),
        help("Credentials are read from the environment (AZURE_*, PERMISSIONS_AUTH_*, GIT_*).")
    )]
    MissingCredential(String),

    // --- HTTP ---
    #[error("HTTP client Error: {0}")]
    #[diagnostic(code(dbx::infra::http))]
    Http(#[from] reqwest::Error),
}
