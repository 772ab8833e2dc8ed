// dbx-provisioner-core/src/infrastructure/config/mod.rs

pub mod settings;

pub use settings::{
    AppSettings, AzureRoleSettings, AzureSettings, DEFAULT_CONFIG_PATH, DatabricksSettings,
    EngineSettings, GitSettings, apply_env_overrides, load_settings, load_settings_or_default,
};
