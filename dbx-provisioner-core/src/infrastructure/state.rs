// dbx-provisioner-core/src/infrastructure/state.rs

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::domain::lifecycle::ProvisionRecord;
use crate::infrastructure::error::InfrastructureError;
use crate::infrastructure::fs::atomic_write;

pub const DEFAULT_STATE_DIR: &str = ".dbx-provisioner";
const STATE_FILE: &str = "runs.json";

#[derive(Debug, Default, Serialize, Deserialize)]
struct RunsFile {
    #[serde(default)]
    runs: BTreeMap<String, ProvisionRecord>,
}

/// Component id -> last recorded run, kept in `<state-dir>/runs.json`.
#[derive(Debug, Clone)]
pub struct RunStateStore {
    path: PathBuf,
}

impl RunStateStore {
    pub fn new(state_dir: impl AsRef<Path>) -> Self {
        Self {
            path: state_dir.as_ref().join(STATE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A missing file is an empty store.
    pub fn load(&self) -> Result<BTreeMap<String, ProvisionRecord>, InfrastructureError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        let file: RunsFile = serde_json::from_str(&content)?;
        Ok(file.runs)
    }

    pub fn get(&self, component_id: &str) -> Result<Option<ProvisionRecord>, InfrastructureError> {
        Ok(self.load()?.remove(component_id))
    }

    #[instrument(skip(self, records), fields(path = ?self.path, count = records.len()))]
    pub fn put_all(&self, records: &[ProvisionRecord]) -> Result<(), InfrastructureError> {
        let mut runs = self.load()?;
        for record in records {
            runs.insert(record.component_id.clone(), record.clone());
        }
        let content = serde_json::to_string_pretty(&RunsFile { runs })?;
        atomic_write(&self.path, content)?;
        debug!("Run state saved");
        Ok(())
    }

    pub fn put(&self, record: &ProvisionRecord) -> Result<(), InfrastructureError> {
        self.put_all(std::slice::from_ref(record))
    }
}
