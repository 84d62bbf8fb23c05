//! Persisted State Store
//!
//! Holds the managed set across restarts. The engine reads it once per
//! reconciliation call and writes it once, at the end.

use crate::error::{Result, RootsyncError};
use crate::types::{DescriptorSet, ManagedSet};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// State format version - bump when format changes
const STATE_VERSION: u32 = 1;

/// Identity the persisted state is keyed by.
pub const COMPONENT_NAME: &str = "rootsync";

/// Durable storage for the managed set.
pub trait StateStore {
    /// The managed set as of the last successful reconciliation; empty at first start.
    fn load(&self) -> Result<ManagedSet>;

    /// Replace the managed set wholesale.
    fn save(&mut self, managed: &ManagedSet) -> Result<()>;
}

/// On-disk state document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateFile {
    pub version: u32,
    pub component: String,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub descriptors: DescriptorSet,
}

/// [`StateStore`] persisted as a JSON document.
///
/// Writes go to a sibling temp file that is renamed over the target, so a
/// crash mid-save leaves the previous state intact.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    path: PathBuf,
}

impl JsonStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Option<StateFile>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state: StateFile = serde_json::from_str(&content)?;
        if state.component != COMPONENT_NAME {
            return Err(RootsyncError::InvalidState(format!(
                "State file {} belongs to '{}'",
                self.path.display(),
                state.component
            )));
        }
        if state.version > STATE_VERSION {
            return Err(RootsyncError::InvalidState(format!(
                "State file {} has version {}, newest supported is {}",
                self.path.display(),
                state.version,
                STATE_VERSION
            )));
        }
        Ok(Some(state))
    }
}

impl StateStore for JsonStateStore {
    fn load(&self) -> Result<ManagedSet> {
        Ok(self.read()?.map(|s| s.descriptors).unwrap_or_default())
    }

    fn save(&mut self, managed: &ManagedSet) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let state = StateFile {
            version: STATE_VERSION,
            component: COMPONENT_NAME.to_string(),
            updated_at: Utc::now(),
            descriptors: managed.clone(),
        };
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&state)?)?;
        fs::rename(&tmp, &self.path)?;
        tracing::debug!(path = %self.path.display(), count = managed.len(), "Managed set persisted");
        Ok(())
    }
}

/// [`StateStore`] that lives only as long as the process.
#[derive(Debug, Clone, Default)]
pub struct MemoryStateStore {
    managed: ManagedSet,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(managed: ManagedSet) -> Self {
        Self { managed }
    }
}

impl StateStore for MemoryStateStore {
    fn load(&self) -> Result<ManagedSet> {
        Ok(self.managed.clone())
    }

    fn save(&mut self, managed: &ManagedSet) -> Result<()> {
        self.managed = managed.clone();
        Ok(())
    }
}
