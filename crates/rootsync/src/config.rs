//! Configuration for rootsync

use crate::error::{Result, RootsyncError};
use crate::gateway::ContentRoot;
use crate::paths::NormalizedPath;
use crate::types::RoleKind;
use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;
use std::time::Duration;

/// Per-workspace configuration file name.
pub const CONFIG_FILE: &str = "rootsync.toml";

/// A module whose content root owns a directory subtree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRootConfig {
    pub name: String,
    /// Workspace-relative; `/` or empty is the workspace itself.
    pub path: String,
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootsyncConfig {
    /// Listing file, workspace-relative
    #[serde(default = "default_listing_file")]
    pub listing_file: String,

    /// Role given to every listing entry
    #[serde(default)]
    pub default_role: RoleKind,

    /// Managed set location, workspace-relative
    #[serde(default = "default_state_file")]
    pub state_file: String,

    /// Role model location, workspace-relative
    #[serde(default = "default_model_file")]
    pub model_file: String,

    /// Quiet period before a batch of changes is handled
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Content roots; empty means a single root at the workspace
    #[serde(default)]
    pub content_roots: Vec<ContentRootConfig>,
}

fn default_listing_file() -> String {
    "source_dirs".to_string()
}

fn default_state_file() -> String {
    ".rootsync/state.json".to_string()
}

fn default_model_file() -> String {
    ".rootsync/roles.json".to_string()
}

fn default_debounce_ms() -> u64 {
    200
}

impl Default for RootsyncConfig {
    fn default() -> Self {
        Self {
            listing_file: default_listing_file(),
            default_role: RoleKind::default(),
            state_file: default_state_file(),
            model_file: default_model_file(),
            debounce_ms: default_debounce_ms(),
            content_roots: Vec::new(),
        }
    }
}

impl RootsyncConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: RootsyncConfig =
            toml::from_str(&content).map_err(|e| RootsyncError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| RootsyncError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load `rootsync.toml` from `workspace`, falling back to defaults when absent.
    pub fn load_for_workspace(workspace: &Path) -> Result<Self> {
        let path = workspace.join(CONFIG_FILE);
        match Self::load(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded configuration");
                Ok(config)
            }
            Err(RootsyncError::Io(e)) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }

    pub fn listing(&self) -> NormalizedPath {
        NormalizedPath::new(&self.listing_file)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Content roots anchored at `workspace`.
    pub fn content_roots_at(&self, workspace: &Path) -> Vec<ContentRoot> {
        if self.content_roots.is_empty() {
            let name = workspace
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "workspace".to_string());
            return vec![ContentRoot::new(name, workspace)];
        }
        self.content_roots
            .iter()
            .map(|root| {
                let rel = NormalizedPath::new(&root.path);
                let path = rel.segments().fold(workspace.to_path_buf(), |acc, s| acc.join(s));
                ContentRoot::new(root.name.clone(), path)
            })
            .collect()
    }
}
