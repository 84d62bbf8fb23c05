//! Error types for rootsync

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// rootsync error type
#[derive(Error, Debug)]
pub enum RootsyncError {
    #[error("Not found in workspace: {0}")]
    NotFound(String),

    #[error("Path is not within workspace: {}", .0.display())]
    OutsideWorkspace(PathBuf),

    #[error("No content root owns {}", .0.display())]
    OwnerNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Watch error: {0}")]
    Watch(#[from] notify::Error),

    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl RootsyncError {
    /// True for "resource absent", the one failure callers recover from locally.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RootsyncError>;
