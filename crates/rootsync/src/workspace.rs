//! File resolution and path localization against one workspace root.

use crate::error::{Result, RootsyncError};
use crate::paths::{normalize_absolute, NormalizedPath};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use url::Url;

/// A file or directory inside the workspace.
///
/// A handle produced by [`FileSystem::resolve`] existed when it was resolved;
/// one produced by [`FileSystem::handle`] may name a path that is already gone.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct FileHandle {
    /// Absolute location on disk
    pub path: PathBuf,
    /// Location relative to the workspace root
    pub rel: NormalizedPath,
}

impl fmt::Display for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

/// File-system capabilities the reconciliation engine consumes.
pub trait FileSystem {
    /// Resolve a workspace-relative path to an existing file.
    ///
    /// Fails with [`RootsyncError::OutsideWorkspace`] when the path climbs above
    /// the root, with [`RootsyncError::NotFound`] when it does not exist, and
    /// with [`RootsyncError::Io`] for any other failure.
    fn resolve(&self, rel: &NormalizedPath) -> Result<FileHandle>;

    /// Handle for a workspace-relative path without checking that it exists.
    fn handle(&self, rel: &NormalizedPath) -> FileHandle;

    /// Convert an absolute path to workspace-relative form.
    ///
    /// Fails with [`RootsyncError::OutsideWorkspace`] for paths outside the root.
    fn localize(&self, abs: &Path) -> Result<NormalizedPath>;

    /// Read a resolved file as UTF-8 text.
    fn read_to_string(&self, handle: &FileHandle) -> Result<String>;

    fn is_dir(&self, handle: &FileHandle) -> bool;

    /// True when `abs` is the listing file `listing`.
    fn is_listing_file(&self, abs: &Path, listing: &NormalizedPath) -> bool {
        matches!(self.localize(abs), Ok(rel) if &rel == listing)
    }
}

/// [`FileSystem`] over the local disk.
#[derive(Debug, Clone)]
pub struct LocalWorkspace {
    root: PathBuf,
}

impl LocalWorkspace {
    /// Open a workspace rooted at `root`, which must be an existing directory.
    pub fn open(root: &Path) -> Result<Self> {
        let root = root.canonicalize().map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RootsyncError::NotFound(root.display().to_string()),
            _ => RootsyncError::Io(e),
        })?;
        if !root.is_dir() {
            return Err(RootsyncError::InvalidState(format!(
                "Workspace root is not a directory: {}",
                root.display()
            )));
        }
        tracing::debug!(root = %root.display(), "Workspace opened");
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a workspace-relative path.
    pub fn expand(&self, rel: &NormalizedPath) -> PathBuf {
        rel.segments().fold(self.root.clone(), |acc, seg| acc.join(seg))
    }

    /// `file://` URL of a workspace-relative path, using the absolute root form.
    pub fn to_url(&self, rel: &str) -> Result<Url> {
        let normalized = normalize_absolute(rel);
        let path = if normalized == crate::paths::ROOT_TOKEN {
            self.root.clone()
        } else {
            self.expand(&NormalizedPath::new(&normalized))
        };
        Url::from_file_path(&path).map_err(|()| {
            RootsyncError::InvalidState(format!("Cannot build URL for {}", path.display()))
        })
    }
}

impl FileSystem for LocalWorkspace {
    fn resolve(&self, rel: &NormalizedPath) -> Result<FileHandle> {
        // Normal form only keeps `..` as leading segments.
        if rel.segments().next() == Some("..") {
            return Err(RootsyncError::OutsideWorkspace(self.expand(rel)));
        }
        let path = self.expand(rel);
        match fs::symlink_metadata(&path) {
            Ok(_) => Ok(FileHandle {
                path,
                rel: rel.clone(),
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(RootsyncError::NotFound(rel.to_string()))
            }
            Err(e) => Err(RootsyncError::Io(e)),
        }
    }

    fn handle(&self, rel: &NormalizedPath) -> FileHandle {
        FileHandle {
            path: self.expand(rel),
            rel: rel.clone(),
        }
    }

    fn localize(&self, abs: &Path) -> Result<NormalizedPath> {
        let rel = abs
            .strip_prefix(&self.root)
            .map_err(|_| RootsyncError::OutsideWorkspace(abs.to_path_buf()))?;

        let mut parts: Vec<String> = Vec::new();
        for component in rel.components() {
            match component {
                Component::Normal(seg) => parts.push(seg.to_string_lossy().into_owned()),
                Component::CurDir => {}
                Component::ParentDir => {
                    if parts.pop().is_none() {
                        return Err(RootsyncError::OutsideWorkspace(abs.to_path_buf()));
                    }
                }
                Component::RootDir | Component::Prefix(_) => {}
            }
        }
        Ok(NormalizedPath::new(&parts.join("/")))
    }

    fn read_to_string(&self, handle: &FileHandle) -> Result<String> {
        fs::read_to_string(&handle.path).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => RootsyncError::NotFound(handle.rel.to_string()),
            _ => RootsyncError::Io(e),
        })
    }

    fn is_dir(&self, handle: &FileHandle) -> bool {
        handle.path.is_dir()
    }
}
