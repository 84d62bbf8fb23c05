//! Directory Role Gateway
//!
//! The gateway is the only component allowed to change role tags. Every
//! operation is scoped to the content root that owns the directory; a
//! directory no content root owns cannot be tagged.

use crate::error::{Result, RootsyncError};
use crate::types::RoleKind;
use crate::workspace::FileHandle;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

/// Role mutation capability of the host project model.
pub trait RoleGateway {
    /// Tag `dir` with `role`. A no-op when the tag is already present.
    ///
    /// Fails with [`RootsyncError::OwnerNotFound`] when no content root owns `dir`.
    fn add_role(&mut self, dir: &FileHandle, role: RoleKind) -> Result<()>;

    /// Remove `role` from `dir`. A no-op when the tag is absent.
    fn remove_role(&mut self, dir: &FileHandle, role: RoleKind) -> Result<()>;

    /// Every tag held by the content root owning `dir`.
    fn list_roles(&self, dir: &FileHandle) -> Result<Vec<(RoleKind, PathBuf)>>;
}

/// A module's content root: a directory subtree and the role tags inside it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRoot {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub tags: BTreeSet<(RoleKind, PathBuf)>,
}

impl ContentRoot {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            tags: BTreeSet::new(),
        }
    }

    /// True when `dir` is this root or lies beneath it.
    ///
    /// The check is lexical, so a path with `..` components is never owned.
    pub fn owns(&self, dir: &Path) -> bool {
        dir.starts_with(&self.path) && !dir.components().any(|c| c == Component::ParentDir)
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ModelFile {
    content_roots: Vec<ContentRoot>,
}

/// In-process project model implementing [`RoleGateway`].
///
/// When file-backed, every mutation is committed to disk before the call
/// returns, so one add/remove is one add-then-commit sequence.
#[derive(Debug, Default)]
pub struct ContentRootModel {
    roots: Vec<ContentRoot>,
    store: Option<PathBuf>,
}

impl ContentRootModel {
    /// Purely in-memory model.
    pub fn new(roots: Vec<ContentRoot>) -> Self {
        Self { roots, store: None }
    }

    /// Load the model from `store`, with `seed` as the authoritative list of
    /// content roots.
    ///
    /// Stored roots whose path is still in `seed` keep their tags; roots no
    /// longer in `seed` are dropped together with their tags, and new roots
    /// start untagged.
    pub fn open(store: &Path, seed: Vec<ContentRoot>) -> Result<Self> {
        let mut stored = match fs::read_to_string(store) {
            Ok(content) => serde_json::from_str::<ModelFile>(&content)?.content_roots,
            Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };

        let roots: Vec<ContentRoot> = seed
            .into_iter()
            .map(|mut root| {
                if let Some(i) = stored.iter().position(|r| r.path == root.path) {
                    root.tags = stored.swap_remove(i).tags;
                }
                root
            })
            .collect();
        for dropped in &stored {
            tracing::info!(
                name = %dropped.name,
                path = %dropped.path.display(),
                tags = dropped.tags.len(),
                "Content root no longer configured; dropped"
            );
        }

        let model = Self {
            roots,
            store: Some(store.to_path_buf()),
        };
        if !stored.is_empty() {
            model.commit()?;
        }
        Ok(model)
    }

    pub fn content_roots(&self) -> &[ContentRoot] {
        &self.roots
    }

    /// Every tag across all content roots.
    pub fn all_tags(&self) -> impl Iterator<Item = &(RoleKind, PathBuf)> {
        self.roots.iter().flat_map(|r| r.tags.iter())
    }

    pub fn has_role(&self, dir: &Path, role: RoleKind) -> bool {
        self.owner(dir)
            .map(|i| self.roots[i].tags.contains(&(role, dir.to_path_buf())))
            .unwrap_or(false)
    }

    /// Move tags at or below `from` so they follow a renamed directory.
    ///
    /// This is the host's reaction to a rename, not a reconciliation step:
    /// tags keep pointing at the directory, wherever it now lives.
    pub fn follow_move(&mut self, from: &Path, to: &Path) -> Result<usize> {
        let before = self.roots.clone();
        let mut moved: Vec<(RoleKind, PathBuf)> = Vec::new();
        for root in &mut self.roots {
            let (hit, keep): (BTreeSet<_>, BTreeSet<_>) = std::mem::take(&mut root.tags)
                .into_iter()
                .partition(|(_, path)| path.starts_with(from));
            root.tags = keep;
            for (role, path) in hit {
                let suffix = path.strip_prefix(from).unwrap_or_else(|_| Path::new(""));
                moved.push((role, to.join(suffix)));
            }
        }

        let count = moved.len();
        for (role, path) in moved {
            match self.owner(&path) {
                Some(i) => {
                    self.roots[i].tags.insert((role, path));
                }
                None => {
                    tracing::warn!(path = %path.display(), role = %role, "Moved tag left every content root; dropped");
                }
            }
        }
        if count > 0 {
            if let Err(e) = self.commit() {
                self.roots = before;
                return Err(e);
            }
        }
        Ok(count)
    }

    /// Index of the deepest content root owning `dir`.
    fn owner(&self, dir: &Path) -> Option<usize> {
        self.roots
            .iter()
            .enumerate()
            .filter(|(_, root)| root.owns(dir))
            .max_by_key(|(_, root)| root.path.components().count())
            .map(|(i, _)| i)
    }

    fn owner_or_err(&self, dir: &Path) -> Result<usize> {
        self.owner(dir)
            .ok_or_else(|| RootsyncError::OwnerNotFound(dir.to_path_buf()))
    }

    fn commit(&self) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        if let Some(parent) = store.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = ModelFile {
            content_roots: self.roots.clone(),
        };
        let tmp = store.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_string_pretty(&file)?)?;
        fs::rename(&tmp, store)?;
        Ok(())
    }
}

impl RoleGateway for ContentRootModel {
    fn add_role(&mut self, dir: &FileHandle, role: RoleKind) -> Result<()> {
        let i = self.owner_or_err(&dir.path)?;
        let tag = (role, dir.path.clone());
        if self.roots[i].tags.insert(tag.clone()) {
            if let Err(e) = self.commit() {
                self.roots[i].tags.remove(&tag);
                return Err(e);
            }
        }
        Ok(())
    }

    fn remove_role(&mut self, dir: &FileHandle, role: RoleKind) -> Result<()> {
        let i = self.owner_or_err(&dir.path)?;
        let tag = (role, dir.path.clone());
        if self.roots[i].tags.remove(&tag) {
            if let Err(e) = self.commit() {
                self.roots[i].tags.insert(tag);
                return Err(e);
            }
        }
        Ok(())
    }

    fn list_roles(&self, dir: &FileHandle) -> Result<Vec<(RoleKind, PathBuf)>> {
        let i = self.owner_or_err(&dir.path)?;
        Ok(self.roots[i].tags.iter().cloned().collect())
    }
}
