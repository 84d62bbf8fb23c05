//! Shared fixtures for rootsync integration tests

#![allow(dead_code)]

use rootsync::{
    ChangeEvent, ChangeRouter, ContentRoot, ContentRootModel, FileHandle, JsonStateStore,
    ManagedSet, Reconciler, RoleGateway, RoleKind, RootsyncError, RouterStats, StateStore,
};
use rootsync::{FileSystem, LocalWorkspace, NormalizedPath};
use std::fs;
use std::io;
use std::path::PathBuf;
use tempfile::TempDir;

pub const LISTING: &str = "source_dirs";

/// Wraps the role model and records every mutation request.
#[derive(Debug, Default)]
pub struct RecordingGateway {
    pub model: ContentRootModel,
    pub adds: Vec<(RoleKind, String)>,
    pub removes: Vec<(RoleKind, String)>,
    /// Paths (workspace-relative) whose mutation fails with an I/O error.
    pub fail_on: Option<String>,
}

impl RecordingGateway {
    pub fn new(model: ContentRootModel) -> Self {
        Self {
            model,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.adds.len() + self.removes.len()
    }

    pub fn reset(&mut self) {
        self.adds.clear();
        self.removes.clear();
    }

    fn check(&self, dir: &FileHandle) -> rootsync::Result<()> {
        match &self.fail_on {
            Some(path) if dir.rel.as_str() == path => Err(RootsyncError::Io(io::Error::new(
                io::ErrorKind::PermissionDenied,
                "model is read-only",
            ))),
            _ => Ok(()),
        }
    }
}

impl RoleGateway for RecordingGateway {
    fn add_role(&mut self, dir: &FileHandle, role: RoleKind) -> rootsync::Result<()> {
        self.check(dir)?;
        self.adds.push((role, dir.rel.as_str().to_string()));
        self.model.add_role(dir, role)
    }

    fn remove_role(&mut self, dir: &FileHandle, role: RoleKind) -> rootsync::Result<()> {
        self.check(dir)?;
        self.removes.push((role, dir.rel.as_str().to_string()));
        self.model.remove_role(dir, role)
    }

    fn list_roles(&self, dir: &FileHandle) -> rootsync::Result<Vec<(RoleKind, PathBuf)>> {
        self.model.list_roles(dir)
    }
}

pub type TestReconciler = Reconciler<LocalWorkspace, RecordingGateway, JsonStateStore>;

/// A workspace in a temp directory, driven the way a host would drive it.
pub struct TestEnv {
    /// Temp directory (cleaned up on drop)
    _temp: TempDir,
    /// Canonical workspace root
    pub root: PathBuf,
    /// State file outside the workspace
    pub state_path: PathBuf,
    pub engine: TestReconciler,
    pub router: ChangeRouter,
}

impl TestEnv {
    pub fn new() -> Self {
        let temp = TempDir::new().expect("Failed to create temp dir");
        let ws_dir = temp.path().join("ws");
        fs::create_dir_all(&ws_dir).expect("Failed to create workspace dir");
        let state_path = temp.path().join("state").join("state.json");

        let fs = LocalWorkspace::open(&ws_dir).expect("Failed to open workspace");
        let root = fs.root().to_path_buf();
        let model = ContentRootModel::new(vec![ContentRoot::new("ws", &root)]);
        let engine = Reconciler::new(
            fs,
            RecordingGateway::new(model),
            JsonStateStore::new(&state_path),
            NormalizedPath::new(LISTING),
        );

        Self {
            _temp: temp,
            root,
            state_path,
            engine,
            router: ChangeRouter::new(NormalizedPath::new(LISTING)),
        }
    }

    /// Rebuild the engine over the same workspace and state file, as after a restart.
    pub fn restart(&mut self) {
        let fs = LocalWorkspace::open(&self.root).expect("Failed to reopen workspace");
        let mut gateway = RecordingGateway::new(ContentRootModel::new(Vec::new()));
        std::mem::swap(&mut gateway.model, &mut self.engine.gateway_mut().model);
        self.engine = Reconciler::new(
            fs,
            gateway,
            JsonStateStore::new(&self.state_path),
            NormalizedPath::new(LISTING),
        );
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    pub fn dispatch(&mut self, events: &[ChangeEvent]) -> RouterStats {
        self.router.dispatch(&mut self.engine, events)
    }

    /// Write the listing without notifying anyone.
    pub fn write_listing_quietly(&self, content: &str) {
        fs::write(self.path(LISTING), content).expect("Failed to write listing");
    }

    /// Write the listing and deliver the modification event.
    pub fn write_listing(&mut self, content: &str) -> RouterStats {
        self.write_listing_quietly(content);
        let event = ChangeEvent::modified_file(self.path(LISTING));
        self.dispatch(&[event])
    }

    pub fn create_dir_quietly(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).expect("Failed to create dir");
        path
    }

    /// Create a directory and deliver the creation event.
    pub fn create_dir(&mut self, rel: &str) -> RouterStats {
        let path = self.create_dir_quietly(rel);
        self.dispatch(&[ChangeEvent::created_dir(path)])
    }

    /// Rename a directory: the host moves its tags along, then the move is delivered.
    pub fn rename_dir(&mut self, from: &str, to: &str) -> RouterStats {
        let (from, to) = (self.path(from), self.path(to));
        fs::rename(&from, &to).expect("Failed to rename dir");
        self.engine
            .gateway_mut()
            .model
            .follow_move(&from, &to)
            .expect("Failed to move tags");
        self.dispatch(&[ChangeEvent::moved(from, to)])
    }

    /// Delete a directory and deliver the deletion event.
    pub fn delete_dir(&mut self, rel: &str) -> RouterStats {
        let path = self.path(rel);
        fs::remove_dir_all(&path).expect("Failed to delete dir");
        self.dispatch(&[ChangeEvent::deleted(path)])
    }

    /// Workspace-relative paths currently holding `role`, sorted.
    pub fn tagged_with(&self, role: RoleKind) -> Vec<String> {
        let mut paths: Vec<String> = self
            .engine
            .gateway()
            .model
            .all_tags()
            .filter(|(r, _)| *r == role)
            .map(|(_, path)| {
                self.engine
                    .fs()
                    .localize(path)
                    .expect("Tag outside workspace")
                    .as_str()
                    .to_string()
            })
            .collect();
        paths.sort();
        paths
    }

    pub fn source_roots(&self) -> Vec<String> {
        self.tagged_with(RoleKind::SourceRoot)
    }

    pub fn managed(&self) -> ManagedSet {
        self.engine.store().load().expect("Failed to load state")
    }

    pub fn gateway(&mut self) -> &mut RecordingGateway {
        self.engine.gateway_mut()
    }
}

/// Source-root descriptor set from relative paths.
pub fn source_roots(paths: &[&str]) -> ManagedSet {
    paths
        .iter()
        .map(|p| rootsync::RoleDescriptor::source_root(p))
        .collect()
}
