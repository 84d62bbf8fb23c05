//! A reconciliation session over one workspace on the local disk.
//!
//! Wires the configured collaborators together, runs the startup
//! reconciliation and, in watch mode, feeds debounced change batches to the
//! router until shutdown.

use crate::config::RootsyncConfig;
use crate::engine::{ReconcilePlan, ReconcileReport, Reconciler, SharedReconciler};
use crate::error::{Result, RootsyncError};
use crate::gateway::ContentRootModel;
use crate::router::{ChangeEvent, ChangeRouter, RouterStats};
use crate::state::{JsonStateStore, StateStore};
use crate::types::{ManagedSet, RoleKind};
use crate::watcher::FsWatcher;
use crate::workspace::LocalWorkspace;
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::MutexGuard;

pub type WorkspaceReconciler = Reconciler<LocalWorkspace, ContentRootModel, JsonStateStore>;

/// Snapshot for the `status` command.
#[derive(Debug, Clone, Serialize)]
pub struct Status {
    pub workspace: PathBuf,
    pub listing: String,
    pub managed: ManagedSet,
    pub tags: Vec<TagStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TagStatus {
    pub content_root: String,
    pub role: RoleKind,
    pub path: PathBuf,
}

pub struct Session {
    config: RootsyncConfig,
    root: PathBuf,
    engine: SharedReconciler<LocalWorkspace, ContentRootModel, JsonStateStore>,
    router: ChangeRouter,
}

impl Session {
    /// Open `workspace` using its `rootsync.toml`, or defaults.
    pub fn open(workspace: &Path) -> Result<Self> {
        let config = RootsyncConfig::load_for_workspace(workspace)?;
        Self::with_config(workspace, config)
    }

    pub fn with_config(workspace: &Path, config: RootsyncConfig) -> Result<Self> {
        let fs = LocalWorkspace::open(workspace)?;
        let root = fs.root().to_path_buf();

        let store = JsonStateStore::new(root.join(&config.state_file));
        let model = ContentRootModel::open(
            &root.join(&config.model_file),
            config.content_roots_at(&root),
        )?;
        let listing = config.listing();

        let engine = Reconciler::new(fs, model, store, listing.clone())
            .with_listing_role(config.default_role)
            .into_shared();

        tracing::debug!(
            workspace = %root.display(),
            listing = %listing,
            role = %config.default_role,
            "Session opened"
        );
        Ok(Self {
            config,
            root,
            engine,
            router: ChangeRouter::new(listing),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &RootsyncConfig {
        &self.config
    }

    /// Handle to the shared reconciler, for callers outside the watch loop.
    pub fn engine(&self) -> SharedReconciler<LocalWorkspace, ContentRootModel, JsonStateStore> {
        self.engine.clone()
    }

    /// Startup activity: one full reconciliation from the listing.
    pub fn startup(&self) -> Result<ReconcileReport> {
        self.lock()?.reconcile_from_listing()
    }

    pub fn plan(&self) -> Result<ReconcilePlan> {
        self.lock()?.preview()
    }

    pub fn status(&self) -> Result<Status> {
        let engine = self.lock()?;
        let managed = engine.store().load()?;
        let tags = engine
            .gateway()
            .content_roots()
            .iter()
            .flat_map(|root| {
                root.tags.iter().map(|(role, path)| TagStatus {
                    content_root: root.name.clone(),
                    role: *role,
                    path: path.clone(),
                })
            })
            .collect();
        Ok(Status {
            workspace: self.root.clone(),
            listing: self.config.listing_file.clone(),
            managed,
            tags,
        })
    }

    /// Handle one batch of changes in order.
    ///
    /// Tags held by the role model follow a moved directory before the
    /// router sees the move, the way a host project model tracks renames.
    pub fn handle_batch(&self, events: &[ChangeEvent]) -> Result<RouterStats> {
        let mut engine = self.lock()?;
        let mut stats = RouterStats::default();
        for event in events {
            if let ChangeEvent::Move { from, to } | ChangeEvent::PropertyChange { from, to } = event {
                if let Err(e) = engine.gateway_mut().follow_move(from, to) {
                    tracing::error!(from = %from.display(), to = %to.display(), error = %e, "Failed to move role tags");
                }
            }
            stats.merge(self.router.dispatch(&mut *engine, std::slice::from_ref(event)));
        }
        Ok(stats)
    }

    /// Reconcile, then follow changes until Ctrl+C.
    pub async fn watch(&self) -> Result<()> {
        self.watch_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Cannot listen for Ctrl+C");
            }
        })
        .await
    }

    /// Reconcile, then follow changes until `shutdown` resolves.
    pub async fn watch_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let report = self.startup()?;
        tracing::info!(
            added = report.added.len(),
            removed = report.removed.len(),
            "Startup reconciliation done"
        );

        let (watcher, mut batches) =
            FsWatcher::spawn(&self.root, self.config.debounce(), self.ignored_paths())?;
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested; stopping watcher");
                    break;
                }
                batch = batches.recv() => match batch {
                    Some(events) => {
                        self.handle_batch(&events)?;
                    }
                    None => {
                        tracing::warn!(root = %watcher.root().display(), "Watcher stopped unexpectedly");
                        break;
                    }
                },
            }
        }
        Ok(())
    }

    /// Our own bookkeeping files live in the workspace; their churn is not a change.
    fn ignored_paths(&self) -> Vec<PathBuf> {
        [&self.config.state_file, &self.config.model_file]
            .iter()
            .filter_map(|file| self.root.join(file.as_str()).parent().map(Path::to_path_buf))
            .filter(|dir| dir != &self.root)
            .collect()
    }

    fn lock(&self) -> Result<MutexGuard<'_, WorkspaceReconciler>> {
        self.engine
            .lock()
            .map_err(|_| RootsyncError::InvalidState("reconciler lock poisoned".to_string()))
    }
}
