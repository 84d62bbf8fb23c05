//! Reconciliation Engine
//!
//! Brings role tags back into agreement with the declared set:
//!
//! ```text
//! listing ──▶ declared ──┐
//!                        ├─ plan ─▶ gateway add/remove ─▶ persist declared
//! state store ─▶ managed ┘
//! ```
//!
//! The managed set, not the gateway, is the source of truth for diffing.
//! Host-side tag state can drift (a deleted directory may keep its tag), so
//! the gateway is only ever written to.

use crate::error::{Result, RootsyncError};
use crate::gateway::RoleGateway;
use crate::listing::load_listing;
use crate::paths::NormalizedPath;
use crate::state::StateStore;
use crate::types::{DeclaredSet, DescriptorSet, ManagedSet, RoleDescriptor, RoleKind};
use crate::workspace::{FileHandle, FileSystem};
use indexmap::IndexSet;
use serde::Serialize;
use std::sync::{Arc, Mutex};

/// Additions and removals for one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    /// Every declared descriptor; re-applying a present tag is a no-op.
    pub to_add: DescriptorSet,
    /// Managed descriptors no longer declared.
    pub to_remove: DescriptorSet,
}

/// Compute the plan for moving from `managed` to `declared`.
pub fn plan(declared: &DeclaredSet, managed: &ManagedSet) -> ReconcilePlan {
    ReconcilePlan {
        to_add: declared.clone(),
        to_remove: managed.difference(declared),
    }
}

/// What a full reconciliation did.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub added: Vec<RoleDescriptor>,
    pub removed: Vec<RoleDescriptor>,
    /// Declared or retired paths that do not exist.
    pub skipped_missing: Vec<RoleDescriptor>,
    /// Paths no content root owns.
    pub skipped_unowned: Vec<RoleDescriptor>,
}

impl ReconcileReport {
    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// What a rename did to the tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RenameOutcome {
    /// Managed name to unmanaged name: tags removed at the new location.
    Untagged,
    /// Unmanaged name to managed name: tags added at the new location.
    Tagged,
    /// Both or neither name is managed.
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagOp {
    Add,
    Remove,
}

enum Applied {
    Done,
    Missing,
    Unowned,
}

/// The reconciliation engine over its three collaborators.
///
/// Every entry point takes `&mut self`: one call is one critical section over
/// the gateway and the state store.
pub struct Reconciler<F, G, S> {
    fs: F,
    gateway: G,
    store: S,
    listing: NormalizedPath,
    listing_role: RoleKind,
    tagged: IndexSet<FileHandle>,
}

/// A reconciler shared between the watcher loop and other callers.
pub type SharedReconciler<F, G, S> = Arc<Mutex<Reconciler<F, G, S>>>;

impl<F, G, S> Reconciler<F, G, S>
where
    F: FileSystem,
    G: RoleGateway,
    S: StateStore,
{
    pub fn new(fs: F, gateway: G, store: S, listing: NormalizedPath) -> Self {
        Self {
            fs,
            gateway,
            store,
            listing,
            listing_role: RoleKind::SourceRoot,
            tagged: IndexSet::new(),
        }
    }

    /// Role assigned to every listing entry (default: source root).
    pub fn with_listing_role(mut self, role: RoleKind) -> Self {
        self.listing_role = role;
        self
    }

    pub fn into_shared(self) -> SharedReconciler<F, G, S> {
        Arc::new(Mutex::new(self))
    }

    pub fn listing(&self) -> &NormalizedPath {
        &self.listing
    }

    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    pub fn gateway_mut(&mut self) -> &mut G {
        &mut self.gateway
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Directories tagged by this process and not untagged since.
    pub fn tagged(&self) -> &IndexSet<FileHandle> {
        &self.tagged
    }

    /// Read the listing and reconcile against it.
    pub fn reconcile_from_listing(&mut self) -> Result<ReconcileReport> {
        let declared = self.load_declared()?;
        self.full_reconcile(declared)
    }

    /// The declared set as the listing currently reads.
    pub fn load_declared(&self) -> Result<DeclaredSet> {
        load_listing(&self.fs, &self.listing, self.listing_role)
    }

    /// Dry run: the plan a reconciliation against the listing would execute.
    pub fn preview(&self) -> Result<ReconcilePlan> {
        let declared = self.load_declared()?;
        let managed = self.store.load()?;
        Ok(plan(&declared, &managed))
    }

    /// Apply `declared` and persist it as the new managed set.
    ///
    /// Missing directories and unowned directories are skipped, yet the
    /// declared set is still persisted: skipped entries stay declared and
    /// are picked up by a later reconciliation once they can be tagged. A
    /// gateway or store failure aborts before persisting.
    pub fn full_reconcile(&mut self, declared: DeclaredSet) -> Result<ReconcileReport> {
        let managed = self.store.load()?;
        let ReconcilePlan { to_add, to_remove } = plan(&declared, &managed);
        let mut report = ReconcileReport::default();

        for descriptor in &to_add {
            match self.apply(descriptor, TagOp::Add)? {
                Applied::Done => report.added.push(descriptor.clone()),
                Applied::Missing => report.skipped_missing.push(descriptor.clone()),
                Applied::Unowned => report.skipped_unowned.push(descriptor.clone()),
            }
        }

        for descriptor in &to_remove {
            match self.apply(descriptor, TagOp::Remove)? {
                Applied::Done => report.removed.push(descriptor.clone()),
                Applied::Missing => report.skipped_missing.push(descriptor.clone()),
                Applied::Unowned => report.skipped_unowned.push(descriptor.clone()),
            }
        }

        self.store.save(&declared)?;

        tracing::info!(
            declared = declared.len(),
            added = report.added.len(),
            removed = report.removed.len(),
            missing = report.skipped_missing.len(),
            unowned = report.skipped_unowned.len(),
            "Reconciliation complete"
        );
        Ok(report)
    }

    /// React to a directory moving from `old` to `new` (workspace-relative).
    ///
    /// Only the tags at the new location change. The managed set is not
    /// persisted here; the listing stays authoritative and the next full
    /// reconciliation settles it.
    pub fn handle_rename(&mut self, old: &str, new: &str) -> Result<RenameOutcome> {
        let old = NormalizedPath::new(old);
        let new = NormalizedPath::new(new);
        let managed = self.store.load()?;

        let old_managed = managed.contains_path(&old);
        let new_managed = managed.contains_path(&new);

        let (op, roles, outcome): (TagOp, Vec<RoleKind>, RenameOutcome) =
            match (old_managed, new_managed) {
                (true, false) => (
                    TagOp::Remove,
                    managed.with_path(&old).map(|d| d.role).collect(),
                    RenameOutcome::Untagged,
                ),
                (false, true) => (
                    TagOp::Add,
                    managed.with_path(&new).map(|d| d.role).collect(),
                    RenameOutcome::Tagged,
                ),
                _ => {
                    tracing::debug!(old = %old, new = %new, "Rename does not change managed state");
                    return Ok(RenameOutcome::Unchanged);
                }
            };

        let dir = match self.fs.resolve(&new) {
            Ok(dir) => dir,
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %new, "Renamed directory no longer exists; skipping");
                return Ok(outcome);
            }
            Err(e) => return Err(e),
        };

        for role in roles {
            self.mutate(&dir, role, op)?;
        }
        tracing::info!(old = %old, new = %new, outcome = ?outcome, "Rename handled");
        Ok(outcome)
    }

    /// React to `path` (workspace-relative) being deleted.
    ///
    /// Removes the tags of a managed path. The managed set is left alone: if
    /// the listing still declares the path, recreating the directory tags it
    /// again. Returns whether any tag removal was requested.
    pub fn handle_deletion(&mut self, path: &str) -> Result<bool> {
        let path = NormalizedPath::new(path);
        let managed = self.store.load()?;
        let roles: Vec<RoleKind> = managed.with_path(&path).map(|d| d.role).collect();
        if roles.is_empty() {
            return Ok(false);
        }

        let dir = self.fs.handle(&path);
        for role in roles {
            self.mutate(&dir, role, TagOp::Remove)?;
        }
        tracing::info!(path = %path, "Deleted managed directory untagged");
        Ok(true)
    }

    fn apply(&mut self, descriptor: &RoleDescriptor, op: TagOp) -> Result<Applied> {
        let dir = match self.fs.resolve(&descriptor.path) {
            Ok(dir) => dir,
            Err(e) if e.is_not_found() => {
                tracing::debug!(path = %descriptor.path, "Skipping non existing directory");
                return Ok(Applied::Missing);
            }
            Err(RootsyncError::OutsideWorkspace(path)) => {
                tracing::warn!(path = %path.display(), role = %descriptor.role, "Directory is outside the workspace; skipping");
                return Ok(Applied::Unowned);
            }
            Err(e) => {
                tracing::warn!(path = %descriptor.path, error = %e, "Cannot resolve directory; skipping");
                return Ok(Applied::Missing);
            }
        };
        self.mutate(&dir, descriptor.role, op)
    }

    fn mutate(&mut self, dir: &FileHandle, role: RoleKind, op: TagOp) -> Result<Applied> {
        let result = match op {
            TagOp::Add => self.gateway.add_role(dir, role),
            TagOp::Remove => self.gateway.remove_role(dir, role),
        };
        match result {
            Ok(()) => {
                match op {
                    TagOp::Add => {
                        self.tagged.insert(dir.clone());
                    }
                    TagOp::Remove => {
                        self.tagged.shift_remove(dir);
                    }
                }
                tracing::info!(path = %dir.rel, role = %role, op = ?op, "Role applied");
                Ok(Applied::Done)
            }
            Err(RootsyncError::OwnerNotFound(path)) => {
                tracing::warn!(path = %path.display(), role = %role, "Directory is not associated with any content root");
                Ok(Applied::Unowned)
            }
            Err(e) => Err(e),
        }
    }
}
