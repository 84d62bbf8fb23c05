//! Change Event Router
//!
//! Translates file-system change events into engine calls. Events are
//! handled strictly in delivery order, each one completely before the next.
//! A failure in one event is logged and does not stop the batch.

use crate::engine::{Reconciler, RenameOutcome};
use crate::error::Result;
use crate::gateway::RoleGateway;
use crate::paths::NormalizedPath;
use crate::state::StateStore;
use crate::workspace::FileSystem;
use serde::Serialize;
use std::path::PathBuf;

/// A low-level change notification. Paths are absolute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Create { path: Option<PathBuf>, is_dir: bool },
    Modify { path: Option<PathBuf>, is_dir: bool },
    Delete { path: Option<PathBuf> },
    Move { from: PathBuf, to: PathBuf },
    /// A property change that changes the path, i.e. an in-place rename.
    PropertyChange { from: PathBuf, to: PathBuf },
}

impl ChangeEvent {
    pub fn created_dir(path: impl Into<PathBuf>) -> Self {
        Self::Create {
            path: Some(path.into()),
            is_dir: true,
        }
    }

    pub fn modified_file(path: impl Into<PathBuf>) -> Self {
        Self::Modify {
            path: Some(path.into()),
            is_dir: false,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::Delete {
            path: Some(path.into()),
        }
    }

    pub fn moved(from: impl Into<PathBuf>, to: impl Into<PathBuf>) -> Self {
        Self::Move {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// Which engine entry point an event maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    FullReconcile,
    Rename { old: NormalizedPath, new: NormalizedPath },
    Deletion(NormalizedPath),
    Ignore,
}

/// Per-batch counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouterStats {
    pub events: usize,
    pub reconciliations: usize,
    pub renames: usize,
    pub deletions: usize,
    pub ignored: usize,
    pub errors: usize,
}

impl RouterStats {
    pub fn merge(&mut self, other: RouterStats) {
        self.events += other.events;
        self.reconciliations += other.reconciliations;
        self.renames += other.renames;
        self.deletions += other.deletions;
        self.ignored += other.ignored;
        self.errors += other.errors;
    }
}

/// Stateless apart from the identity of the listing file.
#[derive(Debug, Clone)]
pub struct ChangeRouter {
    listing: NormalizedPath,
}

impl ChangeRouter {
    pub fn new(listing: NormalizedPath) -> Self {
        Self { listing }
    }

    pub fn listing(&self) -> &NormalizedPath {
        &self.listing
    }

    /// Decide what `event` means for the engine, without side effects.
    pub fn route<F: FileSystem>(&self, fs: &F, event: &ChangeEvent) -> Result<Route> {
        match event {
            ChangeEvent::Move { from, to } | ChangeEvent::PropertyChange { from, to } => {
                Ok(Route::Rename {
                    old: fs.localize(from)?,
                    new: fs.localize(to)?,
                })
            }
            ChangeEvent::Delete { path: Some(path) } => Ok(Route::Deletion(fs.localize(path)?)),
            ChangeEvent::Delete { path: None } => Ok(Route::Ignore),
            ChangeEvent::Create {
                path: Some(path),
                is_dir,
            }
            | ChangeEvent::Modify {
                path: Some(path),
                is_dir,
            } => {
                if *is_dir || fs.is_listing_file(path, &self.listing) {
                    Ok(Route::FullReconcile)
                } else {
                    Ok(Route::Ignore)
                }
            }
            ChangeEvent::Create { path: None, .. } | ChangeEvent::Modify { path: None, .. } => {
                Ok(Route::Ignore)
            }
        }
    }

    /// Handle one batch in order.
    pub fn dispatch<F, G, S>(
        &self,
        engine: &mut Reconciler<F, G, S>,
        events: &[ChangeEvent],
    ) -> RouterStats
    where
        F: FileSystem,
        G: RoleGateway,
        S: StateStore,
    {
        let mut stats = RouterStats {
            events: events.len(),
            ..RouterStats::default()
        };

        for event in events {
            if let Err(e) = self.dispatch_one(engine, event, &mut stats) {
                stats.errors += 1;
                tracing::error!(event = ?event, error = %e, "Failed to handle change event");
            }
        }

        if stats.events > stats.ignored {
            tracing::debug!(?stats, "Change batch handled");
        }
        stats
    }

    fn dispatch_one<F, G, S>(
        &self,
        engine: &mut Reconciler<F, G, S>,
        event: &ChangeEvent,
        stats: &mut RouterStats,
    ) -> Result<()>
    where
        F: FileSystem,
        G: RoleGateway,
        S: StateStore,
    {
        match self.route(engine.fs(), event)? {
            Route::FullReconcile => {
                engine.reconcile_from_listing()?;
                stats.reconciliations += 1;
            }
            Route::Rename { old, new } => {
                let outcome = engine.handle_rename(old.as_str(), new.as_str())?;
                if outcome != RenameOutcome::Unchanged {
                    stats.renames += 1;
                }
                // An editor saving the listing by renaming a temp file over it.
                if new == self.listing {
                    engine.reconcile_from_listing()?;
                    stats.reconciliations += 1;
                }
            }
            Route::Deletion(path) => {
                if engine.handle_deletion(path.as_str())? {
                    stats.deletions += 1;
                }
            }
            Route::Ignore => stats.ignored += 1,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RootsyncError;
    use crate::workspace::LocalWorkspace;
    use tempfile::TempDir;

    fn setup() -> (TempDir, LocalWorkspace, ChangeRouter) {
        let temp = TempDir::new().unwrap();
        let ws = LocalWorkspace::open(temp.path()).unwrap();
        (temp, ws, ChangeRouter::new(NormalizedPath::new("source_dirs")))
    }

    #[test]
    fn directory_creation_triggers_full_reconcile() {
        let (_temp, ws, router) = setup();
        let event = ChangeEvent::created_dir(ws.root().join("src2"));
        assert_eq!(router.route(&ws, &event).unwrap(), Route::FullReconcile);
    }

    #[test]
    fn listing_change_triggers_full_reconcile() {
        let (_temp, ws, router) = setup();
        let event = ChangeEvent::modified_file(ws.root().join("source_dirs"));
        assert_eq!(router.route(&ws, &event).unwrap(), Route::FullReconcile);

        let other = ChangeEvent::modified_file(ws.root().join("README.md"));
        assert_eq!(router.route(&ws, &other).unwrap(), Route::Ignore);
    }

    #[test]
    fn moves_and_property_changes_are_renames() {
        let (_temp, ws, router) = setup();
        let expected = Route::Rename {
            old: NormalizedPath::new("src2"),
            new: NormalizedPath::new("src3"),
        };

        let moved = ChangeEvent::moved(ws.root().join("src2"), ws.root().join("src3"));
        assert_eq!(router.route(&ws, &moved).unwrap(), expected);

        let renamed = ChangeEvent::PropertyChange {
            from: ws.root().join("src2"),
            to: ws.root().join("src3"),
        };
        assert_eq!(router.route(&ws, &renamed).unwrap(), expected);
    }

    #[test]
    fn deletions_are_localized() {
        let (_temp, ws, router) = setup();
        let event = ChangeEvent::deleted(ws.root().join("a/b"));
        assert_eq!(
            router.route(&ws, &event).unwrap(),
            Route::Deletion(NormalizedPath::new("a/b"))
        );
    }

    #[test]
    fn events_without_target_are_ignored() {
        let (_temp, ws, router) = setup();
        for event in [
            ChangeEvent::Create { path: None, is_dir: true },
            ChangeEvent::Modify { path: None, is_dir: false },
            ChangeEvent::Delete { path: None },
        ] {
            assert_eq!(router.route(&ws, &event).unwrap(), Route::Ignore);
        }
    }

    #[test]
    fn rename_outside_workspace_is_an_error() {
        let (_temp, ws, router) = setup();
        let event = ChangeEvent::moved("/somewhere/else", ws.root().join("x"));
        assert!(matches!(
            router.route(&ws, &event),
            Err(RootsyncError::OutsideWorkspace(_))
        ));
    }

    #[test]
    fn file_outside_workspace_is_not_the_listing() {
        let (_temp, ws, router) = setup();
        let event = ChangeEvent::modified_file("/somewhere/source_dirs");
        assert_eq!(router.route(&ws, &event).unwrap(), Route::Ignore);
    }
}
