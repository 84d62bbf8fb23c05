//! File-system watcher producing ordered, debounced [`ChangeEvent`] batches.
//!
//! Raw notifications arrive from `notify` on its own thread and are forwarded
//! into a tokio task. The task waits for a quiet period, translates the burst
//! into change events and emits it as one batch. Order inside a batch is the
//! order of delivery; nothing is coalesced, because the router relies on
//! seeing a rename before any follow-up change at the new path.

use crate::error::Result;
use crate::router::ChangeEvent;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Buffered batches before the watcher applies backpressure.
const BATCH_BUFFER: usize = 64;

/// A running recursive watch over one directory tree.
///
/// Dropping the watcher stops notifications; the batch channel closes once
/// the debounce task drains.
pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
    root: PathBuf,
}

impl FsWatcher {
    /// Watch `root` recursively. Paths under any of `ignore` are dropped.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        root: &Path,
        debounce: Duration,
        ignore: Vec<PathBuf>,
    ) -> Result<(Self, mpsc::Receiver<Vec<ChangeEvent>>)> {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (batch_tx, batch_rx) = mpsc::channel(BATCH_BUFFER);

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                // Receiver gone means the watcher is shutting down.
                let _ = raw_tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;

        let task = tokio::spawn(debounce_loop(raw_rx, batch_tx, debounce, ignore));
        tracing::info!(root = %root.display(), debounce_ms = debounce.as_millis() as u64, "Watching workspace");

        Ok((
            Self {
                _watcher: watcher,
                task,
                root: root.to_path_buf(),
            },
            batch_rx,
        ))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for FsWatcher {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn debounce_loop(
    mut raw_rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
    batch_tx: mpsc::Sender<Vec<ChangeEvent>>,
    debounce: Duration,
    ignore: Vec<PathBuf>,
) {
    while let Some(first) = raw_rx.recv().await {
        let mut raw = Vec::new();
        push_raw(&mut raw, first);

        let mut closed = false;
        loop {
            match tokio::time::timeout(debounce, raw_rx.recv()).await {
                Ok(Some(next)) => push_raw(&mut raw, next),
                Ok(None) => {
                    closed = true;
                    break;
                }
                Err(_) => break,
            }
        }

        let batch: Vec<ChangeEvent> = translate(&raw)
            .into_iter()
            .filter(|event| !is_ignored(event, &ignore))
            .collect();
        if !batch.is_empty() {
            tracing::trace!(count = batch.len(), "Emitting change batch");
            if batch_tx.send(batch).await.is_err() {
                return;
            }
        }
        if closed {
            return;
        }
    }
}

fn push_raw(raw: &mut Vec<Event>, res: notify::Result<Event>) {
    match res {
        Ok(event) => raw.push(event),
        Err(e) => tracing::warn!(error = %e, "File watcher error"),
    }
}

/// Translate a burst of raw notifications into change events, in order.
///
/// A rename reported as a from/to pair plus a combined event yields one
/// [`ChangeEvent::Move`]. A lone "renamed from" means the path left the
/// watched tree and becomes a deletion; a lone "renamed to" becomes a
/// creation. Access notifications are dropped.
pub fn translate(raw: &[Event]) -> Vec<ChangeEvent> {
    let paired: HashSet<usize> = raw
        .iter()
        .filter(|e| matches!(e.kind, EventKind::Modify(ModifyKind::Name(RenameMode::Both))))
        .filter_map(|e| e.tracker())
        .collect();

    let mut out = Vec::new();
    for event in raw {
        let first = event.paths.first().cloned();
        match event.kind {
            EventKind::Create(kind) => out.push(ChangeEvent::Create {
                is_dir: kind == CreateKind::Folder || is_dir(first.as_deref()),
                path: first,
            }),
            EventKind::Remove(_) => out.push(ChangeEvent::Delete { path: first }),
            EventKind::Modify(ModifyKind::Name(mode)) => {
                let paired_half = matches!(mode, RenameMode::From | RenameMode::To)
                    && event.tracker().is_some_and(|t| paired.contains(&t));
                if !paired_half {
                    out.extend(rename_event(mode, &event.paths));
                }
            }
            EventKind::Modify(_) => out.push(ChangeEvent::Modify {
                is_dir: is_dir(first.as_deref()),
                path: first,
            }),
            EventKind::Access(_) => {}
            EventKind::Any | EventKind::Other => {
                tracing::trace!(kind = ?event.kind, paths = ?event.paths, "Unclassified change dropped");
            }
        }
    }
    out
}

fn rename_event(mode: RenameMode, paths: &[PathBuf]) -> Option<ChangeEvent> {
    match (mode, paths) {
        (_, [from, to]) => Some(ChangeEvent::Move {
            from: from.clone(),
            to: to.clone(),
        }),
        (RenameMode::From, [path]) => Some(ChangeEvent::Delete {
            path: Some(path.clone()),
        }),
        (RenameMode::To, [path]) => Some(ChangeEvent::Create {
            is_dir: path.is_dir(),
            path: Some(path.clone()),
        }),
        // Backends that cannot tell which side of a rename they saw.
        (_, [path]) if path.exists() => Some(ChangeEvent::Create {
            is_dir: path.is_dir(),
            path: Some(path.clone()),
        }),
        (_, [path]) => Some(ChangeEvent::Delete {
            path: Some(path.clone()),
        }),
        _ => None,
    }
}

fn is_dir(path: Option<&Path>) -> bool {
    path.is_some_and(Path::is_dir)
}

fn is_ignored(event: &ChangeEvent, ignore: &[PathBuf]) -> bool {
    let under = |p: &Path| ignore.iter().any(|prefix| p.starts_with(prefix));
    match event {
        ChangeEvent::Create { path, .. }
        | ChangeEvent::Modify { path, .. }
        | ChangeEvent::Delete { path } => path.as_deref().is_some_and(under),
        ChangeEvent::Move { from, to } | ChangeEvent::PropertyChange { from, to } => {
            under(from) && under(to)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, DataChange, RemoveKind};
    use tempfile::TempDir;

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn paired_rename_becomes_one_move() {
        let raw = vec![
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/ws/src2"]).set_tracker(7),
            event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/ws/src3"]).set_tracker(7),
            event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/ws/src2", "/ws/src3"],
            )
            .set_tracker(7),
        ];
        assert_eq!(translate(&raw), vec![ChangeEvent::moved("/ws/src2", "/ws/src3")]);
    }

    #[test]
    fn unpaired_rename_halves() {
        let raw = vec![
            event(EventKind::Modify(ModifyKind::Name(RenameMode::From)), &["/ws/gone"]).set_tracker(1),
            event(EventKind::Modify(ModifyKind::Name(RenameMode::To)), &["/nonexistent/in"]).set_tracker(2),
        ];
        assert_eq!(
            translate(&raw),
            vec![
                ChangeEvent::deleted("/ws/gone"),
                ChangeEvent::Create {
                    path: Some(PathBuf::from("/nonexistent/in")),
                    is_dir: false
                },
            ]
        );
    }

    #[test]
    fn keeps_delivery_order_and_drops_access() {
        let raw = vec![
            event(EventKind::Remove(RemoveKind::Folder), &["/ws/a"]),
            event(EventKind::Access(AccessKind::Any), &["/ws/source_dirs"]),
            event(EventKind::Create(CreateKind::Folder), &["/ws/b"]),
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content)), &["/ws/source_dirs"]),
        ];
        assert_eq!(
            translate(&raw),
            vec![
                ChangeEvent::deleted("/ws/a"),
                ChangeEvent::created_dir("/ws/b"),
                ChangeEvent::modified_file("/ws/source_dirs"),
            ]
        );
    }

    #[test]
    fn creation_checks_disk_when_kind_is_vague() {
        let temp = TempDir::new().unwrap();
        let dir = temp.path().join("made");
        std::fs::create_dir(&dir).unwrap();

        let raw = vec![event(EventKind::Create(CreateKind::Any), &[dir.to_str().unwrap()])];
        assert_eq!(translate(&raw), vec![ChangeEvent::created_dir(&dir)]);
    }

    #[test]
    fn ignored_prefixes_are_filtered() {
        let ignore = vec![PathBuf::from("/ws/.rootsync")];
        assert!(is_ignored(&ChangeEvent::modified_file("/ws/.rootsync/state.json"), &ignore));
        assert!(is_ignored(
            &ChangeEvent::moved("/ws/.rootsync/state.json.tmp", "/ws/.rootsync/state.json"),
            &ignore
        ));
        assert!(!is_ignored(&ChangeEvent::moved("/ws/.rootsync/x", "/ws/src"), &ignore));
        assert!(!is_ignored(&ChangeEvent::Delete { path: None }, &ignore));
    }

    #[tokio::test]
    async fn debounce_collects_a_burst_into_one_batch() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let (batch_tx, mut batch_rx) = mpsc::channel(4);
        let task = tokio::spawn(debounce_loop(
            raw_rx,
            batch_tx,
            Duration::from_millis(50),
            Vec::new(),
        ));

        raw_tx
            .send(Ok(event(EventKind::Remove(RemoveKind::Any), &["/ws/a"])))
            .unwrap();
        raw_tx
            .send(Ok(event(EventKind::Remove(RemoveKind::Any), &["/ws/b"])))
            .unwrap();
        drop(raw_tx);

        let batch = batch_rx.recv().await.unwrap();
        assert_eq!(
            batch,
            vec![ChangeEvent::deleted("/ws/a"), ChangeEvent::deleted("/ws/b")]
        );
        assert!(batch_rx.recv().await.is_none());
        task.await.unwrap();
    }
}
