//! Filesystem change sources.
//!
//! A [`ChangeSource`] turns "watch this directory tree" into a stream of raw
//! [`ChangeEvent`]s pushed onto a channel owned by the subscriber. Dropping
//! the returned [`Subscription`] unsubscribes.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

use super::error::WatchError;

/// Kind of change reported by a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
    Removed,
    Renamed,
    Other,
}

impl ChangeKind {
    /// Map a notify event kind, skipping pure access notifications.
    pub fn from_notify(kind: &EventKind) -> Option<Self> {
        match kind {
            EventKind::Access(_) => None,
            EventKind::Create(_) => Some(ChangeKind::Created),
            EventKind::Modify(ModifyKind::Name(_)) => Some(ChangeKind::Renamed),
            EventKind::Modify(_) => Some(ChangeKind::Modified),
            EventKind::Remove(_) => Some(ChangeKind::Removed),
            EventKind::Any | EventKind::Other => Some(ChangeKind::Other),
        }
    }
}

/// One raw change under a subscribed root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    /// Changed path, relative to the subscribed root when it lies beneath it.
    pub path: PathBuf,
    pub kind: ChangeKind,
}

impl ChangeEvent {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind) -> Self {
        Self {
            path: path.into(),
            kind,
        }
    }
}

/// Live subscription handle. Dropping it stops event delivery.
pub trait Subscription: Send {
    fn root(&self) -> &Path;
}

/// Source of filesystem change notifications.
pub trait ChangeSource: Send + Sync {
    /// Start watching `root` recursively, delivering changes to `events`.
    ///
    /// Fails when the root cannot be watched (e.g. it does not exist).
    fn subscribe(
        &self,
        root: &Path,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<Box<dyn Subscription>, WatchError>;
}

/// Change source backed by the platform's native notifier.
#[derive(Debug, Clone, Copy, Default)]
pub struct NotifySource;

impl NotifySource {
    pub fn new() -> Self {
        Self
    }
}

struct NotifySubscription {
    root: PathBuf,
    _watcher: notify::RecommendedWatcher,
}

impl Subscription for NotifySubscription {
    fn root(&self) -> &Path {
        &self.root
    }
}

impl ChangeSource for NotifySource {
    fn subscribe(
        &self,
        root: &Path,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<Box<dyn Subscription>, WatchError> {
        // Some backends (FSEvents) report canonical paths
        let base = WatchRoot::new(root);

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    crate::failure_event!(warn, "source", "file watch error", "{e}");
                    return;
                }
            };

            let Some(kind) = ChangeKind::from_notify(&event.kind) else {
                return;
            };

            for path in event.paths {
                let path = base.relative(path);
                // Runs on the notifier's own thread, never inside the runtime
                if events.blocking_send(ChangeEvent { path, kind }).is_err() {
                    // Subscriber is gone
                    return;
                }
            }
        })?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: e.to_string(),
            })?;

        crate::debug_event!("source", "watching", "{}", root.display());

        Ok(Box::new(NotifySubscription {
            root: root.to_path_buf(),
            _watcher: watcher,
        }))
    }
}

/// A watched directory as requested and as resolved on disk.
#[derive(Debug, Clone)]
struct WatchRoot {
    requested: PathBuf,
    canonical: Option<PathBuf>,
}

impl WatchRoot {
    fn new(root: &Path) -> Self {
        let canonical = root.canonicalize().ok().filter(|c| c != root);
        Self {
            requested: root.to_path_buf(),
            canonical,
        }
    }

    /// `path` relative to the root, or unchanged when it lies elsewhere.
    fn relative(&self, path: PathBuf) -> PathBuf {
        let relative = std::iter::once(&self.requested)
            .chain(self.canonical.as_ref())
            .find_map(|base| path.strip_prefix(base).ok())
            .filter(|rel| !rel.as_os_str().is_empty())
            .map(Path::to_path_buf);
        relative.unwrap_or(path)
    }
}

/// In-memory change source driven by the caller.
///
/// Useful for exercising watchers without touching the real filesystem:
/// [`ManualSource::emit`] pushes an event to every subscription on a root.
#[derive(Debug, Clone, Default)]
pub struct ManualSource {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Default)]
struct ManualState {
    next_id: u64,
    active: HashMap<u64, (PathBuf, mpsc::Sender<ChangeEvent>)>,
    total: usize,
    unwatchable: HashSet<PathBuf>,
}

struct ManualSubscription {
    id: u64,
    root: PathBuf,
    state: Arc<Mutex<ManualState>>,
}

impl Subscription for ManualSubscription {
    fn root(&self) -> &Path {
        &self.root
    }
}

impl Drop for ManualSubscription {
    fn drop(&mut self) {
        self.state.lock().active.remove(&self.id);
    }
}

impl ManualSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make future subscriptions on `root` fail.
    pub fn make_unwatchable(&self, root: impl Into<PathBuf>) {
        self.state.lock().unwatchable.insert(root.into());
    }

    /// Deliver a change to every live subscription on `root`.
    ///
    /// Returns how many subscriptions accepted the event.
    pub fn emit(&self, root: &Path, path: impl Into<PathBuf>, kind: ChangeKind) -> usize {
        let event = ChangeEvent::new(path, kind);
        let state = self.state.lock();
        state
            .active
            .values()
            .filter(|(subscribed, _)| subscribed == root)
            .filter(|(_, tx)| tx.try_send(event.clone()).is_ok())
            .count()
    }

    /// Number of subscriptions currently alive.
    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    /// Number of live subscriptions on `root`.
    pub fn active_on(&self, root: &Path) -> usize {
        self.state
            .lock()
            .active
            .values()
            .filter(|(subscribed, _)| subscribed == root)
            .count()
    }

    /// Number of subscriptions ever created.
    pub fn total_subscriptions(&self) -> usize {
        self.state.lock().total
    }
}

impl ChangeSource for ManualSource {
    fn subscribe(
        &self,
        root: &Path,
        events: mpsc::Sender<ChangeEvent>,
    ) -> Result<Box<dyn Subscription>, WatchError> {
        let mut state = self.state.lock();
        if state.unwatchable.contains(root) {
            return Err(WatchError::PathWatchFailed {
                path: root.to_path_buf(),
                reason: "path is not watchable".to_string(),
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.total += 1;
        state.active.insert(id, (root.to_path_buf(), events));

        Ok(Box::new(ManualSubscription {
            id,
            root: root.to_path_buf(),
            state: Arc::clone(&self.state),
        }))
    }
}
