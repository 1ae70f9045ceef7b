//! Event-assisted engine: OS notifications only wake the loop early. Readiness is always
//! decided by the wrapped [`PollingWatcher`].

use anyhow::Result;
use crossbeam_channel::{Receiver, Sender, bounded};
use log::{debug, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::WatchEngine;
use super::poller::{PollingWatcher, WatchOptions};

pub struct EventWatcher {
    inner: PollingWatcher,
    /// `None` when the OS watcher could not be created; then this is plain polling.
    watcher: Option<RecommendedWatcher>,
    watched: HashSet<PathBuf>,
    wake_rx: Receiver<()>,
}

impl EventWatcher {
    pub fn new(opts: WatchOptions) -> Self {
        let (wake_tx, wake_rx) = bounded::<()>(1);
        let watcher = match notify::recommended_watcher(move |res: notify::Result<Event>| {
            signal(&wake_tx, res)
        }) {
            Ok(w) => Some(w),
            Err(e) => {
                warn!("filesystem events unavailable ({e}); falling back to polling");
                None
            }
        };
        Self {
            inner: PollingWatcher::new(opts),
            watcher,
            watched: HashSet::new(),
            wake_rx,
        }
    }

    /// True while OS notifications are in use.
    pub fn is_event_driven(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn watched_dirs(&self) -> &HashSet<PathBuf> {
        &self.watched
    }

    /// Watch every directory the last scan found and drop the ones that disappeared.
    /// Each directory is watched non-recursively; subdirectories get their own watch.
    fn sync_watches(&mut self) {
        let Some(watcher) = self.watcher.as_mut() else {
            return;
        };
        let current = self.inner.directories();

        let gone: Vec<PathBuf> = self.watched.difference(current).cloned().collect();
        for dir in gone {
            if let Err(e) = watcher.unwatch(&dir) {
                debug!("unwatch {}: {e}", dir.display());
            }
            self.watched.remove(&dir);
        }

        for dir in current {
            if self.watched.contains(dir) {
                continue;
            }
            match watcher.watch(dir, RecursiveMode::NonRecursive) {
                Ok(()) => {
                    self.watched.insert(dir.clone());
                }
                Err(e) => debug!("watch {}: {e}", dir.display()),
            }
        }
    }
}

/// Runs on notify's thread. Never blocks: a pending wake-up already covers this event.
fn signal(wake_tx: &Sender<()>, res: notify::Result<Event>) {
    match res {
        Ok(event) if is_relevant(&event.kind) => {
            let _ = wake_tx.try_send(());
        }
        Ok(_) => {}
        Err(e) => debug!("filesystem event error: {e}"),
    }
}

fn is_relevant(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_) | EventKind::Any
    )
}

impl WatchEngine for EventWatcher {
    fn bootstrap(&mut self) -> Result<()> {
        self.inner.bootstrap()?;
        self.sync_watches();
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<Vec<PathBuf>> {
        let ready = self.inner.poll(now)?;
        self.sync_watches();
        Ok(ready)
    }

    fn wakeups(&self) -> Option<Receiver<()>> {
        self.watcher.as_ref().map(|_| self.wake_rx.clone())
    }

    fn root(&self) -> &Path {
        self.inner.root()
    }
}
