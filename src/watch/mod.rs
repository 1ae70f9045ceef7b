//! Directory watching: a polling engine that decides what is ready, an optional
//! filesystem-event layer that only hurries the next poll, and the loop that feeds ready
//! files to the worker pool.

pub mod events;
pub mod poller;
pub mod runner;

use anyhow::Result;
use crossbeam_channel::Receiver;
use std::path::{Path, PathBuf};
use std::time::Instant;

pub use events::EventWatcher;
pub use poller::{FileState, PollingWatcher, WatchOptions};
pub use runner::{WatchJobs, WatchStats, run_watch};

/// Common contract of the polling and event-assisted engines.
pub trait WatchEngine {
    /// Record every matching file present now as already processed.
    /// Fails when the root is not a directory.
    fn bootstrap(&mut self) -> Result<()>;

    /// Rescan and return the paths that became stable since the last call.
    fn poll(&mut self, now: Instant) -> Result<Vec<PathBuf>>;

    /// Signals that a poll is worth doing before the next tick. `None` for pure polling.
    fn wakeups(&self) -> Option<Receiver<()>> {
        None
    }

    fn root(&self) -> &Path;
}
