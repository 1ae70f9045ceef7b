//! Watch loop: poll on a ticker (or earlier on a wake-up), turn ready files into jobs,
//! run them through the pool. Stops on the shutdown channel, never mid-batch.

use anyhow::Result;
use crossbeam_channel::{Receiver, TryRecvError, never, select, tick};
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::conflict::{ConflictPolicy, OutputReservations};
use crate::engine::pool::WorkerPool;
use crate::engine::tools::{detect_format, mirrored_output, normalize_format};
use crate::{Job, JobResult, Options, SkipReason};

use super::WatchEngine;

/// How ready files become jobs: outputs mirror the tree under `output_dir`.
#[derive(Clone, Debug)]
pub struct WatchJobs {
    pub root: PathBuf,
    pub output_dir: PathBuf,
    pub to: String,
    pub conflict: ConflictPolicy,
    pub options: Options,
}

impl WatchJobs {
    pub fn new(root: &Path, output_dir: &Path, to: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            to: normalize_format(to),
            conflict: ConflictPolicy::default(),
            options: Options::default(),
        }
    }

    /// One job per path, each with its own output. Paths whose output cannot be resolved
    /// are logged and dropped.
    pub fn build(&self, ready: &[PathBuf]) -> Vec<Job> {
        let mut reserved = OutputReservations::new();
        ready
            .iter()
            .filter_map(|input| {
                let desired = mirrored_output(input, &self.root, &self.output_dir, &self.to);
                match reserved.resolve(&desired, self.conflict) {
                    Ok(resolved) => Some(Job {
                        input: input.clone(),
                        output: resolved.path,
                        from: detect_format(input),
                        to: self.to.clone(),
                        options: self.options.clone(),
                        skip_reason: resolved.skip.then_some(SkipReason::OutputExists),
                    }),
                    Err(e) => {
                        warn!("{}: {e}", input.display());
                        None
                    }
                }
            })
            .collect()
    }
}

/// Totals over a whole watch session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WatchStats {
    pub polls: usize,
    pub poll_errors: usize,
    pub batches: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl WatchStats {
    fn absorb(&mut self, results: &[JobResult]) {
        self.batches += 1;
        for r in results {
            if r.success {
                self.succeeded += 1;
            } else if r.skipped {
                self.skipped += 1;
            } else {
                self.failed += 1;
            }
        }
    }
}

fn shutdown_requested(shutdown: &Receiver<()>) -> bool {
    !matches!(shutdown.try_recv(), Err(TryRecvError::Empty))
}

/// Bootstrap `engine`, then poll until `shutdown` fires (a message or a dropped sender).
/// Poll errors are logged and the loop carries on. `on_batch` sees every batch's results.
pub fn run_watch<E, F>(
    engine: &mut E,
    pool: &WorkerPool<'_>,
    jobs: &WatchJobs,
    interval: Duration,
    shutdown: &Receiver<()>,
    mut on_batch: F,
) -> Result<WatchStats>
where
    E: WatchEngine + ?Sized,
    F: FnMut(&[JobResult]),
{
    engine.bootstrap()?;
    info!("watching {}", engine.root().display());

    let ticker = tick(interval);
    let mut wake = engine.wakeups().unwrap_or_else(never);
    let mut stats = WatchStats::default();

    loop {
        let mut stop = false;
        let mut wake_closed = false;
        select! {
            recv(shutdown) -> _ => stop = true,
            recv(ticker) -> _ => {},
            recv(wake) -> msg => wake_closed = msg.is_err(),
        }
        if wake_closed {
            debug!("wake-up channel closed; polling on the ticker only");
            wake = never();
        }
        if stop || shutdown_requested(shutdown) {
            break;
        }

        stats.polls += 1;
        let ready = match engine.poll(Instant::now()) {
            Ok(ready) => ready,
            Err(e) => {
                stats.poll_errors += 1;
                warn!("poll failed: {e:#}");
                continue;
            }
        };
        if ready.is_empty() {
            continue;
        }

        let batch = jobs.build(&ready);
        if batch.is_empty() {
            continue;
        }
        debug!("{} file(s) ready", batch.len());
        let results = pool.execute(batch);
        stats.absorb(&results);
        on_batch(&results);
    }

    info!("watch stopped after {} polls", stats.polls);
    Ok(stats)
}
