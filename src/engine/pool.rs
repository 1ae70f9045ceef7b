//! Bounded worker pool: runs independent jobs in parallel with pool-wide retry.

use crossbeam_channel::{Receiver, Sender, bounded, unbounded};
use log::{debug, warn};
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use crate::converter::{ConvertError, ConverterRegistry};
use crate::utils::config::{RetryDefaults, WorkerThreadLimits};
use crate::{Job, JobResult};

/// Progress hook: `(completed, total)`. Runs on the aggregation thread after every result,
/// so it must return quickly.
pub type ProgressFn = Box<dyn Fn(usize, usize) + Send + Sync>;

pub struct WorkerPool<'r> {
    registry: &'r ConverterRegistry,
    requested_workers: Option<usize>,
    limits: WorkerThreadLimits,
    retry_max: u32,
    retry_delay: Duration,
    on_progress: Option<ProgressFn>,
}

impl<'r> WorkerPool<'r> {
    pub fn new(registry: &'r ConverterRegistry) -> Self {
        Self {
            registry,
            requested_workers: None,
            limits: WorkerThreadLimits::current(),
            retry_max: RetryDefaults::MAX,
            retry_delay: RetryDefaults::DELAY,
            on_progress: None,
        }
    }

    /// Requested worker count. `None` or `0` means one per CPU; always capped at 2× CPUs.
    pub fn with_workers(mut self, workers: Option<usize>) -> Self {
        self.requested_workers = workers;
        self
    }

    pub fn with_limits(mut self, limits: WorkerThreadLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn with_progress(mut self, on_progress: ProgressFn) -> Self {
        self.on_progress = Some(on_progress);
        self
    }

    /// Set pool-wide retry. Negative `max` clamps to 0; a negative delay is rejected and the
    /// previous delay kept.
    pub fn set_retry(&mut self, max: i64, delay_ms: i64) {
        self.retry_max = max.clamp(0, u32::MAX as i64) as u32;
        if delay_ms < 0 {
            warn!(
                "ignoring negative retry delay {delay_ms}ms; keeping {:?}",
                self.retry_delay
            );
        } else {
            self.retry_delay = Duration::from_millis(delay_ms as u64);
        }
    }

    pub fn retry_max(&self) -> u32 {
        self.retry_max
    }

    pub fn retry_delay(&self) -> Duration {
        self.retry_delay
    }

    /// Number of workers that would run `jobs` jobs.
    pub fn worker_count(&self, jobs: usize) -> usize {
        self.limits.workers_for(self.requested_workers, jobs)
    }

    /// Run every job to completion (or retry exhaustion). Returns exactly one result per job,
    /// in completion order. Never fails; failures live in the results.
    pub fn execute(&self, jobs: Vec<Job>) -> Vec<JobResult> {
        let total = jobs.len();
        if total == 0 {
            return Vec::new();
        }
        let workers = self.worker_count(total);
        debug!("pool: {total} jobs on {workers} workers");

        // Capacity == total so queueing never blocks before workers start.
        let (job_tx, job_rx) = bounded::<Job>(total);
        for job in jobs {
            let _ = job_tx.send(job);
        }
        drop(job_tx);

        let (result_tx, result_rx) = unbounded::<JobResult>();
        let completed = AtomicUsize::new(0);
        let mut results = Vec::with_capacity(total);

        thread::scope(|s| {
            for _ in 0..workers {
                let job_rx = job_rx.clone();
                let result_tx = result_tx.clone();
                s.spawn(move || self.worker_loop(job_rx, result_tx));
            }
            // Dropping the last sender closes the channel once all workers exit.
            drop(result_tx);

            while let Ok(result) = result_rx.recv() {
                results.push(result);
                let done = completed.fetch_add(1, Ordering::Relaxed) + 1;
                if let Some(cb) = &self.on_progress {
                    cb(done, total);
                }
            }
        });
        results
    }

    fn worker_loop(&self, job_rx: Receiver<Job>, result_tx: Sender<JobResult>) {
        while let Ok(job) = job_rx.recv() {
            let result = self.run_job(&job);
            if result_tx.send(result).is_err() {
                break;
            }
        }
    }

    /// Single job: pre-set skip, converter lookup, output dir, then up to `retry_max + 1` attempts.
    pub fn run_job(&self, job: &Job) -> JobResult {
        if let Some(reason) = job.skip_reason {
            return JobResult::skipped(job, reason);
        }
        let start = Instant::now();

        let converter = match self.registry.find(&job.from, &job.to) {
            Ok(c) => c,
            Err(e) => return JobResult::failed(job, e, 1, start.elapsed()),
        };
        if let Err(e) = ensure_parent_dir(&job.output) {
            return JobResult::failed(job, e, 1, start.elapsed());
        }

        let max_attempts = self.retry_max.saturating_add(1);
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            match converter.convert(&job.input, &job.output, &job.options) {
                Ok(()) => {
                    let size = fs::metadata(&job.output).ok().map(|m| m.len());
                    debug!(
                        "{} -> {} ({} attempt {attempt})",
                        job.input.display(),
                        job.output.display(),
                        converter.name()
                    );
                    return JobResult::succeeded(job, size, attempt, start.elapsed());
                }
                Err(e) => {
                    debug!(
                        "{}: attempt {attempt}/{max_attempts} failed: {e}",
                        job.input.display()
                    );
                    if !e.is_retryable() {
                        return JobResult::failed(job, e, attempt, start.elapsed());
                    }
                    last_error = Some(e);
                    if attempt < max_attempts && !self.retry_delay.is_zero() {
                        thread::sleep(self.retry_delay);
                    }
                }
            }
        }
        let error = last_error.unwrap_or_else(|| ConvertError::failed("no attempt was made"));
        JobResult::failed(job, error, max_attempts, start.elapsed())
    }
}

/// Create the directory that will hold `output`.
pub fn ensure_parent_dir(output: &Path) -> Result<(), ConvertError> {
    match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| ConvertError::OutputDir {
                path: parent.to_path_buf(),
                reason: e.to_string(),
            })
        }
        _ => Ok(()),
    }
}
