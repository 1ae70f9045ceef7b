mod common;

use common::{MockConverter, Probe, job, touch};
use convx::converter::{ConvertError, ConverterRegistry};
use convx::engine::WorkerPool;
use convx::utils::config::{RetryDefaults, WorkerThreadLimits};
use convx::{SkipReason, Summary};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn registry_with(converter: MockConverter) -> ConverterRegistry {
    let mut registry = ConverterRegistry::new();
    registry.register(converter);
    registry
}

fn batch(dir: &TempDir, n: usize) -> Vec<convx::Job> {
    (0..n)
        .map(|i| {
            let input = touch(dir.path(), &format!("in/f{i:02}.wav"), b"pcm");
            job(&input, &dir.path().join(format!("out/f{i:02}.mp3")))
        })
        .collect()
}

// --- cardinality / exclusivity ---

#[test]
fn test_every_job_gets_exactly_one_result() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe));
    let jobs = batch(&dir, 25);
    let expected: HashSet<PathBuf> = jobs.iter().map(|j| j.input.clone()).collect();

    let pool = WorkerPool::new(&registry).with_workers(Some(4));
    let results = pool.execute(jobs);

    assert_eq!(results.len(), 25);
    let got: HashSet<PathBuf> = results.iter().map(|r| r.input.clone()).collect();
    assert_eq!(got, expected);
    assert!(results.iter().all(|r| r.success && r.attempts == 1));
    assert!(results.iter().all(|r| r.output.exists()));
}

#[test]
fn test_no_job_is_processed_twice() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).with_delay(Duration::from_millis(2)));

    let pool = WorkerPool::new(&registry).with_workers(Some(8));
    pool.execute(batch(&dir, 40));

    let inputs = probe.inputs();
    assert_eq!(inputs.len(), 40);
    let unique: HashSet<_> = inputs.into_iter().collect();
    assert_eq!(unique.len(), 40);
}

#[test]
fn test_empty_batch_returns_no_results() {
    let registry = ConverterRegistry::new();
    assert!(WorkerPool::new(&registry).execute(Vec::new()).is_empty());
}

#[test]
fn test_concurrency_never_exceeds_worker_count() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry =
        registry_with(MockConverter::new(&probe).with_delay(Duration::from_millis(15)));
    let limits = WorkerThreadLimits {
        all_threads: 2,
        max_factor: 2,
    };

    let pool = WorkerPool::new(&registry).with_limits(limits);
    assert_eq!(pool.worker_count(10), 2);
    let results = pool.execute(batch(&dir, 10));

    assert_eq!(results.len(), 10);
    assert!(probe.peak() <= 2);
}

#[test]
fn test_worker_count_capped_and_bounded_by_jobs() {
    let registry = ConverterRegistry::new();
    let limits = WorkerThreadLimits {
        all_threads: 3,
        max_factor: 2,
    };
    let pool = WorkerPool::new(&registry)
        .with_limits(limits)
        .with_workers(Some(100));
    assert_eq!(pool.worker_count(50), 6);
    assert_eq!(pool.worker_count(4), 4);
    assert_eq!(pool.worker_count(1), 1);
}

// --- skips ---

#[test]
fn test_preset_skip_makes_no_attempt() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe));
    let mut j = batch(&dir, 1).remove(0);
    j.skip_reason = Some(SkipReason::OutputExists);
    let output = j.output.clone();

    let results = WorkerPool::new(&registry).execute(vec![j]);

    let r = &results[0];
    assert!(r.skipped);
    assert!(!r.success);
    assert_eq!(r.attempts, 0);
    assert_eq!(r.skip_reason, Some(SkipReason::OutputExists));
    assert_eq!(probe.calls(), 0);
    assert!(!output.exists());
}

// --- retry ---

#[test]
fn test_retry_succeeds_after_transient_failures() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).failing_first(2));
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(2, 0);

    let results = pool.execute(batch(&dir, 1));

    assert!(results[0].success);
    assert_eq!(results[0].attempts, 3);
    assert_eq!(probe.calls(), 3);
}

#[test]
fn test_retry_exhaustion_reports_last_error_and_attempts() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).failing_first(usize::MAX));
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(2, 0);

    let results = pool.execute(batch(&dir, 1));

    let r = &results[0];
    assert!(r.is_failure());
    assert_eq!(r.attempts, 3);
    assert_eq!(probe.calls(), 3);
    assert_eq!(
        r.error,
        Some(ConvertError::failed("mock failure on call 3"))
    );
}

#[test]
fn test_zero_retry_means_single_attempt() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).failing_first(usize::MAX));
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(0, 0);

    let results = pool.execute(batch(&dir, 1));
    assert_eq!(results[0].attempts, 1);
    assert_eq!(probe.calls(), 1);
}

#[test]
fn test_no_delay_after_final_attempt() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).failing_first(usize::MAX));
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(0, 10_000);

    let start = Instant::now();
    let results = pool.execute(batch(&dir, 1));

    assert!(results[0].is_failure());
    assert!(start.elapsed() < Duration::from_secs(5));
}

#[test]
fn test_delay_only_between_attempts() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).failing_first(usize::MAX));
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(1, 300);

    let start = Instant::now();
    let results = pool.execute(batch(&dir, 1));
    let elapsed = start.elapsed();

    assert_eq!(results[0].attempts, 2);
    // One wait between the two attempts, none after the last.
    assert!(elapsed >= Duration::from_millis(300));
    assert!(elapsed < Duration::from_millis(600) + Duration::from_secs(2));
}

#[test]
fn test_missing_converter_is_single_attempt_failure() {
    let dir = TempDir::new().unwrap();
    let registry = ConverterRegistry::new();
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(5, 0);

    let results = pool.execute(batch(&dir, 1));

    let r = &results[0];
    assert!(r.is_failure());
    assert_eq!(r.attempts, 1);
    assert!(matches!(r.error, Some(ConvertError::NoConverter { .. })));
}

#[test]
fn test_uncreatable_output_dir_is_not_retried() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe));
    let input = touch(dir.path(), "a.wav", b"pcm");
    let blocker = touch(dir.path(), "blocker", b"file, not a dir");
    let mut pool = WorkerPool::new(&registry);
    pool.set_retry(3, 0);

    let results = pool.execute(vec![job(&input, &blocker.join("a.mp3"))]);

    assert_eq!(results[0].attempts, 1);
    assert!(matches!(results[0].error, Some(ConvertError::OutputDir { .. })));
    assert_eq!(probe.calls(), 0);
}

#[test]
fn test_set_retry_clamps_negative_values() {
    let registry = ConverterRegistry::new();
    let mut pool = WorkerPool::new(&registry);
    assert_eq!(pool.retry_max(), RetryDefaults::MAX);

    pool.set_retry(-4, -10);
    assert_eq!(pool.retry_max(), 0);
    assert_eq!(pool.retry_delay(), RetryDefaults::DELAY);

    pool.set_retry(2, 0);
    assert_eq!(pool.retry_max(), 2);
    assert_eq!(pool.retry_delay(), Duration::ZERO);
}

// --- progress / summary ---

#[test]
fn test_progress_callback_sees_every_completion() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe));
    let calls = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&calls);

    let pool = WorkerPool::new(&registry)
        .with_workers(Some(3))
        .with_progress(Box::new(move |done, total| {
            sink.lock().unwrap().push((done, total))
        }));
    pool.execute(batch(&dir, 7));

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 7);
    assert!(calls.iter().all(|&(_, total)| total == 7));
    let done: Vec<usize> = calls.iter().map(|&(d, _)| d).collect();
    assert_eq!(done, (1..=7).collect::<Vec<_>>());
}

#[test]
fn test_summary_counts_each_outcome() {
    let dir = TempDir::new().unwrap();
    let probe = Probe::default();
    let registry = registry_with(MockConverter::new(&probe).failing_first(1));
    let mut pool = WorkerPool::new(&registry).with_workers(Some(1));
    pool.set_retry(0, 0);

    let mut jobs = batch(&dir, 3);
    jobs[2].skip_reason = Some(SkipReason::AlreadyConverted);
    let results = pool.execute(jobs);
    let summary = Summary::from_results(&results, Duration::from_millis(5));

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors[0].attempts, 1);
    assert!(summary.has_failures());
}
