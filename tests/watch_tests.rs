mod common;

use anyhow::anyhow;
use common::{MockConverter, Probe, touch};
use convx::SkipReason;
use convx::conflict::ConflictPolicy;
use convx::converter::ConverterRegistry;
use convx::engine::WorkerPool;
use convx::watch::{
    EventWatcher, PollingWatcher, WatchEngine, WatchJobs, WatchOptions, run_watch,
};
use crossbeam_channel::{Sender, bounded};
use std::collections::VecDeque;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

const SETTLE: Duration = Duration::from_secs(2);

fn watcher(root: &Path) -> PollingWatcher {
    PollingWatcher::new(WatchOptions::new(root, &["flac", "wav"]).settle(SETTLE))
}

fn append(path: &Path, bytes: &[u8]) {
    let mut f = OpenOptions::new().append(true).open(path).unwrap();
    f.write_all(bytes).unwrap();
}

// --- bootstrap ---

#[test]
fn test_bootstrap_rejects_non_directory_root() {
    let dir = TempDir::new().unwrap();
    let file = touch(dir.path(), "song.flac", b"x");
    assert!(watcher(&file).bootstrap().is_err());
    assert!(watcher(&dir.path().join("missing")).bootstrap().is_err());
}

#[test]
fn test_existing_files_are_never_emitted() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "old.flac", b"already here");
    let mut w = watcher(dir.path());
    w.bootstrap().unwrap();

    let t0 = Instant::now();
    for secs in [0, 1, 5, 60, 3600] {
        assert!(w.poll(t0 + Duration::from_secs(secs)).unwrap().is_empty());
    }
    assert_eq!(w.tracked(), 1);
}

// --- settle window ---

#[test]
fn test_new_file_waits_for_settle_then_fires_once() {
    let dir = TempDir::new().unwrap();
    let mut w = watcher(dir.path());
    w.bootstrap().unwrap();
    let song = touch(dir.path(), "new.flac", b"fresh");

    let t0 = Instant::now();
    assert!(w.poll(t0).unwrap().is_empty(), "first sighting never fires");
    assert!(w.poll(t0 + SETTLE - Duration::from_millis(1)).unwrap().is_empty());
    assert_eq!(w.poll(t0 + SETTLE).unwrap(), vec![song]);
    assert!(w.poll(t0 + SETTLE * 2).unwrap().is_empty());
    assert!(w.poll(t0 + SETTLE * 10).unwrap().is_empty());
}

#[test]
fn test_change_restarts_settle_wait() {
    let dir = TempDir::new().unwrap();
    let mut w = watcher(dir.path());
    w.bootstrap().unwrap();
    let song = touch(dir.path(), "growing.wav", b"part1");

    let t0 = Instant::now();
    w.poll(t0).unwrap();
    append(&song, b"part2");
    let t1 = t0 + Duration::from_secs(1);
    assert!(w.poll(t1).unwrap().is_empty());
    // Settle counted from t0 would be over; counted from the change at t1 it is not.
    assert!(w.poll(t0 + SETTLE + Duration::from_millis(500)).unwrap().is_empty());
    assert_eq!(w.poll(t1 + SETTLE).unwrap(), vec![song]);
}

#[test]
fn test_processed_file_fires_again_after_new_change() {
    let dir = TempDir::new().unwrap();
    let mut w = watcher(dir.path());
    w.bootstrap().unwrap();
    let song = touch(dir.path(), "again.flac", b"v1");

    let t0 = Instant::now();
    w.poll(t0).unwrap();
    assert_eq!(w.poll(t0 + SETTLE).unwrap(), vec![song.clone()]);

    append(&song, b"-v2");
    let t1 = t0 + SETTLE + Duration::from_secs(1);
    assert!(w.poll(t1).unwrap().is_empty());
    assert!(!w.state_of(&song).unwrap().processed);
    assert_eq!(w.poll(t1 + SETTLE).unwrap(), vec![song]);
}

// --- filtering / pruning ---

#[test]
fn test_only_matching_formats_are_tracked() {
    let dir = TempDir::new().unwrap();
    let mut w = watcher(dir.path());
    w.bootstrap().unwrap();
    touch(dir.path(), "notes.txt", b"x");
    touch(dir.path(), "._resource.flac", b"x");
    touch(dir.path(), "LOUD.FLAC", b"x");

    w.poll(Instant::now()).unwrap();
    assert_eq!(w.tracked(), 1);
}

#[test]
fn test_recursion_flag_controls_depth() {
    let dir = TempDir::new().unwrap();
    let nested = touch(dir.path(), "a/b/deep.flac", b"x");

    let mut flat = watcher(dir.path());
    flat.bootstrap().unwrap();
    assert_eq!(flat.tracked(), 0);

    let mut deep = PollingWatcher::new(
        WatchOptions::new(dir.path(), &["flac"])
            .recursive(true)
            .settle(SETTLE),
    );
    deep.bootstrap().unwrap();
    assert!(deep.state_of(&nested).is_some());
    assert!(deep.directories().contains(&dir.path().join("a/b")));
}

#[test]
fn test_vanished_files_are_pruned() {
    let dir = TempDir::new().unwrap();
    let song = touch(dir.path(), "gone.flac", b"x");
    let mut w = watcher(dir.path());
    w.bootstrap().unwrap();
    assert_eq!(w.tracked(), 1);

    fs::remove_file(&song).unwrap();
    w.poll(Instant::now()).unwrap();
    assert_eq!(w.tracked(), 0);
}

// --- event-assisted engine ---

#[test]
fn test_event_watcher_defers_to_polling_rules() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "old.flac", b"x");
    let mut w = EventWatcher::new(WatchOptions::new(dir.path(), &["flac"]).settle(SETTLE));
    w.bootstrap().unwrap();
    if w.is_event_driven() {
        assert!(w.wakeups().is_some());
        assert!(w.watched_dirs().contains(dir.path()));
    } else {
        assert!(w.wakeups().is_none());
    }

    let song = touch(dir.path(), "new.flac", b"fresh");
    let t0 = Instant::now();
    assert!(w.poll(t0).unwrap().is_empty());
    assert_eq!(w.poll(t0 + SETTLE).unwrap(), vec![song]);
}

// --- jobs ---

#[test]
fn test_jobs_mirror_tree_and_honour_skip_policy() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("in");
    let out = dir.path().join("out");
    let a = touch(&root, "x/a.flac", b"x");
    let b = touch(&root, "b.flac", b"x");
    touch(&out, "b.mp3", b"taken");
    let mut jobs = WatchJobs::new(&root, &out, "MP3");
    jobs.conflict = ConflictPolicy::Skip;

    let built = jobs.build(&[a, b]);

    assert_eq!(built.len(), 2);
    assert_eq!(built[0].output, out.join("x/a.mp3"));
    assert_eq!(built[0].from, "flac");
    assert_eq!(built[0].to, "mp3");
    assert_eq!(built[0].skip_reason, None);
    assert_eq!(built[1].skip_reason, Some(SkipReason::OutputExists));
}

#[test]
fn test_jobs_in_one_batch_get_distinct_outputs() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("in");
    let out = dir.path().join("out");
    let flac = touch(&root, "a.flac", b"x");
    let wav = touch(&root, "a.wav", b"x");
    let mut jobs = WatchJobs::new(&root, &out, "mp3");

    let built = jobs.build(&[flac.clone(), wav.clone()]);
    assert_eq!(built[0].output, out.join("a.mp3"));
    assert_eq!(built[1].output, out.join("a (1).mp3"));

    jobs.conflict = ConflictPolicy::Skip;
    let built = jobs.build(&[flac, wav]);
    assert_eq!(built[0].skip_reason, None);
    assert_eq!(built[1].skip_reason, Some(SkipReason::OutputExists));
}

// --- watch loop ---

/// Replays scripted poll outcomes, then requests shutdown.
struct ScriptedEngine {
    root: PathBuf,
    script: VecDeque<anyhow::Result<Vec<PathBuf>>>,
    shutdown: Sender<()>,
    bootstraps: usize,
}

impl WatchEngine for ScriptedEngine {
    fn bootstrap(&mut self) -> anyhow::Result<()> {
        self.bootstraps += 1;
        Ok(())
    }

    fn poll(&mut self, _now: Instant) -> anyhow::Result<Vec<PathBuf>> {
        match self.script.pop_front() {
            Some(step) => step,
            None => {
                let _ = self.shutdown.try_send(());
                Ok(Vec::new())
            }
        }
    }

    fn root(&self) -> &Path {
        &self.root
    }
}

#[test]
fn test_watch_loop_survives_poll_errors_and_converts_batches() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("in");
    let out = dir.path().join("out");
    let song = touch(&root, "sub/song.flac", b"x");
    let (tx, rx) = bounded(1);
    let mut engine = ScriptedEngine {
        root: root.clone(),
        script: VecDeque::from(vec![
            Err(anyhow!("transient scan failure")),
            Ok(vec![song]),
            Ok(Vec::new()),
        ]),
        shutdown: tx,
        bootstraps: 0,
    };
    let probe = Probe::default();
    let mut registry = ConverterRegistry::new();
    registry.register(MockConverter::new(&probe));
    let pool = WorkerPool::new(&registry);
    let jobs = WatchJobs::new(&root, &out, "mp3");
    let mut batches = Vec::new();

    let stats = run_watch(
        &mut engine,
        &pool,
        &jobs,
        Duration::from_millis(5),
        &rx,
        |results| batches.push(results.len()),
    )
    .unwrap();

    assert_eq!(engine.bootstraps, 1);
    assert_eq!(stats.poll_errors, 1);
    assert_eq!(stats.batches, 1);
    assert_eq!(stats.succeeded, 1);
    assert_eq!(batches, vec![1]);
    assert!(stats.polls >= 4);
    assert!(out.join("sub/song.mp3").exists());
}

#[test]
fn test_watch_loop_stops_before_polling_when_shut_down() {
    let dir = TempDir::new().unwrap();
    let (tx, rx) = bounded(1);
    tx.send(()).unwrap();
    let mut engine = ScriptedEngine {
        root: dir.path().to_path_buf(),
        script: VecDeque::new(),
        shutdown: tx,
        bootstraps: 0,
    };
    let registry = ConverterRegistry::new();
    let pool = WorkerPool::new(&registry);
    let jobs = WatchJobs::new(dir.path(), dir.path(), "mp3");

    let stats = run_watch(
        &mut engine,
        &pool,
        &jobs,
        Duration::from_millis(5),
        &rx,
        |_| {},
    )
    .unwrap();

    assert_eq!(stats.polls, 0);
}

#[test]
fn test_watch_loop_propagates_bootstrap_failure() {
    let dir = TempDir::new().unwrap();
    let file = touch(dir.path(), "not-a-dir.flac", b"x");
    let (_tx, rx) = bounded::<()>(1);
    let registry = ConverterRegistry::new();
    let pool = WorkerPool::new(&registry);
    let jobs = WatchJobs::new(&file, dir.path(), "mp3");
    let mut engine = watcher(&file);

    let result = run_watch(
        &mut engine,
        &pool,
        &jobs,
        Duration::from_millis(5),
        &rx,
        |_| {},
    );
    assert!(result.is_err());
}
