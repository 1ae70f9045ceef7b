//! Polling engine. Authoritative for readiness: a file is emitted once it has been seen
//! unchanged for the whole settle window, and exactly once per stabilization.

use anyhow::{Context, Result, bail};
use log::debug;
use rayon::prelude::*;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};
use walkdir::WalkDir;

use crate::engine::tools::{has_format, is_os_hidden_file, normalize_format};
use crate::utils::config::WatchConsts;

use super::WatchEngine;

#[derive(Clone, Debug)]
pub struct WatchOptions {
    pub root: PathBuf,
    pub recursive: bool,
    /// Source formats to pick up, e.g. `["flac", "wav"]`. Normalized on construction.
    pub formats: Vec<String>,
    pub settle: Duration,
}

impl WatchOptions {
    pub fn new(root: impl Into<PathBuf>, formats: &[&str]) -> Self {
        Self {
            root: root.into(),
            recursive: false,
            formats: formats.iter().map(|f| normalize_format(f)).collect(),
            settle: WatchConsts::SETTLE,
        }
    }

    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    pub fn settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }
}

/// Last observed state of one tracked file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileState {
    pub size: u64,
    pub modified: Option<SystemTime>,
    pub last_change: Instant,
    pub processed: bool,
}

/// One pass over the tree: matching files with their size and mtime, plus every directory seen.
#[derive(Debug, Default)]
pub(crate) struct Scan {
    pub files: Vec<(PathBuf, u64, Option<SystemTime>)>,
    pub dirs: HashSet<PathBuf>,
}

pub struct PollingWatcher {
    opts: WatchOptions,
    state: HashMap<PathBuf, FileState>,
    dirs: HashSet<PathBuf>,
}

impl PollingWatcher {
    pub fn new(opts: WatchOptions) -> Self {
        Self {
            opts,
            state: HashMap::new(),
            dirs: HashSet::new(),
        }
    }

    pub fn options(&self) -> &WatchOptions {
        &self.opts
    }

    /// Directories seen by the last scan (root included).
    pub fn directories(&self) -> &HashSet<PathBuf> {
        &self.dirs
    }

    pub fn tracked(&self) -> usize {
        self.state.len()
    }

    pub fn state_of(&self, path: &Path) -> Option<&FileState> {
        self.state.get(path)
    }

    pub(crate) fn scan(&self) -> Result<Scan> {
        let root = &self.opts.root;
        let mut walker = WalkDir::new(root).follow_links(false);
        if !self.opts.recursive {
            walker = walker.max_depth(1);
        }

        let mut candidates = Vec::new();
        let mut dirs = HashSet::new();
        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(err) => {
                    // The root itself going away is fatal for this poll; anything below is not.
                    if err.depth() == 0 {
                        return Err(err).with_context(|| format!("scan {}", root.display()));
                    }
                    debug!("watch scan: {err}");
                    continue;
                }
            };
            if entry.file_type().is_dir() {
                dirs.insert(entry.into_path());
            } else if entry.file_type().is_file()
                && !is_os_hidden_file(entry.path())
                && has_format(entry.path(), &self.opts.formats)
            {
                candidates.push(entry.into_path());
            }
        }

        // A file can vanish between the walk and the stat; it is simply absent from this scan.
        let files = candidates
            .into_par_iter()
            .filter_map(|path| {
                let meta = fs::metadata(&path).ok()?;
                Some((path, meta.len(), meta.modified().ok()))
            })
            .collect();
        Ok(Scan { files, dirs })
    }
}

impl WatchEngine for PollingWatcher {
    fn bootstrap(&mut self) -> Result<()> {
        let root = &self.opts.root;
        let meta = fs::metadata(root).with_context(|| format!("watch root {}", root.display()))?;
        if !meta.is_dir() {
            bail!("watch root {} is not a directory", root.display());
        }

        let now = Instant::now();
        let scan = self.scan()?;
        self.state = scan
            .files
            .into_iter()
            .map(|(path, size, modified)| {
                let state = FileState {
                    size,
                    modified,
                    last_change: now,
                    processed: true,
                };
                (path, state)
            })
            .collect();
        self.dirs = scan.dirs;
        debug!(
            "watching {} ({} existing files ignored)",
            root.display(),
            self.state.len()
        );
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<Vec<PathBuf>> {
        let scan = self.scan()?;
        let mut seen = HashSet::with_capacity(scan.files.len());
        let mut ready = Vec::new();

        for (path, size, modified) in scan.files {
            match self.state.entry(path.clone()) {
                Entry::Vacant(slot) => {
                    // First sighting never fires; the settle window starts now.
                    slot.insert(FileState {
                        size,
                        modified,
                        last_change: now,
                        processed: false,
                    });
                }
                Entry::Occupied(mut slot) => {
                    let st = slot.get_mut();
                    if st.size != size || st.modified != modified {
                        st.size = size;
                        st.modified = modified;
                        st.last_change = now;
                        st.processed = false;
                    } else if !st.processed
                        && now.saturating_duration_since(st.last_change) >= self.opts.settle
                    {
                        st.processed = true;
                        ready.push(path.clone());
                    }
                }
            }
            seen.insert(path);
        }

        self.state.retain(|path, _| seen.contains(path));
        self.dirs = scan.dirs;
        ready.sort();
        Ok(ready)
    }

    fn root(&self) -> &Path {
        &self.opts.root
    }
}
