//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    settings_filename: String,
    temp_prefix: String,
    report_stem: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                settings_filename: format!(".{pkg}.toml"),
                temp_prefix: format!("{pkg}-pipeline-"),
                report_stem: format!("{pkg}-report"),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Settings file looked up in the working directory (e.g. `.convx.toml`).
    pub fn settings_filename(&self) -> &str {
        &self.settings_filename
    }

    /// Prefix of the per-run pipeline temp directory.
    pub fn temp_prefix(&self) -> &str {
        &self.temp_prefix
    }

    /// Default report filename for the given extension (`txt` / `json`).
    pub fn report_filename(&self, ext: &str) -> String {
        format!("{}.{ext}", self.report_stem)
    }
}

// ---- Worker threads ----

/// Worker pool sizing.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Hard cap as a multiple of `all_threads`, whatever the caller asks for.
    pub max_factor: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 1,
            max_factor: Self::MAX_FACTOR,
        }
    }
}

impl WorkerThreadLimits {
    pub const MAX_FACTOR: usize = 2;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads().max(1),
            ..Self::default()
        }
    }

    /// Ceiling for any pool, regardless of what was requested.
    pub fn hard_cap(&self) -> usize {
        self.all_threads * self.max_factor
    }

    /// Worker count for `jobs` jobs: requested (or CPU count), capped, never more than jobs, at least 1.
    pub fn workers_for(&self, requested: Option<usize>, jobs: usize) -> usize {
        let wanted = requested.filter(|n| *n > 0).unwrap_or(self.all_threads);
        wanted.min(self.hard_cap()).min(jobs).max(1)
    }
}

// ---- Retry ----

/// Pool-wide retry defaults.
pub struct RetryDefaults;

impl RetryDefaults {
    /// Extra attempts after the first.
    pub const MAX: u32 = 1;
    pub const DELAY: Duration = Duration::from_millis(500);
}

// ---- Watch ----

/// Directory watcher timing defaults.
pub struct WatchConsts;

impl WatchConsts {
    /// Quiet period after the last observed change before a file is considered complete.
    pub const SETTLE: Duration = Duration::from_secs(2);
    /// Ticker interval between polls.
    pub const POLL_INTERVAL: Duration = Duration::from_secs(1);
}

// ---- Progress ----

/// Progress bar tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Below this many jobs the bar is not worth drawing.
    pub const MIN_JOBS_FOR_BAR: usize = 2;
}

/// Default external tool used by the bundled converter.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";
