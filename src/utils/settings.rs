//! Load `.convx.toml` from the working directory (CLI only). Library callers build
//! [`Settings`] themselves or use the defaults.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::MetadataMode;
use crate::conflict::ConflictPolicy;
use crate::report::ReportFormat;
use crate::utils::config::{DEFAULT_FFMPEG, PackagePaths, RetryDefaults, WatchConsts};

/// Effective runtime settings before CLI flags are applied.
#[derive(Clone, Debug)]
pub struct Settings {
    pub conflict: ConflictPolicy,
    pub quality: Option<u8>,
    pub metadata_mode: MetadataMode,
    pub workers: Option<usize>,
    pub retry_max: i64,
    pub retry_delay_ms: i64,
    pub settle: Duration,
    pub poll_interval: Duration,
    pub report: ReportFormat,
    pub ffmpeg: PathBuf,
    pub keep_temp: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            conflict: ConflictPolicy::default(),
            quality: None,
            metadata_mode: MetadataMode::default(),
            workers: None,
            retry_max: RetryDefaults::MAX as i64,
            retry_delay_ms: RetryDefaults::DELAY.as_millis() as i64,
            settle: WatchConsts::SETTLE,
            poll_interval: WatchConsts::POLL_INTERVAL,
            report: ReportFormat::Off,
            ffmpeg: PathBuf::from(DEFAULT_FFMPEG),
            keep_temp: false,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct SettingsToml {
    #[serde(default)]
    settings: SettingsSection,
}

#[derive(Debug, Default, Deserialize)]
struct SettingsSection {
    conflict: Option<String>,
    quality: Option<u8>,
    metadata_mode: Option<String>,
    workers: Option<usize>,
    retry_max: Option<i64>,
    retry_delay_ms: Option<i64>,
    settle_ms: Option<u64>,
    poll_interval_ms: Option<u64>,
    report: Option<String>,
    ffmpeg: Option<String>,
    keep_temp: Option<bool>,
}

/// Load the settings file from `dir` if present. Returns None if missing or unparsable.
pub(crate) fn load_settings_toml(dir: &Path) -> Option<SettingsToml> {
    let path = dir.join(PackagePaths::get().settings_filename());
    let s = std::fs::read_to_string(&path).ok()?;
    toml::from_str(&s)
        .map_err(|e| log::warn!("{}: {}", path.display(), e))
        .ok()
}

/// Overwrite settings field from file when present.
macro_rules! apply_file_opt {
    ($sec:expr, $settings:expr, $sec_field:ident => $settings_field:ident) => {
        if let Some(v) = $sec.$sec_field {
            $settings.$settings_field = v;
        }
    };
}

/// Parse a string setting; on error log and leave the current value.
fn apply_parsed<T: FromStr>(raw: &Option<String>, key: &str, target: &mut T)
where
    T::Err: std::fmt::Display,
{
    if let Some(raw) = raw {
        match raw.parse::<T>() {
            Ok(v) => *target = v,
            Err(e) => log::warn!("ignoring settings.{key}: {e}"),
        }
    }
}

/// Apply file config (only fields present in the file). Call before applying CLI flags.
pub(crate) fn apply_file_to_settings(file: &SettingsToml, settings: &mut Settings) {
    let sec = &file.settings;
    apply_parsed(&sec.conflict, "conflict", &mut settings.conflict);
    apply_parsed(&sec.metadata_mode, "metadata_mode", &mut settings.metadata_mode);
    apply_parsed(&sec.report, "report", &mut settings.report);
    if let Some(q) = sec.quality {
        settings.quality = Some(q.clamp(1, 100));
    }
    if let Some(w) = sec.workers {
        settings.workers = Some(w);
    }
    apply_file_opt!(sec, settings, retry_max => retry_max);
    apply_file_opt!(sec, settings, retry_delay_ms => retry_delay_ms);
    apply_file_opt!(sec, settings, keep_temp => keep_temp);
    if let Some(ms) = sec.settle_ms {
        settings.settle = Duration::from_millis(ms);
    }
    if let Some(ms) = sec.poll_interval_ms {
        settings.poll_interval = Duration::from_millis(ms.max(1));
    }
    if let Some(ref bin) = sec.ffmpeg {
        settings.ffmpeg = PathBuf::from(bin);
    }
}

/// Defaults overlaid with the settings file in `dir`, if any.
pub fn load_settings(dir: &Path) -> Settings {
    let mut settings = Settings::default();
    if let Some(file) = load_settings_toml(dir) {
        log::debug!("loaded {}", PackagePaths::get().settings_filename());
        apply_file_to_settings(&file, &mut settings);
    }
    settings
}
