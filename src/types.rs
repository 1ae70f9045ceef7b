//! Shared data contracts for the worker pool and its callers: jobs, results, summaries, options.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::converter::ConvertError;

/// How a conversion treats embedded metadata (tags, EXIF, chapters).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataMode {
    /// Let the converter decide (usually: carry over what the target format supports).
    #[default]
    Auto,
    /// Drop all metadata.
    Strip,
    /// Copy every metadata field verbatim.
    Keep,
}

impl MetadataMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataMode::Auto => "auto",
            MetadataMode::Strip => "strip",
            MetadataMode::Keep => "keep",
        }
    }
}

impl fmt::Display for MetadataMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetadataMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(MetadataMode::Auto),
            "strip" => Ok(MetadataMode::Strip),
            "keep" => Ok(MetadataMode::Keep),
            other => Err(anyhow::anyhow!(
                "invalid metadata mode {other:?} (expected auto, strip or keep)"
            )),
        }
    }
}

/// Per-conversion options handed to a [`Converter`](crate::converter::Converter).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Options {
    /// Quality 1..=100. `None` lets the converter pick its default.
    pub quality: Option<u8>,
    /// Forward converter output / chatter to the log.
    pub verbose: bool,
    pub metadata_mode: MetadataMode,
}

impl Options {
    /// Layer step-level overrides over these defaults. A set override always wins,
    /// so an explicit `Auto` replaces a default of `Strip`.
    pub fn with_overrides(&self, quality: Option<u8>, metadata_mode: Option<MetadataMode>) -> Self {
        Self {
            quality: quality.or(self.quality),
            verbose: self.verbose,
            metadata_mode: metadata_mode.unwrap_or(self.metadata_mode),
        }
    }
}

/// Why a job was reported as skipped instead of converted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Output path exists and the conflict policy is `skip`.
    OutputExists,
    /// A previous batch report lists this input as converted.
    AlreadyConverted,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::OutputExists => f.write_str("output already exists"),
            SkipReason::AlreadyConverted => f.write_str("already converted in a previous run"),
        }
    }
}

/// One independent single-file conversion submitted to the worker pool.
#[derive(Clone, Debug)]
pub struct Job {
    pub input: PathBuf,
    /// Already resolved through the conflict resolver.
    pub output: PathBuf,
    pub from: String,
    pub to: String,
    pub options: Options,
    /// When set, the pool reports the job as skipped without touching the filesystem.
    pub skip_reason: Option<SkipReason>,
}

/// Outcome of one [`Job`]. `success` and `skipped` are never both true.
#[derive(Clone, Debug)]
pub struct JobResult {
    pub input: PathBuf,
    pub output: PathBuf,
    pub success: bool,
    pub skipped: bool,
    pub attempts: u32,
    /// Size in bytes of the produced output.
    pub output_size: Option<u64>,
    pub error: Option<ConvertError>,
    pub skip_reason: Option<SkipReason>,
    pub duration: Duration,
}

impl JobResult {
    pub fn skipped(job: &Job, reason: SkipReason) -> Self {
        Self {
            input: job.input.clone(),
            output: job.output.clone(),
            success: false,
            skipped: true,
            attempts: 0,
            output_size: None,
            error: None,
            skip_reason: Some(reason),
            duration: Duration::ZERO,
        }
    }

    pub fn failed(job: &Job, error: ConvertError, attempts: u32, duration: Duration) -> Self {
        Self {
            input: job.input.clone(),
            output: job.output.clone(),
            success: false,
            skipped: false,
            attempts,
            output_size: None,
            error: Some(error),
            skip_reason: None,
            duration,
        }
    }

    pub fn succeeded(job: &Job, output_size: Option<u64>, attempts: u32, duration: Duration) -> Self {
        Self {
            input: job.input.clone(),
            output: job.output.clone(),
            success: true,
            skipped: false,
            attempts,
            output_size,
            error: None,
            skip_reason: None,
            duration,
        }
    }

    pub fn is_failure(&self) -> bool {
        !self.success && !self.skipped
    }
}

/// A failed job as surfaced to the user.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub input: PathBuf,
    pub message: String,
    pub attempts: u32,
}

/// Totals for one batch.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub errors: Vec<JobError>,
}

impl Summary {
    pub fn from_results(results: &[JobResult], duration: Duration) -> Self {
        let mut summary = Summary {
            total: results.len(),
            duration,
            ..Default::default()
        };
        for r in results {
            if r.success {
                summary.succeeded += 1;
            } else if r.skipped {
                summary.skipped += 1;
            } else {
                summary.failed += 1;
                summary.errors.push(JobError {
                    input: r.input.clone(),
                    message: r
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "unknown error".to_string()),
                    attempts: r.attempts,
                });
            }
        }
        summary
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Serialize a [`Duration`] as fractional seconds.
pub mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
