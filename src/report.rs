//! Batch and pipeline reports (text or JSON), and the batch-resume index read back from them.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::{self, Write as _};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::engine::tools::absolute_clean;
use crate::pipeline::PipelineResult;
use crate::{JobResult, SkipReason, Summary, duration_secs};

/// Report output selection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReportFormat {
    #[default]
    Off,
    Txt,
    Json,
}

impl ReportFormat {
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ReportFormat::Off => None,
            ReportFormat::Txt => Some("txt"),
            ReportFormat::Json => Some("json"),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Off => "off",
            ReportFormat::Txt => "txt",
            ReportFormat::Json => "json",
        })
    }
}

impl FromStr for ReportFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "off" | "none" => Ok(ReportFormat::Off),
            "txt" | "text" => Ok(ReportFormat::Txt),
            "json" => Ok(ReportFormat::Json),
            other => Err(anyhow::anyhow!(
                "invalid report format {other:?} (expected off, txt or json)"
            )),
        }
    }
}

pub const STATUS_SUCCESS: &str = "success";
pub const STATUS_SKIPPED: &str = "skipped";
pub const STATUS_FAILED: &str = "failed";

/// One line of a batch report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchItem {
    pub input: PathBuf,
    #[serde(default)]
    pub output: PathBuf,
    pub status: String,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<SkipReason>,
    #[serde(default, with = "duration_secs")]
    pub duration: Duration,
}

impl From<&JobResult> for BatchItem {
    fn from(r: &JobResult) -> Self {
        let status = if r.success {
            STATUS_SUCCESS
        } else if r.skipped {
            STATUS_SKIPPED
        } else {
            STATUS_FAILED
        };
        Self {
            input: r.input.clone(),
            output: r.output.clone(),
            status: status.to_string(),
            attempts: r.attempts,
            size: r.output_size,
            error: r.error.as_ref().map(|e| e.to_string()),
            skip_reason: r.skip_reason,
            duration: r.duration,
        }
    }
}

/// Full batch report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BatchReport {
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub summary: Summary,
    pub items: Vec<BatchItem>,
}

impl BatchReport {
    /// Items sorted by input path so reports are stable across runs.
    pub fn new(results: &[JobResult], summary: Summary) -> Self {
        let mut items: Vec<BatchItem> = results.iter().map(BatchItem::from).collect();
        items.sort_by(|a, b| a.input.cmp(&b.input));
        Self {
            generated_at: Utc::now(),
            summary,
            items,
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("read batch report {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parse batch report {}", path.display()))
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let s = &self.summary;
        let _ = writeln!(out, "Conversion report ({})", self.generated_at.to_rfc3339());
        let _ = writeln!(
            out,
            "Total: {}  Succeeded: {}  Skipped: {}  Failed: {}  Duration: {:.2}s",
            s.total,
            s.succeeded,
            s.skipped,
            s.failed,
            s.duration.as_secs_f64()
        );
        let _ = writeln!(out);
        for item in &self.items {
            let _ = write!(
                out,
                "[{:<7}] {} -> {}",
                item.status,
                item.input.display(),
                item.output.display()
            );
            if let Some(size) = item.size {
                let _ = write!(out, " ({size} bytes)");
            }
            if item.attempts > 1 {
                let _ = write!(out, " after {} attempts", item.attempts);
            }
            if let Some(reason) = item.skip_reason {
                let _ = write!(out, ": {reason}");
            }
            if let Some(err) = &item.error {
                let _ = write!(out, ": {err}");
            }
            let _ = writeln!(out);
        }
        out
    }
}

/// Render a pipeline result as text.
pub fn pipeline_text(result: &PipelineResult) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Pipeline report for {}", result.input.display());
    let _ = writeln!(
        out,
        "Started: {}  Ended: {}  Duration: {:.2}s",
        result.started_at.to_rfc3339(),
        result.ended_at.to_rfc3339(),
        result.duration.as_secs_f64()
    );
    match &result.final_output {
        Some(p) => {
            let _ = writeln!(out, "Final output: {}", p.display());
        }
        None => {
            let _ = writeln!(out, "Final output: (none)");
        }
    }
    let _ = writeln!(out);
    for step in &result.steps {
        let status = if step.success {
            STATUS_SUCCESS
        } else {
            STATUS_FAILED
        };
        let _ = write!(
            out,
            "{:>2}. {:<15} [{:<7}] {} -> {} ({:.2}s)",
            step.index,
            step.step_type.to_string(),
            status,
            step.input.display(),
            step.output.display(),
            step.duration.as_secs_f64()
        );
        if let Some(err) = &step.error {
            let _ = write!(out, ": {err}");
        }
        let _ = writeln!(out);
    }
    out
}

/// Write `value` as `format` to `dest`, or to stdout when `dest` is `None`. No-op for `Off`.
pub fn emit<T: Serialize>(
    format: ReportFormat,
    value: &T,
    text: impl FnOnce(&T) -> String,
    dest: Option<&Path>,
) -> Result<()> {
    let body = match format {
        ReportFormat::Off => return Ok(()),
        ReportFormat::Txt => text(value),
        ReportFormat::Json => {
            let mut s = serde_json::to_string_pretty(value).context("serialize report")?;
            s.push('\n');
            s
        }
    };
    match dest {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("create report directory {}", parent.display()))?;
            }
            std::fs::write(path, body)
                .with_context(|| format!("write report {}", path.display()))?;
            log::info!("report written to {}", path.display());
        }
        None => print!("{body}"),
    }
    Ok(())
}

/// Inputs a previous batch run converted successfully.
/// Indexed by both the literal path and its absolute, cleaned form.
#[derive(Debug, Default)]
pub struct ConvertedIndex {
    paths: HashSet<PathBuf>,
}

impl ConvertedIndex {
    pub fn load(report: &Path) -> Result<Self> {
        Ok(Self::from_report(&BatchReport::load(report)?))
    }

    pub fn from_report(report: &BatchReport) -> Self {
        let mut paths = HashSet::new();
        for item in &report.items {
            if !item.status.trim().eq_ignore_ascii_case(STATUS_SUCCESS) {
                continue;
            }
            if let Ok(abs) = absolute_clean(&item.input) {
                paths.insert(abs);
            }
            paths.insert(item.input.clone());
        }
        Self { paths }
    }

    pub fn contains(&self, input: &Path) -> bool {
        self.paths.contains(input)
            || absolute_clean(input).is_ok_and(|abs| self.paths.contains(&abs))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}
