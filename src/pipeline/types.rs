//! Pipeline run results. Serialized as the resume report.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::duration_secs;

use super::spec::StepType;

/// Outcome of one executed step. `index` is 1-based across the whole pipeline.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    #[serde(rename = "type")]
    pub step_type: StepType,
    pub input: PathBuf,
    pub output: PathBuf,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Outcome of a whole pipeline run (possibly partial).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PipelineResult {
    pub input: PathBuf,
    #[serde(default)]
    pub final_output: Option<PathBuf>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    #[serde(with = "duration_secs")]
    pub duration: Duration,
    pub steps: Vec<StepResult>,
}

impl PipelineResult {
    /// Empty result for a run starting now.
    pub fn started(input: &Path, started_at: DateTime<Utc>) -> Self {
        Self {
            input: input.to_path_buf(),
            final_output: None,
            started_at,
            ended_at: started_at,
            duration: Duration::ZERO,
            steps: Vec::new(),
        }
    }

    /// Stamp `ended_at` and `duration`.
    pub fn finish(&mut self) {
        self.ended_at = Utc::now();
        self.duration = (self.ended_at - self.started_at)
            .to_std()
            .unwrap_or_default();
    }

    /// True if at least one step ran and every step succeeded.
    pub fn succeeded(&self) -> bool {
        !self.steps.is_empty() && self.steps.iter().all(|s| s.success)
    }
}
