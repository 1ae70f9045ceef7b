//! Pipeline specification: an input file and an ordered list of steps, loaded from JSON.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::MetadataMode;
use crate::engine::tools::{detect_format, normalize_format};

/// Discriminant of a step, as written in reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepType {
    Convert,
    AudioNormalize,
}

impl fmt::Display for StepType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StepType::Convert => "convert",
            StepType::AudioNormalize => "audio-normalize",
        })
    }
}

/// What a step does, with its kind-specific parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum StepKind {
    /// Format conversion to `to`.
    Convert {
        to: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
    },
    /// Loudness normalization; output keeps the input's format.
    AudioNormalize {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_lufs: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_tp: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_lra: Option<f64>,
    },
}

/// One pipeline stage.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Step {
    #[serde(flatten)]
    pub kind: StepKind,
    /// Explicit output path for this step; wins over every derived path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    /// Overrides the pipeline-level metadata mode for this step only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_mode: Option<MetadataMode>,
}

impl Step {
    pub fn convert(to: &str) -> Self {
        Self {
            kind: StepKind::Convert {
                to: to.to_string(),
                quality: None,
            },
            output: None,
            metadata_mode: None,
        }
    }

    pub fn audio_normalize() -> Self {
        Self {
            kind: StepKind::AudioNormalize {
                target_lufs: None,
                target_tp: None,
                target_lra: None,
            },
            output: None,
            metadata_mode: None,
        }
    }

    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.output = Some(output.into());
        self
    }

    pub fn step_type(&self) -> StepType {
        match self.kind {
            StepKind::Convert { .. } => StepType::Convert,
            StepKind::AudioNormalize { .. } => StepType::AudioNormalize,
        }
    }

    pub fn quality(&self) -> Option<u8> {
        match self.kind {
            StepKind::Convert { quality, .. } => quality,
            StepKind::AudioNormalize { .. } => None,
        }
    }

    /// Format this step produces when fed a file of format `input_format`.
    pub fn output_format(&self, input_format: &str) -> String {
        match &self.kind {
            StepKind::Convert { to, .. } => normalize_format(to),
            StepKind::AudioNormalize { .. } => input_format.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SpecError {
    #[error("read pipeline spec {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse pipeline spec: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("pipeline spec has no input")]
    EmptyInput,

    #[error("pipeline spec has no steps")]
    NoSteps,

    #[error("step {index}: convert step needs a target format")]
    MissingTarget { index: usize },

    #[error("step {index}: quality {quality} out of range 1..=100")]
    InvalidQuality { index: usize, quality: u8 },
}

/// A multi-step conversion of one input.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Spec {
    pub input: PathBuf,
    /// Forced final output; bypasses the conflict policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    pub steps: Vec<Step>,
}

impl Spec {
    pub fn new(input: impl Into<PathBuf>, steps: Vec<Step>) -> Self {
        Self {
            input: input.into(),
            output: None,
            steps,
        }
    }

    /// Read, parse and validate a JSON spec file.
    pub fn load(path: &Path) -> Result<Self, SpecError> {
        let raw = std::fs::read_to_string(path).map_err(|source| SpecError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, SpecError> {
        let spec: Spec = serde_json::from_str(raw)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Check structural invariants. Unknown step kinds cannot be represented, so only
    /// the field-level rules are checked here.
    pub fn validate(&self) -> Result<(), SpecError> {
        if self.input.as_os_str().is_empty() {
            return Err(SpecError::EmptyInput);
        }
        if self.steps.is_empty() {
            return Err(SpecError::NoSteps);
        }
        for (i, step) in self.steps.iter().enumerate() {
            if let StepKind::Convert { to, quality } = &step.kind {
                if to.trim().is_empty() {
                    return Err(SpecError::MissingTarget { index: i + 1 });
                }
                if let Some(q) = *quality
                    && !(1..=100).contains(&q)
                {
                    return Err(SpecError::InvalidQuality {
                        index: i + 1,
                        quality: q,
                    });
                }
            }
        }
        Ok(())
    }

    /// Format of the file the last step produces.
    pub fn final_format(&self) -> String {
        self.steps
            .iter()
            .fold(detect_format(&self.input), |fmt, step| step.output_format(&fmt))
    }
}
