//! Sequential multi-step executor: each step's output is the next step's input.

use chrono::Utc;
use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

use crate::Options;
use crate::conflict::{ConflictError, ConflictPolicy, resolve_output_path};
use crate::converter::{ConvertError, ConverterRegistry, LoudnessTarget};
use crate::engine::pool::ensure_parent_dir;
use crate::engine::tools::{absolute_clean, detect_format, output_in_dir};
use crate::utils::tempfiles::RunTempDir;

use super::resume::ResumeError;
use super::spec::{Spec, SpecError, Step, StepKind, StepType};
use super::types::{PipelineResult, StepResult};

/// Caller-side settings for one pipeline run.
#[derive(Clone, Debug, Default)]
pub struct PipelineConfig {
    /// Directory for the final output when neither the step nor the spec forces a path.
    /// Defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
    /// Applied to the derived final output only, never to forced paths.
    pub conflict: ConflictPolicy,
    /// Pipeline-level options; steps override quality and metadata mode.
    pub defaults: Options,
    /// Keep the temp directory even after a successful run.
    pub keep_temp: bool,
    /// Parent for the temp directory. System temp when `None`.
    pub temp_root: Option<PathBuf>,
    /// File the final output is named after (stem and directory). Defaults to `spec.input`;
    /// set when resuming from an intermediate.
    pub origin: Option<PathBuf>,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    #[error(transparent)]
    Resume(#[from] ResumeError),

    #[error(transparent)]
    Conflict(#[from] ConflictError),

    #[error("output {0} already exists (conflict policy: skip)")]
    OutputExists(PathBuf),

    #[error("output {0} would overwrite the pipeline input")]
    OutputIsInput(PathBuf),

    #[error("{0:#}")]
    TempDir(anyhow::Error),

    #[error("step {index} ({step_type}) failed: {error}")]
    StepFailed {
        index: usize,
        step_type: StepType,
        error: ConvertError,
    },
}

/// A failed run: the error plus every step result gathered before it.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PipelineFailure {
    pub error: PipelineError,
    pub partial: PipelineResult,
}

impl PipelineFailure {
    pub fn new(error: impl Into<PipelineError>, mut partial: PipelineResult) -> Self {
        partial.finish();
        Self {
            error: error.into(),
            partial,
        }
    }
}

pub struct PipelineExecutor<'r> {
    registry: &'r ConverterRegistry,
}

impl<'r> PipelineExecutor<'r> {
    pub fn new(registry: &'r ConverterRegistry) -> Self {
        Self { registry }
    }

    /// Run `spec` step by step. Stops at the first failing step; later steps never run.
    pub fn execute(
        &self,
        spec: &Spec,
        config: &PipelineConfig,
    ) -> Result<PipelineResult, PipelineFailure> {
        let mut result = PipelineResult::started(&spec.input, Utc::now());
        if let Err(e) = spec.validate() {
            return Err(PipelineFailure::new(e, result));
        }
        let final_output = match plan_final_output(spec, config) {
            Ok(p) => p,
            Err(e) => return Err(PipelineFailure::new(e, result)),
        };

        let last = spec.steps.len() - 1;
        let mut temp: Option<RunTempDir> = None;
        let mut current = spec.input.clone();
        let mut failure = None;

        for (i, step) in spec.steps.iter().enumerate() {
            let index = i + 1;
            let output = if i == last {
                final_output.clone()
            } else if let Some(forced) = &step.output {
                forced.clone()
            } else {
                match temp_dir(&mut temp, config.temp_root.as_deref()) {
                    Ok(t) => intermediate_path(t, index, step, &current),
                    Err(e) => {
                        failure = Some(PipelineError::TempDir(e));
                        break;
                    }
                }
            };

            debug!(
                "step {index}/{} {}: {} -> {}",
                spec.steps.len(),
                step.step_type(),
                current.display(),
                output.display()
            );
            let started = Instant::now();
            let outcome = self.run_step(step, &current, &output, &config.defaults);
            result.steps.push(StepResult {
                index,
                step_type: step.step_type(),
                input: current.clone(),
                output: output.clone(),
                duration: started.elapsed(),
                success: outcome.is_ok(),
                error: outcome.as_ref().err().map(|e| e.to_string()),
            });
            if let Err(error) = outcome {
                failure = Some(PipelineError::StepFailed {
                    index,
                    step_type: step.step_type(),
                    error,
                });
                break;
            }
            current = output;
        }

        match failure {
            None => {
                result.final_output = Some(current);
                result.finish();
                finish_temp(temp, config.keep_temp);
                Ok(result)
            }
            Some(error) => {
                // Intermediates from successful steps are what a resume starts from.
                let produced = temp.as_ref().is_some_and(|t| {
                    result
                        .steps
                        .iter()
                        .any(|s| s.success && s.output.starts_with(t.path()))
                });
                finish_temp(temp, config.keep_temp || produced);
                Err(PipelineFailure::new(error, result))
            }
        }
    }

    fn run_step(
        &self,
        step: &Step,
        input: &Path,
        output: &Path,
        defaults: &Options,
    ) -> Result<(), ConvertError> {
        ensure_parent_dir(output)?;
        let options = defaults.with_overrides(step.quality(), step.metadata_mode);
        match &step.kind {
            StepKind::Convert { to, .. } => {
                let from = detect_format(input);
                self.registry
                    .find(&from, to)?
                    .convert(input, output, &options)
            }
            StepKind::AudioNormalize {
                target_lufs,
                target_tp,
                target_lra,
            } => {
                let target = LoudnessTarget::from_overrides(*target_lufs, *target_tp, *target_lra);
                self.registry
                    .normalizer()?
                    .normalize(input, output, &target, &options)
            }
        }
    }
}

/// Decide the last step's output before anything runs, so a `skip` conflict fails
/// without side effects.
fn plan_final_output(spec: &Spec, config: &PipelineConfig) -> Result<PathBuf, PipelineError> {
    let origin = config.origin.as_deref().unwrap_or(&spec.input);
    let forced = spec.steps.last().and_then(|s| s.output.clone()).or_else(|| spec.output.clone());
    if let Some(path) = forced {
        if same_path(&path, &spec.input) || same_path(&path, origin) {
            return Err(PipelineError::OutputIsInput(path));
        }
        return Ok(path);
    }

    let dir = config
        .output_dir
        .clone()
        .or_else(|| origin.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    let desired = output_in_dir(origin, &dir, &spec.final_format());
    // A derived name equal to the input (e.g. a lone normalize step) must never clobber it.
    let policy = if same_path(&desired, origin) || same_path(&desired, &spec.input) {
        ConflictPolicy::Versioned
    } else {
        config.conflict
    };
    let resolved = resolve_output_path(&desired, policy)?;
    if resolved.skip {
        return Err(PipelineError::OutputExists(resolved.path));
    }
    Ok(resolved.path)
}

fn same_path(a: &Path, b: &Path) -> bool {
    match (absolute_clean(a), absolute_clean(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Lazily create the run's temp dir on first use.
fn temp_dir<'t>(
    slot: &'t mut Option<RunTempDir>,
    root: Option<&Path>,
) -> anyhow::Result<&'t RunTempDir> {
    let dir = match slot.take() {
        Some(dir) => dir,
        None => RunTempDir::create(root)?,
    };
    Ok(slot.insert(dir))
}

fn intermediate_path(temp: &RunTempDir, index: usize, step: &Step, current: &Path) -> PathBuf {
    let stem = current
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "intermediate".to_string());
    temp.intermediate_path(index, &stem, &step.output_format(&detect_format(current)))
}

fn finish_temp(temp: Option<RunTempDir>, keep: bool) {
    let Some(temp) = temp else {
        return;
    };
    if keep {
        let path = temp.keep();
        info!("intermediate files kept in {}", path.display());
    } else if let Err(e) = temp.remove() {
        warn!("{e:#}");
    }
}
