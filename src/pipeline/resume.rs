//! Resume planning: reuse the verified prefix of a previous run's report and execute the rest.

use chrono::{DateTime, Utc};
use log::{debug, info};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::executor::{PipelineConfig, PipelineExecutor, PipelineFailure};
use super::spec::{Spec, SpecError, StepType};
use super::types::{PipelineResult, StepResult};

#[derive(Debug, Error)]
pub enum ResumeError {
    #[error("read resume report {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse resume report {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("resume report has {prior} steps but the pipeline has only {current}; cannot resume")]
    ReportLonger { prior: usize, current: usize },

    #[error("step {index} was a {prior} step in the resume report but is now {current}; cannot resume")]
    StepTypeMismatch {
        index: usize,
        prior: StepType,
        current: StepType,
    },

    #[error("resume input {path} (output of step {index}) no longer exists")]
    MissingIntermediate { path: PathBuf, index: usize },

    #[error(transparent)]
    InvalidSpec(#[from] SpecError),
}

/// What to execute on resume and what to splice back into the final result.
#[derive(Clone, Debug, PartialEq)]
pub struct ResumePlan {
    pub original_input: PathBuf,
    /// Spec to actually run: input replaced by the last verified output, steps truncated.
    pub spec: Spec,
    /// Prior step results reused verbatim.
    pub verified: Vec<StepResult>,
    pub step_offset: usize,
    /// Everything already succeeded; nothing to run.
    pub skip_execution: bool,
    /// The prior report, kept when it contributes to the result.
    pub prior: Option<PipelineResult>,
}

impl ResumePlan {
    /// Plan that runs `spec` from scratch.
    pub fn fresh(spec: &Spec) -> Self {
        Self {
            original_input: spec.input.clone(),
            spec: spec.clone(),
            verified: Vec::new(),
            step_offset: 0,
            skip_execution: false,
            prior: None,
        }
    }
}

/// Load a pipeline report written by a previous run.
pub fn load_report(path: &Path) -> Result<PipelineResult, ResumeError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ResumeError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| ResumeError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Build a plan for `spec`, resuming from `prior_report` when given.
pub fn build_resume_plan(
    spec: &Spec,
    prior_report: Option<&Path>,
) -> Result<ResumePlan, ResumeError> {
    spec.validate()?;
    match prior_report {
        None => Ok(ResumePlan::fresh(spec)),
        Some(path) => plan_from_prior(spec, load_report(path)?),
    }
}

/// Compare `prior` to `spec` and keep the longest prefix of successful, type-matching steps.
/// A step that succeeded before under a different type means the report belongs to another
/// pipeline, which is an error rather than a silent re-run.
pub fn plan_from_prior(spec: &Spec, prior: PipelineResult) -> Result<ResumePlan, ResumeError> {
    if prior.steps.len() > spec.steps.len() {
        return Err(ResumeError::ReportLonger {
            prior: prior.steps.len(),
            current: spec.steps.len(),
        });
    }

    let step_offset = prior
        .steps
        .iter()
        .zip(&spec.steps)
        .take_while(|(done, want)| done.success && done.step_type == want.step_type())
        .count();
    if let Some((done, want)) = prior.steps.iter().zip(&spec.steps).nth(step_offset)
        && done.step_type != want.step_type()
    {
        if done.success {
            return Err(ResumeError::StepTypeMismatch {
                index: step_offset + 1,
                prior: done.step_type,
                current: want.step_type(),
            });
        }
        debug!(
            "failed step {} changed from {} to {}",
            step_offset + 1,
            done.step_type,
            want.step_type()
        );
    }

    if step_offset == 0 {
        return Ok(ResumePlan::fresh(spec));
    }
    let verified = prior.steps[..step_offset].to_vec();

    if step_offset == spec.steps.len() {
        info!("all {step_offset} steps already completed; nothing to resume");
        return Ok(ResumePlan {
            original_input: spec.input.clone(),
            spec: spec.clone(),
            verified,
            step_offset,
            skip_execution: true,
            prior: Some(prior),
        });
    }

    let resume_input = verified[step_offset - 1].output.clone();
    if !resume_input.exists() {
        return Err(ResumeError::MissingIntermediate {
            path: resume_input,
            index: step_offset,
        });
    }
    info!(
        "resuming after step {step_offset} from {}",
        resume_input.display()
    );
    Ok(ResumePlan {
        original_input: spec.input.clone(),
        spec: Spec {
            input: resume_input,
            output: spec.output.clone(),
            steps: spec.steps[step_offset..].to_vec(),
        },
        verified,
        step_offset,
        skip_execution: false,
        prior: Some(prior),
    })
}

/// Splice the verified prefix in front of a freshly executed run.
/// Fresh indices are shifted by `step_offset`; duration counts from `resume_started`.
pub fn merge_resume_result(
    plan: &ResumePlan,
    fresh: &PipelineResult,
    resume_started: DateTime<Utc>,
) -> PipelineResult {
    if plan.skip_execution
        && let Some(prior) = &plan.prior
    {
        return prior.clone();
    }

    let mut steps = plan.verified.clone();
    steps.extend(fresh.steps.iter().cloned().map(|mut s| {
        s.index += plan.step_offset;
        s
    }));
    let final_output = fresh
        .final_output
        .clone()
        .or_else(|| steps.last().map(|s| s.output.clone()));
    PipelineResult {
        input: plan.original_input.clone(),
        final_output,
        started_at: resume_started,
        ended_at: fresh.ended_at,
        duration: (fresh.ended_at - resume_started)
            .to_std()
            .unwrap_or_default(),
        steps,
    }
}

/// Plan, execute the unverified suffix, and merge. On failure the partial result is
/// merged too, so it can be persisted and resumed again.
pub fn execute_with_resume(
    executor: &PipelineExecutor<'_>,
    spec: &Spec,
    config: &PipelineConfig,
    prior_report: Option<&Path>,
) -> Result<PipelineResult, PipelineFailure> {
    let resume_started = Utc::now();
    let plan = match build_resume_plan(spec, prior_report) {
        Ok(plan) => plan,
        Err(e) => {
            return Err(PipelineFailure::new(
                e,
                PipelineResult::started(&spec.input, resume_started),
            ));
        }
    };
    if plan.skip_execution {
        let nothing_run = PipelineResult::started(&spec.input, resume_started);
        return Ok(merge_resume_result(&plan, &nothing_run, resume_started));
    }

    let mut config = config.clone();
    if plan.step_offset > 0 && config.origin.is_none() {
        config.origin = Some(plan.original_input.clone());
    }
    match executor.execute(&plan.spec, &config) {
        Ok(fresh) => Ok(merge_resume_result(&plan, &fresh, resume_started)),
        Err(failure) => {
            let mut partial = merge_resume_result(&plan, &failure.partial, resume_started);
            partial.final_output = None;
            Err(PipelineFailure {
                partial,
                error: failure.error,
            })
        }
    }
}
