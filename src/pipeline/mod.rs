//! Multi-step pipelines: spec, sequential executor, resume planning.

pub mod executor;
pub mod resume;
pub mod spec;
pub mod types;

pub use executor::{PipelineConfig, PipelineError, PipelineExecutor, PipelineFailure};
pub use resume::{
    ResumeError, ResumePlan, build_resume_plan, execute_with_resume, load_report,
    merge_resume_result, plan_from_prior,
};
pub use spec::{Spec, SpecError, Step, StepKind, StepType};
pub use types::{PipelineResult, StepResult};
