//! Convx: parallel file conversion with retry, multi-step pipelines that resume, and
//! directory watching.
//!
//! The engine decides what runs, in which order, how many at once, and what happens on
//! failure. The conversions themselves are behind the [`converter::Converter`] trait.

pub mod conflict;
pub mod converter;
pub mod engine;
pub mod pipeline;
pub mod report;
pub mod types;
pub mod utils;
pub mod watch;

/// Re-export types for API
pub use types::*;

pub use conflict::{ConflictPolicy, resolve_output_path};
pub use converter::{Converter, ConverterRegistry, LoudnessNormalizer};
pub use engine::WorkerPool;
pub use pipeline::{PipelineConfig, PipelineExecutor, Spec, Step};

/// Result alias used by the public convx API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
