//! Error types for conversion capabilities.

use std::path::PathBuf;
use thiserror::Error;

/// Errors produced while looking up or running a converter.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConvertError {
    /// No registered converter handles this format pair.
    #[error("no converter registered for {from} -> {to}")]
    NoConverter { from: String, to: String },

    /// Pipeline asked for loudness normalization but none is registered.
    #[error("no loudness normalizer registered")]
    NoNormalizer,

    /// Output directory does not exist and could not be created.
    #[error("failed to create output directory {path}: {reason}")]
    OutputDir { path: PathBuf, reason: String },

    /// External tool could not be started.
    #[error("failed to launch {tool}: {reason}")]
    Launch { tool: String, reason: String },

    /// External tool ran and exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// Any other conversion failure.
    #[error("{0}")]
    Failed(String),
}

impl ConvertError {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed(reason.into())
    }

    /// Lookup and setup failures are deterministic; retrying them cannot help.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            ConvertError::NoConverter { .. }
                | ConvertError::NoNormalizer
                | ConvertError::OutputDir { .. }
        )
    }
}
