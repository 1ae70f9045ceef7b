//! Conversion capabilities: the opaque units that turn one file into another.
//!
//! The orchestration engine never knows how a format pair is converted; it only asks the
//! [`ConverterRegistry`] for the first [`Converter`] that supports `(from, to)`.

pub mod error;
pub mod ffmpeg;
pub mod registry;

pub use error::ConvertError;
pub use ffmpeg::{FfmpegConverter, FfmpegNormalizer};
pub use registry::ConverterRegistry;

use std::path::Path;

use crate::Options;

/// Performs one format transformation.
pub trait Converter: Send + Sync {
    /// Returns the name of this converter implementation.
    fn name(&self) -> &str;

    /// True if this converter can turn `from` into `to` (normalized lowercase format tags).
    fn supports(&self, from: &str, to: &str) -> bool;

    /// Convert `input` into `output`. The output directory already exists.
    fn convert(&self, input: &Path, output: &Path, options: &Options) -> Result<(), ConvertError>;
}

/// Loudness targets for an audio-normalize step (EBU R128 style).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoudnessTarget {
    /// Integrated loudness in LUFS.
    pub integrated_lufs: f64,
    /// Maximum true peak in dBTP.
    pub true_peak: f64,
    /// Loudness range in LU.
    pub range_lu: f64,
}

impl LoudnessTarget {
    pub const DEFAULT_LUFS: f64 = -16.0;
    pub const DEFAULT_TRUE_PEAK: f64 = -1.5;
    pub const DEFAULT_RANGE: f64 = 11.0;

    /// Defaults overlaid with whichever targets are set.
    pub fn from_overrides(lufs: Option<f64>, tp: Option<f64>, lra: Option<f64>) -> Self {
        let d = Self::default();
        Self {
            integrated_lufs: lufs.unwrap_or(d.integrated_lufs),
            true_peak: tp.unwrap_or(d.true_peak),
            range_lu: lra.unwrap_or(d.range_lu),
        }
    }
}

impl Default for LoudnessTarget {
    fn default() -> Self {
        Self {
            integrated_lufs: Self::DEFAULT_LUFS,
            true_peak: Self::DEFAULT_TRUE_PEAK,
            range_lu: Self::DEFAULT_RANGE,
        }
    }
}

/// Filter-style audio operation: same format in and out, loudness adjusted.
pub trait LoudnessNormalizer: Send + Sync {
    fn name(&self) -> &str;

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        target: &LoudnessTarget,
        options: &Options,
    ) -> Result<(), ConvertError>;
}
