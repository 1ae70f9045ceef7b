use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::MetadataMode;
use crate::conflict::ConflictPolicy;
use crate::report::ReportFormat;

/// Batch, pipeline and watch-mode file conversion.
#[derive(Clone, Parser)]
#[command(name = "convx")]
#[command(about = "Convert files in parallel, run multi-step pipelines, or watch a directory.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output (debug logging and a progress bar).
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,
}

impl Cli {
    pub fn verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    /// Convert each input to one target format in parallel.
    Convert(ConvertArgs),
    /// Run a JSON pipeline spec step by step.
    Pipeline(PipelineArgs),
    /// Watch a directory and convert files once they stop changing.
    Watch(WatchArgs),
}

/// Flags shared by every subcommand. Unset values fall back to `.convx.toml`, then defaults.
#[derive(Clone, Args)]
pub struct CommonArgs {
    /// Output directory. Default: next to each input (watch: the watched directory).
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Existing output handling: overwrite, skip or versioned.
    #[arg(long, short = 'c')]
    pub conflict: Option<ConflictPolicy>,

    /// Quality 1-100 for lossy targets.
    #[arg(long, short = 'q', value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Metadata handling: auto, strip or keep.
    #[arg(long, short = 'm')]
    pub metadata_mode: Option<MetadataMode>,

    /// Report format: off, txt or json.
    #[arg(long, short = 'r')]
    pub report: Option<ReportFormat>,

    /// Write the report here instead of stdout.
    #[arg(long)]
    pub report_file: Option<PathBuf>,
}

/// Worker pool tuning.
#[derive(Clone, Args)]
pub struct PoolArgs {
    /// Parallel workers. Default: one per CPU (capped at twice that).
    #[arg(long, short = 'w')]
    pub workers: Option<usize>,

    /// Extra attempts per failed conversion. Negative values mean no retry.
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub retry: Option<i64>,

    /// Pause between attempts in milliseconds. Negative values are ignored.
    #[arg(long, allow_negative_numbers = true, value_parser = clap::value_parser!(i64))]
    pub retry_delay_ms: Option<i64>,
}

#[derive(Clone, Args)]
pub struct ConvertArgs {
    /// Files to convert.
    #[arg(value_name = "INPUTS", required = true, num_args = 1..)]
    pub inputs: Vec<PathBuf>,

    /// Target format (extension), e.g. mp3 or webp.
    #[arg(long, short = 't')]
    pub to: String,

    /// Batch report (JSON) of an earlier run; inputs it lists as converted are skipped.
    #[arg(long)]
    pub resume_from: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub pool: PoolArgs,
}

#[derive(Clone, Args)]
pub struct PipelineArgs {
    /// Pipeline spec (JSON).
    #[arg(value_name = "SPEC_JSON")]
    pub spec: PathBuf,

    /// Keep the temp directory with intermediate files after a successful run.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub keep_temp: Option<bool>,

    /// Pipeline report (JSON) of an earlier run to resume from.
    #[arg(long)]
    pub resume_from: Option<PathBuf>,

    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Clone, Args)]
pub struct WatchArgs {
    /// Directory to watch.
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Source formats to pick up (comma separated), e.g. flac,wav.
    #[arg(long, short = 'f', required = true, value_delimiter = ',', num_args = 1..)]
    pub from: Vec<String>,

    /// Target format.
    #[arg(long, short = 't')]
    pub to: String,

    /// Include subdirectories.
    #[arg(long, short = 'R', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub recursive: Option<bool>,

    /// Quiet period in milliseconds before a file counts as complete.
    #[arg(long)]
    pub settle_ms: Option<u64>,

    /// Poll interval in milliseconds.
    #[arg(long)]
    pub interval_ms: Option<u64>,

    /// Do not use filesystem events; poll only.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub poll_only: Option<bool>,

    #[command(flatten)]
    pub common: CommonArgs,

    #[command(flatten)]
    pub pool: PoolArgs,
}
