//! Command handlers for convert, pipeline and watch

use anyhow::{Context, Result, bail};
use crossbeam_channel::bounded;
use kdam::Animation;
use log::{debug, error, info, warn};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use crate::conflict::{ConflictPolicy, OutputReservations};
use crate::converter::ConverterRegistry;
use crate::engine::arg_parser::{CommonArgs, ConvertArgs, PipelineArgs, PoolArgs, WatchArgs};
use crate::engine::pool::WorkerPool;
use crate::engine::progress::{
    ProgressBarConfig, create_progress_bar, finish_bar, progress_callback,
};
use crate::engine::tools::{absolute_clean, detect_format, normalize_format, output_in_dir};
use crate::pipeline::{PipelineConfig, PipelineExecutor, Spec, execute_with_resume};
use crate::report::{self, BatchReport, ConvertedIndex, ReportFormat};
use crate::utils::config::{PackagePaths, ProgressConsts};
use crate::utils::settings::{Settings, load_settings};
use crate::utils::{Colors, setup_logging};
use crate::watch::{EventWatcher, PollingWatcher, WatchEngine, WatchJobs, WatchOptions, run_watch};
use crate::{Job, JobResult, Options, SkipReason, Summary};

/// Logging plus settings from `.convx.toml` in the working directory.
fn setup_operation(verbose: bool) -> Settings {
    setup_logging(verbose);
    let settings = load_settings(Path::new("."));
    debug!("{} SETTINGS: {:#?}", PackagePaths::get().pkg_name().to_uppercase(), settings);
    settings
}

fn options_for(settings: &Settings, common: &CommonArgs, verbose: bool) -> Options {
    Options {
        quality: common.quality.or(settings.quality),
        verbose,
        metadata_mode: common.metadata_mode.unwrap_or(settings.metadata_mode),
    }
}

fn build_pool<'r>(
    registry: &'r ConverterRegistry,
    settings: &Settings,
    args: &PoolArgs,
) -> WorkerPool<'r> {
    let mut pool = WorkerPool::new(registry).with_workers(args.workers.or(settings.workers));
    pool.set_retry(
        args.retry.unwrap_or(settings.retry_max),
        args.retry_delay_ms.unwrap_or(settings.retry_delay_ms),
    );
    pool
}

fn same_file(a: &Path, b: &Path) -> bool {
    matches!((absolute_clean(a), absolute_clean(b)), (Ok(a), Ok(b)) if a == b)
}

/// Build one job per input: output path, conflict resolution, and batch-resume skips.
/// Two inputs that map to the same output never share it.
pub fn plan_jobs(
    inputs: &[PathBuf],
    to: &str,
    output_dir: Option<&Path>,
    conflict: ConflictPolicy,
    options: &Options,
    converted: Option<&ConvertedIndex>,
) -> Result<Vec<Job>> {
    let mut jobs = Vec::with_capacity(inputs.len());
    let mut reserved = OutputReservations::new();
    for input in inputs {
        let dir = output_dir
            .map(Path::to_path_buf)
            .or_else(|| input.parent().map(Path::to_path_buf))
            .unwrap_or_default();
        let desired = output_in_dir(input, &dir, to);
        let mut job = Job {
            input: input.clone(),
            output: desired.clone(),
            from: detect_format(input),
            to: to.to_string(),
            options: options.clone(),
            skip_reason: None,
        };
        if converted.is_some_and(|idx| idx.contains(input)) {
            job.skip_reason = Some(SkipReason::AlreadyConverted);
            jobs.push(job);
            continue;
        }
        // Same-format conversion into the input's own directory must not clobber the input.
        let policy = if same_file(&desired, input) {
            ConflictPolicy::Versioned
        } else {
            conflict
        };
        let resolved = reserved.resolve(&desired, policy)?;
        job.output = resolved.path;
        if resolved.skip {
            job.skip_reason = Some(SkipReason::OutputExists);
        }
        jobs.push(job);
    }
    Ok(jobs)
}

fn log_result(r: &JobResult) {
    if r.success {
        info!(
            "{} {} -> {}",
            Colors::success("converted"),
            r.input.display(),
            r.output.display()
        );
    } else if r.skipped {
        let reason = r.skip_reason.map(|s| s.to_string()).unwrap_or_default();
        info!("{} {} ({reason})", Colors::skipped("skipped"), r.input.display());
    } else {
        let err = r.error.as_ref().map(|e| e.to_string()).unwrap_or_default();
        error!(
            "{} {} after {} attempt(s): {err}",
            Colors::failed("failed"),
            r.input.display(),
            r.attempts
        );
    }
}

fn log_summary(summary: &Summary) {
    info!(
        "{} files: {} {}, {} {}, {} {} in {:.2?}",
        summary.total,
        summary.succeeded,
        Colors::success("succeeded"),
        summary.skipped,
        Colors::skipped("skipped"),
        summary.failed,
        Colors::failed("failed"),
        summary.duration
    );
}

/// Handle convert command
pub fn handle_convert(args: &ConvertArgs, verbose: bool) -> Result<ExitCode> {
    let started = Instant::now();
    let settings = setup_operation(verbose);
    let to = normalize_format(&args.to);
    if to.is_empty() {
        bail!("target format must not be empty");
    }

    let converted = match &args.resume_from {
        Some(path) => {
            let idx = ConvertedIndex::load(path)?;
            info!("{} inputs already converted per {}", idx.len(), path.display());
            Some(idx)
        }
        None => None,
    };
    let options = options_for(&settings, &args.common, verbose);
    let conflict = args.common.conflict.unwrap_or(settings.conflict);
    let jobs = plan_jobs(
        &args.inputs,
        &to,
        args.common.output_dir.as_deref(),
        conflict,
        &options,
        converted.as_ref(),
    )?;

    let registry = ConverterRegistry::with_ffmpeg(&settings.ffmpeg);
    let mut pool = build_pool(&registry, &settings, &args.pool);
    let bar = (verbose && jobs.len() >= ProgressConsts::MIN_JOBS_FOR_BAR).then(|| {
        create_progress_bar(ProgressBarConfig::new(
            jobs.len(),
            "Converting",
            Animation::Classic,
        ))
    });
    if let Some(bar) = &bar {
        pool = pool.with_progress(progress_callback(bar));
    }

    let results = pool.execute(jobs);
    if let Some(bar) = &bar {
        finish_bar(bar);
    }
    results.iter().for_each(log_result);

    let summary = Summary::from_results(&results, started.elapsed());
    log_summary(&summary);
    let format = args.common.report.unwrap_or(settings.report);
    let batch = BatchReport::new(&results, summary);
    report::emit(
        format,
        &batch,
        BatchReport::to_text,
        args.common.report_file.as_deref(),
    )?;

    Ok(if batch.summary.has_failures() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

/// Handle pipeline command
pub fn handle_pipeline(args: &PipelineArgs, verbose: bool) -> Result<ExitCode> {
    let settings = setup_operation(verbose);
    let spec = Spec::load(&args.spec)?;
    let config = PipelineConfig {
        output_dir: args.common.output_dir.clone(),
        conflict: args.common.conflict.unwrap_or(settings.conflict),
        defaults: options_for(&settings, &args.common, verbose),
        keep_temp: args.keep_temp.unwrap_or(settings.keep_temp),
        temp_root: None,
        origin: None,
    };
    let format = args.common.report.unwrap_or(settings.report);
    let dest = args.common.report_file.as_deref();

    let registry = ConverterRegistry::with_ffmpeg(&settings.ffmpeg);
    let executor = PipelineExecutor::new(&registry);
    match execute_with_resume(&executor, &spec, &config, args.resume_from.as_deref()) {
        Ok(result) => {
            if let Some(out) = &result.final_output {
                info!("{} {}", Colors::success("pipeline complete:"), out.display());
            }
            report::emit(format, &result, report::pipeline_text, dest)?;
            Ok(ExitCode::SUCCESS)
        }
        Err(failure) => {
            error!("{}", failure.error);
            report::emit(format, &failure.partial, report::pipeline_text, dest)?;
            // A resume needs the JSON report; keep one even when none was requested.
            let json_written = format == ReportFormat::Json && dest.is_some();
            if !json_written && !failure.partial.steps.is_empty() {
                let fallback = PathBuf::from(PackagePaths::get().report_filename("json"));
                report::emit(
                    ReportFormat::Json,
                    &failure.partial,
                    report::pipeline_text,
                    Some(&fallback),
                )?;
                warn!("resume with --resume-from {}", fallback.display());
            }
            Ok(ExitCode::FAILURE)
        }
    }
}

/// Handle watch command. Runs until Ctrl+C.
pub fn handle_watch(args: &WatchArgs, verbose: bool) -> Result<ExitCode> {
    let settings = setup_operation(verbose);
    let to = normalize_format(&args.to);
    if to.is_empty() {
        bail!("target format must not be empty");
    }
    let from: Vec<&str> = args.from.iter().map(String::as_str).collect();
    let settle = args
        .settle_ms
        .map(Duration::from_millis)
        .unwrap_or(settings.settle);
    let interval = args
        .interval_ms
        .map(|ms| Duration::from_millis(ms.max(1)))
        .unwrap_or(settings.poll_interval);

    let opts = WatchOptions::new(&args.dir, &from)
        .recursive(args.recursive.unwrap_or(false))
        .settle(settle);
    let mut engine: Box<dyn WatchEngine> = if args.poll_only.unwrap_or(false) {
        Box::new(PollingWatcher::new(opts))
    } else {
        Box::new(EventWatcher::new(opts))
    };

    let output_dir = args
        .common
        .output_dir
        .clone()
        .unwrap_or_else(|| args.dir.clone());
    let mut jobs = WatchJobs::new(&args.dir, &output_dir, &to);
    jobs.conflict = args.common.conflict.unwrap_or(settings.conflict);
    jobs.options = options_for(&settings, &args.common, verbose);

    let registry = ConverterRegistry::with_ffmpeg(&settings.ffmpeg);
    let pool = build_pool(&registry, &settings, &args.pool);

    let (shutdown_tx, shutdown_rx) = bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.try_send(());
    })
    .context("set Ctrl+C handler")?;

    let stats = run_watch(
        engine.as_mut(),
        &pool,
        &jobs,
        interval,
        &shutdown_rx,
        |results| results.iter().for_each(log_result),
    )?;
    info!(
        "{} converted, {} skipped, {} failed over {} batches",
        stats.succeeded, stats.skipped, stats.failed, stats.batches
    );
    Ok(ExitCode::SUCCESS)
}
