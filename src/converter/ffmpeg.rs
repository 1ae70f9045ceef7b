//! ffmpeg-backed converter and loudness normalizer (shells out to the binary).

use log::debug;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::{MetadataMode, Options};

use super::{ConvertError, Converter, LoudnessNormalizer, LoudnessTarget};

const AUDIO_FORMATS: &[&str] = &["aac", "flac", "m4a", "mp3", "ogg", "opus", "wav"];
const VIDEO_FORMATS: &[&str] = &["avi", "mkv", "mov", "mp4", "webm"];
const IMAGE_FORMATS: &[&str] = &["bmp", "gif", "jpg", "png", "tiff", "webp"];

/// Lines of stderr kept in a [`ConvertError::ToolFailed`].
const STDERR_TAIL_LINES: usize = 8;

fn is_audio(f: &str) -> bool {
    AUDIO_FORMATS.contains(&f)
}

fn is_video(f: &str) -> bool {
    VIDEO_FORMATS.contains(&f)
}

fn is_image(f: &str) -> bool {
    IMAGE_FORMATS.contains(&f)
}

/// Map quality 1..=100 onto ffmpeg's inverted `-q` scales.
fn quality_args(to: &str, quality: Option<u8>) -> Vec<String> {
    let Some(q) = quality else {
        return Vec::new();
    };
    let q = q.clamp(1, 100) as u32;
    match to {
        // 2 (best) ..= 31 (worst)
        "jpg" => vec!["-q:v".into(), (31 - (q * 29) / 100).to_string()],
        // 0 (best) ..= 9 (worst)
        "mp3" => vec!["-q:a".into(), (9 - (q * 9) / 100).to_string()],
        // -1 (worst) ..= 10 (best)
        "ogg" => vec!["-q:a".into(), ((q * 11) / 100).saturating_sub(1).to_string()],
        "webp" => vec!["-quality".into(), q.to_string()],
        _ => Vec::new(),
    }
}

fn metadata_args(mode: MetadataMode) -> Vec<String> {
    match mode {
        MetadataMode::Auto => Vec::new(),
        MetadataMode::Strip => vec!["-map_metadata".into(), "-1".into()],
        MetadataMode::Keep => vec!["-map_metadata".into(), "0".into()],
    }
}

fn format_of(path: &Path) -> String {
    crate::engine::tools::detect_format(path)
}

/// Run `binary` with `args`, turning a non-zero exit into [`ConvertError::ToolFailed`].
fn run_tool(binary: &Path, args: &[String], verbose: bool) -> Result<(), ConvertError> {
    let tool = binary.display().to_string();
    if verbose {
        debug!("{} {}", tool, args.join(" "));
    }
    let output = Command::new(binary)
        .args(args)
        .output()
        .map_err(|e| ConvertError::Launch {
            tool: tool.clone(),
            reason: e.to_string(),
        })?;
    let stderr = String::from_utf8_lossy(&output.stderr);
    if verbose && !stderr.trim().is_empty() {
        debug!("{tool}: {}", stderr.trim());
    }
    if output.status.success() {
        return Ok(());
    }
    let lines: Vec<&str> = stderr.lines().collect();
    let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
    Err(ConvertError::ToolFailed {
        tool,
        status: output.status.to_string(),
        stderr: tail,
    })
}

fn base_args(input: &Path) -> Vec<String> {
    vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        input.display().to_string(),
    ]
}

/// Converts audio, video and still images through an external `ffmpeg` binary.
pub struct FfmpegConverter {
    binary: PathBuf,
}

impl FfmpegConverter {
    pub fn new(binary: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
        }
    }
}

impl Converter for FfmpegConverter {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    fn supports(&self, from: &str, to: &str) -> bool {
        if from == to {
            return false;
        }
        (is_audio(from) && is_audio(to))
            || (is_video(from) && (is_video(to) || is_audio(to)))
            || (is_image(from) && is_image(to))
    }

    fn convert(&self, input: &Path, output: &Path, options: &Options) -> Result<(), ConvertError> {
        let to = format_of(output);
        let mut args = base_args(input);
        if is_video(&format_of(input)) && is_audio(&to) {
            args.push("-vn".into());
        }
        args.extend(quality_args(&to, options.quality));
        args.extend(metadata_args(options.metadata_mode));
        args.push(output.display().to_string());
        run_tool(&self.binary, &args, options.verbose)
    }
}

/// Single-pass `loudnorm` filter through `ffmpeg`.
pub struct FfmpegNormalizer {
    binary: PathBuf,
}

impl FfmpegNormalizer {
    pub fn new(binary: &Path) -> Self {
        Self {
            binary: binary.to_path_buf(),
        }
    }
}

impl LoudnessNormalizer for FfmpegNormalizer {
    fn name(&self) -> &str {
        "ffmpeg-loudnorm"
    }

    fn normalize(
        &self,
        input: &Path,
        output: &Path,
        target: &LoudnessTarget,
        options: &Options,
    ) -> Result<(), ConvertError> {
        let mut args = base_args(input);
        args.push("-af".into());
        args.push(format!(
            "loudnorm=I={}:TP={}:LRA={}",
            target.integrated_lufs, target.true_peak, target.range_lu
        ));
        args.extend(metadata_args(options.metadata_mode));
        args.push(output.display().to_string());
        run_tool(&self.binary, &args, options.verbose)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supports_families() {
        let c = FfmpegConverter::new(Path::new("ffmpeg"));
        assert!(c.supports("flac", "mp3"));
        assert!(c.supports("mkv", "mp4"));
        assert!(c.supports("mp4", "mp3"));
        assert!(c.supports("png", "jpg"));
        assert!(!c.supports("mp3", "mp4"));
        assert!(!c.supports("png", "mp3"));
        assert!(!c.supports("png", "png"));
    }

    #[test]
    fn quality_scales_are_inverted() {
        assert_eq!(quality_args("jpg", Some(100)), vec!["-q:v", "2"]);
        assert_eq!(quality_args("mp3", Some(100)), vec!["-q:a", "0"]);
        assert_eq!(quality_args("mp3", Some(1)), vec!["-q:a", "9"]);
        assert!(quality_args("flac", Some(80)).is_empty());
        assert!(quality_args("jpg", None).is_empty());
    }

    #[test]
    fn missing_binary_is_launch_error() {
        let c = FfmpegConverter::new(Path::new("/nonexistent/convx-ffmpeg"));
        let err = c
            .convert(Path::new("a.wav"), Path::new("a.mp3"), &Options::default())
            .unwrap_err();
        assert!(matches!(err, ConvertError::Launch { .. }));
    }
}
