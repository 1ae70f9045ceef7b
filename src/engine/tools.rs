//! Path and format utilities

use anyhow::{Context, Result};
use std::path::{Component, Path, PathBuf};

/// Lowercase a format tag and fold common aliases (`jpeg` → `jpg`, `tif` → `tiff`).
pub fn normalize_format(format: &str) -> String {
    let f = format.trim().trim_start_matches('.').to_ascii_lowercase();
    match f.as_str() {
        "jpeg" => "jpg".to_string(),
        "tif" => "tiff".to_string(),
        "oga" => "ogg".to_string(),
        _ => f,
    }
}

/// Format tag of a path, taken from its extension. Empty when there is none.
pub fn detect_format(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(normalize_format)
        .unwrap_or_default()
}

/// True if `path` has an extension matching one of `formats` (already normalized).
pub fn has_format(path: &Path, formats: &[String]) -> bool {
    let f = detect_format(path);
    !f.is_empty() && formats.iter().any(|want| *want == f)
}

/// Convert absolute path to relative path from base
pub fn path_relative_to(path: &Path, base: &Path) -> Option<PathBuf> {
    path.strip_prefix(base).ok().map(|p| p.to_path_buf())
}

/// Check if a file should be excluded based on OS-specific hidden files
pub fn is_os_hidden_file(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        match name {
            // macOS
            ".DS_Store" | ".AppleDouble" | ".LSOverride" => true,
            // Windows
            "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "$RECYCLE.BIN" => true,
            // Linux
            ".directory" => true,
            _ => name.starts_with("._") || name.starts_with(".Trash-"),
        }
    } else {
        false
    }
}

/// Lexically clean a path (drop `.`, fold `..`) without touching the filesystem.
pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            // `..` at the root stays at the root; leading `..` of a relative path is kept.
            Component::ParentDir => match out.components().next_back() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => out.push(".."),
            },
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Absolute, lexically cleaned form of `path` (relative paths are joined to the cwd).
pub fn absolute_clean(path: &Path) -> Result<PathBuf> {
    let abs = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .context("read current directory")?
            .join(path)
    };
    Ok(clean_path(&abs))
}

/// `dir/<stem>.<to>`: where a converted file lands when only a directory is given.
pub fn output_in_dir(input: &Path, dir: &Path, to: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    match normalize_format(to) {
        ext if ext.is_empty() => dir.join(stem),
        ext => dir.join(format!("{stem}.{ext}")),
    }
}

/// Output for `input` found under `root`: mirror its relative directory under `out_dir`.
pub fn mirrored_output(input: &Path, root: &Path, out_dir: &Path, to: &str) -> PathBuf {
    let rel_parent = path_relative_to(input, root)
        .and_then(|rel| rel.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    output_in_dir(input, &out_dir.join(rel_parent), to)
}
