//! Output-path conflict resolution: overwrite, skip, or pick the next free `name (n).ext`.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

use crate::engine::tools::{absolute_clean, clean_path};

/// Upper bound on `name (n).ext` probes before giving up.
pub const MAX_VERSIONED_CANDIDATES: u32 = 100_000;

/// What to do when the desired output path already exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    Overwrite,
    Skip,
    #[default]
    Versioned,
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConflictPolicy::Overwrite => "overwrite",
            ConflictPolicy::Skip => "skip",
            ConflictPolicy::Versioned => "versioned",
        })
    }
}

impl FromStr for ConflictPolicy {
    type Err = ConflictError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "overwrite" => Ok(ConflictPolicy::Overwrite),
            "skip" => Ok(ConflictPolicy::Skip),
            "versioned" => Ok(ConflictPolicy::Versioned),
            _ => Err(ConflictError::InvalidPolicy(s.to_string())),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConflictError {
    #[error("invalid conflict policy {0:?} (expected overwrite, skip or versioned)")]
    InvalidPolicy(String),

    #[error("no free versioned name for {path} after {limit} candidates")]
    VersionsExhausted { path: PathBuf, limit: u32 },
}

/// Outcome of [`resolve_output_path`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Resolved {
    pub path: PathBuf,
    /// True when the caller should not write anything (policy `skip`, path exists).
    pub skip: bool,
}

/// Map a desired output path to the path that should actually be written.
///
/// Performs one existence probe per candidate. Two processes racing on the same
/// versioned name can still collide; nothing here locks the filesystem.
pub fn resolve_output_path(path: &Path, policy: ConflictPolicy) -> Result<Resolved, ConflictError> {
    resolve_with(path, policy, |p| p.exists())
}

/// Resolution against an arbitrary notion of "taken".
fn resolve_with(
    path: &Path,
    policy: ConflictPolicy,
    taken: impl Fn(&Path) -> bool,
) -> Result<Resolved, ConflictError> {
    let unchanged = || Resolved {
        path: path.to_path_buf(),
        skip: false,
    };
    match policy {
        ConflictPolicy::Overwrite => Ok(unchanged()),
        ConflictPolicy::Skip => Ok(Resolved {
            path: path.to_path_buf(),
            skip: taken(path),
        }),
        ConflictPolicy::Versioned => {
            if !taken(path) {
                return Ok(unchanged());
            }
            for n in 1..=MAX_VERSIONED_CANDIDATES {
                let candidate = versioned_name(path, n);
                if !taken(&candidate) {
                    return Ok(Resolved {
                        path: candidate,
                        skip: false,
                    });
                }
            }
            Err(ConflictError::VersionsExhausted {
                path: path.to_path_buf(),
                limit: MAX_VERSIONED_CANDIDATES,
            })
        }
    }
}

/// Outputs already handed to jobs of one batch. A reserved path counts as taken even
/// though nothing has been written yet, so two jobs never share an output.
#[derive(Debug, Default)]
pub struct OutputReservations {
    taken: HashSet<PathBuf>,
}

impl OutputReservations {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(path: &Path) -> PathBuf {
        absolute_clean(path).unwrap_or_else(|_| clean_path(path))
    }

    pub fn is_reserved(&self, path: &Path) -> bool {
        self.taken.contains(&Self::key(path))
    }

    /// Resolve like [`resolve_output_path`], also treating reserved paths as taken, and
    /// reserve the result unless it is a skip. Under `overwrite` a path another job of the
    /// batch already holds is versioned instead of shared.
    pub fn resolve(&mut self, path: &Path, policy: ConflictPolicy) -> Result<Resolved, ConflictError> {
        let policy = match policy {
            ConflictPolicy::Overwrite if self.is_reserved(path) => ConflictPolicy::Versioned,
            other => other,
        };
        let resolved = resolve_with(path, policy, |p| self.is_reserved(p) || p.exists())?;
        if !resolved.skip {
            self.taken.insert(Self::key(&resolved.path));
        }
        Ok(resolved)
    }

    pub fn len(&self) -> usize {
        self.taken.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taken.is_empty()
    }
}

/// `dir/name.ext` → `dir/name (n).ext`; extensionless names get `name (n)`.
pub fn versioned_name(path: &Path, n: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{stem} ({n}).{}", ext.to_string_lossy()),
        None => format!("{stem} ({n})"),
    };
    path.with_file_name(name)
}
