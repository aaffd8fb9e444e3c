//! Recursive file enumeration for directory and repository targets.

use anyhow::Result;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

use crate::config::WalkConfig;
use crate::error::AnalysisError;
use crate::models::ChildFailure;

const BUILTIN_EXCLUDES: &[&str] = &["**/.git/**", "**/target/**", "**/node_modules/**"];

#[derive(Debug, Clone)]
pub struct FileWalker {
    excludes: GlobSet,
    follow_symlinks: bool,
}

/// Files found under a root, plus entries that could not be read.
#[derive(Debug, Default)]
pub struct Listing {
    pub files: Vec<PathBuf>,
    pub failures: Vec<ChildFailure>,
}

impl FileWalker {
    pub fn new(config: &WalkConfig) -> Result<Self> {
        let mut patterns: Vec<String> = BUILTIN_EXCLUDES.iter().map(|p| p.to_string()).collect();
        patterns.extend(config.exclude_globs.iter().cloned());
        Ok(Self {
            excludes: build_globset(&patterns)?,
            follow_symlinks: config.follow_symlinks,
        })
    }

    /// All regular files under `root`, minus excluded paths, sorted.
    ///
    /// Exclude globs are matched against the path relative to `root`. Only
    /// a failure to read `root` itself is an error; unreadable entries
    /// below it (permission denied, dangling or looping symlinks) are
    /// listed in [`Listing::failures`].
    pub fn files(&self, root: &Path) -> Result<Listing, AnalysisError> {
        let mut listing = Listing::default();

        for entry in WalkDir::new(root).follow_links(self.follow_symlinks) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(walk_error(root, e)),
                Err(e) => {
                    let path = e.path().unwrap_or(root).to_path_buf();
                    let relative = path.strip_prefix(root).unwrap_or(&path);
                    if self.excludes.is_match(relative) {
                        continue;
                    }
                    let err = walk_error(root, e);
                    warn!(path = %path.display(), error = %err, "skipping unreadable entry");
                    listing.failures.push(ChildFailure {
                        path: path.display().to_string(),
                        error: err.to_string(),
                    });
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if self.excludes.is_match(relative) {
                continue;
            }
            listing.files.push(path.to_path_buf());
        }

        listing.files.sort();
        listing.failures.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(listing)
    }
}

fn walk_error(root: &Path, e: walkdir::Error) -> AnalysisError {
    let path = e.path().unwrap_or(root).to_path_buf();
    let source = e
        .into_io_error()
        .unwrap_or_else(|| std::io::Error::other("filesystem loop"));
    AnalysisError::io(path, source)
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
