//! Repository acquisition (clone-if-absent).
//!
//! Each remote gets a stable local directory under `repos.clone_dir`:
//! `<repo-name>-<first 12 hex chars of sha256(url)>`. A directory that
//! already holds a `.git` is reused as-is; one without `.git` is a leftover
//! from an interrupted clone and is replaced.
//!
//! The `git` binary does the work, so anything `git clone` accepts
//! (https, ssh `git@host:org/repo`, local paths) is accepted here.

use anyhow::{bail, Context, Result};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info};

use crate::config::ReposConfig;

/// Clone `url` unless a valid clone is already present; return its path.
pub fn ensure_cloned(url: &str, config: &ReposConfig) -> Result<PathBuf> {
    let url = url.trim();
    if url.is_empty() {
        bail!("Repository URL is empty");
    }

    let dest = clone_path(url, config);
    if dest.join(".git").exists() {
        debug!(url, path = %dest.display(), "repository already cloned");
        return Ok(dest);
    }

    if dest.exists() {
        info!(path = %dest.display(), "removing incomplete clone");
        std::fs::remove_dir_all(&dest)
            .with_context(|| format!("Failed to remove stale clone: {}", dest.display()))?;
    }

    std::fs::create_dir_all(&config.clone_dir).with_context(|| {
        format!(
            "Failed to create clone directory: {}",
            config.clone_dir.display()
        )
    })?;

    info!(url, path = %dest.display(), "cloning repository");
    if let Err(e) = git_clone(url, config.branch.as_deref(), config.shallow, &dest) {
        let _ = std::fs::remove_dir_all(&dest);
        return Err(e);
    }
    Ok(dest)
}

/// Remove every cloned repository.
pub fn flush_clones(config: &ReposConfig) -> Result<()> {
    match std::fs::remove_dir_all(&config.clone_dir) {
        Ok(()) => {
            info!(dir = %config.clone_dir.display(), "removed cloned repositories");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e).with_context(|| {
            format!(
                "Failed to remove clone directory: {}",
                config.clone_dir.display()
            )
        }),
    }
}

pub fn clone_path(url: &str, config: &ReposConfig) -> PathBuf {
    config
        .clone_dir
        .join(format!("{}-{}", repo_name(url), short_hash(url)))
}

/// Last path segment of a repository URL, without `.git`.
pub fn repo_name(url: &str) -> String {
    let trimmed = url.trim_end_matches('/').trim_end_matches(".git");
    let last = trimmed
        .rsplit(['/', ':', '\\'])
        .next()
        .unwrap_or(trimmed);
    let name: String = last
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() || name.chars().all(|c| c == '.') {
        "repo".to_string()
    } else {
        name
    }
}

/// Whether `target` names a remote to clone rather than a local path.
pub fn is_remote(target: &str) -> bool {
    ["http://", "https://", "ssh://", "git://", "file://", "git@"]
        .iter()
        .any(|prefix| target.starts_with(prefix))
}

fn git_clone(url: &str, branch: Option<&str>, shallow: bool, dest: &Path) -> Result<()> {
    let output = clone_command(url, branch, shallow, dest)
        .output()
        .with_context(|| "Failed to execute 'git clone'. Is git installed?")?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("git clone failed: {}", stderr.trim());
    }

    Ok(())
}

/// `git clone` invocation; `--` keeps a URL starting with `-` from being
/// read as an option.
fn clone_command(url: &str, branch: Option<&str>, shallow: bool, dest: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.arg("clone");
    if shallow {
        cmd.args(["--depth", "1"]);
    }
    if let Some(branch) = branch {
        cmd.args(["--branch", branch, "--single-branch"]);
    }
    cmd.arg("--").arg(url).arg(dest);
    cmd
}

fn short_hash(input: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    format!("{:x}", hasher.finalize())[..12].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> ReposConfig {
        ReposConfig {
            clone_dir: dir.to_path_buf(),
            shallow: true,
            branch: None,
        }
    }

    #[test]
    fn test_repo_name() {
        assert_eq!(repo_name("https://github.com/org/tool.git"), "tool");
        assert_eq!(repo_name("https://github.com/org/tool/"), "tool");
        assert_eq!(repo_name("git@github.com:org/tool.git"), "tool");
        assert_eq!(repo_name("/srv/git/my repo"), "my_repo");
        assert_eq!(repo_name(".git"), "repo");
    }

    #[test]
    fn test_clone_path_is_stable_and_distinct() {
        let cfg = config(Path::new("/clones"));
        let a = clone_path("https://github.com/a/tool", &cfg);
        let b = clone_path("https://github.com/b/tool", &cfg);
        assert_eq!(a, clone_path("https://github.com/a/tool", &cfg));
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("tool-"));
        assert_eq!(name.len(), "tool-".len() + 12);
    }

    #[test]
    fn test_existing_clone_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let url = "https://example.invalid/org/present.git";
        let dest = clone_path(url, &cfg);
        std::fs::create_dir_all(dest.join(".git")).unwrap();
        std::fs::write(dest.join("marker"), "keep").unwrap();

        assert_eq!(ensure_cloned(url, &cfg).unwrap(), dest);
        assert!(dest.join("marker").exists());
    }

    #[test]
    fn test_clone_command_separates_url_from_options() {
        let cmd = clone_command("--upload-pack=touch x", Some("main"), true, Path::new("/c/d"));
        let args: Vec<_> = cmd.get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(
            args,
            [
                "clone",
                "--depth",
                "1",
                "--branch",
                "main",
                "--single-branch",
                "--",
                "--upload-pack=touch x",
                "/c/d",
            ]
        );
    }

    #[test]
    fn test_is_remote() {
        assert!(is_remote("https://github.com/org/tool"));
        assert!(is_remote("git@github.com:org/tool.git"));
        assert!(!is_remote("./src"));
        assert!(!is_remote("/home/me/tool"));
    }

    #[test]
    fn test_flush_clones() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(&dir.path().join("clones"));
        std::fs::create_dir_all(cfg.clone_dir.join("x-123")).unwrap();
        flush_clones(&cfg).unwrap();
        assert!(!cfg.clone_dir.exists());
        flush_clones(&cfg).unwrap();
    }

    #[test]
    fn test_empty_url_rejected() {
        let dir = tempfile::tempdir().unwrap();
        assert!(ensure_cloned("  ", &config(dir.path())).is_err());
    }
}
