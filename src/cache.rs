//! Result cache.
//!
//! The [`ResultStore`] trait maps `(mode, normalized path, file/dir)` to a
//! previously computed [`AggregatedResult`]. It is the single source of
//! truth for "has this target already been analyzed under this mode".
//!
//! Two implementations are provided:
//!
//! - [`FsResultStore`]: one JSON document per key, laid out as
//!   `<dir>/<mode cache name>/<encoded path>_file.json` (or `_dir.json`).
//!   Writes go to a uniquely named temporary file that is then renamed over
//!   the entry, so readers never observe a partially written document.
//! - [`MemoryResultStore`]: a map behind an `RwLock`, for tests and
//!   embedding.
//!
//! # Failure policy
//!
//! `get` never fails: unreadable, corrupt or mismatched entries are
//! logged and reported as misses. `put` reports errors, but callers treat
//! them as non-fatal.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::path::{Component, Path, PathBuf};
use std::sync::RwLock;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::StoreError;
use crate::mode::{AggregationStrategy, AnalysisMode};
use crate::models::AggregatedResult;

/// Deterministic key of one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub mode: AnalysisMode,
    /// Lexically normalized target path with `/` separators.
    pub target: String,
    pub is_file: bool,
}

impl CacheKey {
    pub fn new(mode: AnalysisMode, target: &Path, is_file: bool) -> Self {
        Self {
            mode,
            target: normalize_path(target),
            is_file,
        }
    }

    /// Filesystem-safe file name stem, e.g. `#repo#src#main.rs_file`.
    pub fn file_stem(&self) -> String {
        let suffix = if self.is_file { "file" } else { "dir" };
        format!("{}_{}", encode_path(&self.target), suffix)
    }

    /// Entry location relative to the cache root.
    pub fn relative_path(&self) -> PathBuf {
        Path::new(self.mode.cache_name()).join(format!("{}.json", self.file_stem()))
    }
}

/// Resolve `.` and `..` lexically and join components with `/`.
///
/// The filesystem is not consulted, so the same spelling of a path always
/// yields the same key whether or not it exists. Literal `%` and bytes that
/// are not valid UTF-8 are written as `%XX`, so distinct paths never share
/// a key.
pub fn normalize_path(path: &Path) -> String {
    let mut prefix = String::new();
    let mut absolute = false;
    let mut parts: Vec<String> = Vec::new();

    for component in path.components() {
        match component {
            Component::Prefix(p) => prefix = component_text(p.as_os_str()),
            Component::RootDir => absolute = true,
            Component::CurDir => {}
            Component::ParentDir => match parts.last() {
                Some(last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push("..".to_string()),
            },
            Component::Normal(s) => parts.push(component_text(s)),
        }
    }

    let joined = parts.join("/");
    match (absolute, joined.is_empty()) {
        (true, _) => format!("{}/{}", prefix, joined),
        (false, true) if prefix.is_empty() => ".".to_string(),
        (false, _) => format!("{}{}", prefix, joined),
    }
}

#[cfg(unix)]
fn component_text(s: &OsStr) -> String {
    use std::os::unix::ffi::OsStrExt;
    escape_bytes(s.as_bytes())
}

#[cfg(not(unix))]
fn component_text(s: &OsStr) -> String {
    // unpaired UTF-16 surrogates are the only lossy case here
    escape_bytes(s.to_string_lossy().as_bytes())
}

/// Copy valid UTF-8 through, writing `%` and invalid bytes as `%XX`.
fn escape_bytes(mut bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len());
    while !bytes.is_empty() {
        let (valid, invalid) = match std::str::from_utf8(bytes) {
            Ok(text) => (text, 0),
            Err(e) => {
                let text = std::str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default();
                let bad = e.error_len().unwrap_or(bytes.len() - e.valid_up_to());
                (text, bad)
            }
        };
        for ch in valid.chars() {
            match ch {
                '%' => out.push_str("%25"),
                c => out.push(c),
            }
        }
        let rest = &bytes[valid.len()..];
        for b in &rest[..invalid] {
            out.push_str(&format!("%{:02X}", b));
        }
        bytes = &rest[invalid..];
    }
    out
}

/// Injective, filesystem-safe encoding of a normalized path.
///
/// `/` becomes `#`; the characters `%`, `#`, `\` and `:` are
/// percent-escaped first so that no two paths share an encoding.
pub fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for ch in path.chars() {
        match ch {
            '%' => out.push_str("%25"),
            '#' => out.push_str("%23"),
            '\\' => out.push_str("%5C"),
            ':' => out.push_str("%3A"),
            '/' => out.push('#'),
            c => out.push(c),
        }
    }
    out
}

/// Persistent map from [`CacheKey`] to [`AggregatedResult`].
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Previously stored result for `key`, or `None`. Read failures are
    /// misses.
    async fn get(&self, key: &CacheKey) -> Option<AggregatedResult>;

    /// Store `result` under `key`, replacing any previous entry. Creates
    /// whatever structure the backend needs.
    async fn put(&self, key: &CacheKey, result: &AggregatedResult) -> Result<(), StoreError>;

    /// Remove every entry for every mode.
    async fn flush(&self) -> Result<(), StoreError>;
}

/// A stored result is only usable if its shape matches the mode.
fn shape_matches(mode: AnalysisMode, result: &AggregatedResult) -> bool {
    matches!(
        (mode.strategy(), result),
        (AggregationStrategy::DescriptionConcat, AggregatedResult::Description(_))
            | (AggregationStrategy::ScoreMean, AggregatedResult::Evaluation(_))
    )
}

// ============ Filesystem store ============

pub struct FsResultStore {
    root: PathBuf,
}

impl FsResultStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_path())
    }
}

#[async_trait]
impl ResultStore for FsResultStore {
    async fn get(&self, key: &CacheKey) -> Option<AggregatedResult> {
        let path = self.entry_path(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "cache miss");
                return None;
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable cache entry, treating as miss");
                return None;
            }
        };

        match serde_json::from_slice::<AggregatedResult>(&bytes) {
            Ok(result) if shape_matches(key.mode, &result) => {
                info!(path = %path.display(), "cache hit");
                Some(result)
            }
            Ok(_) => {
                warn!(path = %path.display(), "cache entry has the wrong shape for its mode, treating as miss");
                None
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "corrupt cache entry, treating as miss");
                None
            }
        }
    }

    async fn put(&self, key: &CacheKey, result: &AggregatedResult) -> Result<(), StoreError> {
        let path = self.entry_path(key);
        let dir = path.parent().unwrap_or(&self.root).to_path_buf();
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|source| StoreError::Io {
                path: dir.clone(),
                source,
            })?;

        let json = serde_json::to_vec(result)?;
        let tmp = dir.join(format!(".{}.{}.tmp", key.file_stem(), Uuid::new_v4()));
        tokio::fs::write(&tmp, &json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io { path, source });
        }

        info!(path = %path.display(), "cached result");
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        for mode in AnalysisMode::ALL {
            let dir = self.root.join(mode.cache_name());
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => info!(dir = %dir.display(), "flushed cache"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(StoreError::Io { path: dir, source }),
            }
        }
        Ok(())
    }
}

// ============ In-memory store ============

#[derive(Default)]
pub struct MemoryResultStore {
    entries: RwLock<HashMap<CacheKey, AggregatedResult>>,
}

impl MemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ResultStore for MemoryResultStore {
    async fn get(&self, key: &CacheKey) -> Option<AggregatedResult> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        entries
            .get(key)
            .filter(|r| shape_matches(key.mode, r))
            .cloned()
    }

    async fn put(&self, key: &CacheKey, result: &AggregatedResult) -> Result<(), StoreError> {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(key.clone(), result.clone());
        Ok(())
    }

    async fn flush(&self) -> Result<(), StoreError> {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        Ok(())
    }
}
