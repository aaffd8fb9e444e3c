//! Top-level coordination: cache lookup, chunking, per-chunk analysis,
//! aggregation and cache write-through.
//!
//! ```text
//! request ─► Orchestrator ─► cache hit ─────────────────────────► result
//!                        └─► miss ─► Chunker ─► ChunkAnalyzer ×N ─┐
//!                                                                ▼
//!                              result ◄─ cache write ◄─ Aggregator
//! ```
//!
//! A directory (or cloned repository) is resolved file by file through the
//! same cache-or-compute path, then the per-file results are aggregated.
//! A failing file is recorded in the directory result's `failures` and
//! left out of the aggregation; it never aborts its siblings.
//!
//! Only complete, non-empty results are cached. A directory result with
//! failures is returned but not stored, so the next request retries only
//! the files that failed.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use futures::future::try_join_all;
use futures::stream::{self, StreamExt};
use tracing::{info, warn};

use crate::aggregate::{aggregate, empty_result};
use crate::analyzer::{AnalyzerPolicy, ChunkAnalyzer};
use crate::cache::{CacheKey, FsResultStore, ResultStore};
use crate::chunk::Chunker;
use crate::config::{Config, ReposConfig};
use crate::error::AnalysisError;
use crate::mode::AnalysisMode;
use crate::models::{AggregatedResult, Analysis, ChildFailure};
use crate::reasoning::create_service;
use crate::repo;
use crate::walk::FileWalker;

/// What kind of target a request names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    File,
    Folder,
    /// A local clone or a remote URL to clone first.
    Repo,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::File => "file",
            Scope::Folder => "folder",
            Scope::Repo => "repo",
        }
    }
}

impl FromStr for Scope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "file" => Ok(Scope::File),
            "folder" | "dir" | "directory" => Ok(Scope::Folder),
            "repo" | "repository" => Ok(Scope::Repo),
            other => Err(format!("unknown scope '{}'", other)),
        }
    }
}

pub struct Orchestrator {
    store: Arc<dyn ResultStore>,
    chunker: Chunker,
    analyzer: ChunkAnalyzer,
    walker: FileWalker,
    repos: ReposConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        chunker: Chunker,
        analyzer: ChunkAnalyzer,
        walker: FileWalker,
        repos: ReposConfig,
    ) -> Self {
        Self {
            store,
            chunker,
            analyzer,
            walker,
            repos,
        }
    }

    /// Wire up the on-disk cache and the configured reasoning service.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let service = create_service(&config.analyzer)?;
        Ok(Self::new(
            Arc::new(FsResultStore::new(&config.cache.dir)),
            Chunker::new(&config.chunking),
            ChunkAnalyzer::new(service, AnalyzerPolicy::from_config(&config.analyzer)),
            FileWalker::new(&config.walk)?,
            config.repos.clone(),
        ))
    }

    pub fn store(&self) -> &Arc<dyn ResultStore> {
        &self.store
    }

    /// Analyze `target` as `scope`. Repository targets that look like
    /// remote URLs are cloned first.
    pub async fn run(
        &self,
        scope: Scope,
        target: &str,
        mode: AnalysisMode,
        force_recompute: bool,
    ) -> Result<Analysis, AnalysisError> {
        match scope {
            Scope::File => {
                self.analyze_file(Path::new(target), mode, force_recompute)
                    .await
            }
            Scope::Folder => {
                self.analyze_directory(Path::new(target), mode, force_recompute)
                    .await
            }
            Scope::Repo => {
                let root = self.resolve_repo(target).await?;
                self.analyze_directory(&root, mode, force_recompute).await
            }
        }
    }

    /// Clone `url` if needed and return the local checkout.
    pub async fn clone_repo(&self, url: &str) -> Result<PathBuf, AnalysisError> {
        let url = url.to_string();
        let repos = self.repos.clone();
        tokio::task::spawn_blocking(move || repo::ensure_cloned(&url, &repos))
            .await
            .map_err(|e| AnalysisError::Repository(e.to_string()))?
            .map_err(|e| AnalysisError::Repository(format!("{:#}", e)))
    }

    async fn resolve_repo(&self, target: &str) -> Result<PathBuf, AnalysisError> {
        if repo::is_remote(target) {
            self.clone_repo(target).await
        } else {
            Ok(PathBuf::from(target))
        }
    }

    /// Analyze a file or directory, whichever `target` is.
    pub async fn analyze(
        &self,
        target: &Path,
        mode: AnalysisMode,
        force_recompute: bool,
    ) -> Result<Analysis, AnalysisError> {
        let metadata = tokio::fs::metadata(target)
            .await
            .map_err(|e| AnalysisError::io(target, e))?;
        if metadata.is_dir() {
            self.analyze_directory(target, mode, force_recompute).await
        } else {
            self.analyze_file(target, mode, force_recompute).await
        }
    }

    pub async fn analyze_file(
        &self,
        path: &Path,
        mode: AnalysisMode,
        force_recompute: bool,
    ) -> Result<Analysis, AnalysisError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AnalysisError::io(path, e))?;
        if metadata.is_dir() {
            return Err(AnalysisError::InvalidTarget(format!(
                "{} is a directory, not a file",
                path.display()
            )));
        }

        let key = CacheKey::new(mode, path, true);
        if !force_recompute {
            if let Some(result) = self.store.get(&key).await {
                return Ok(Analysis {
                    result,
                    cached: true,
                });
            }
        }

        let result = self.compute_file(path, mode).await?;
        self.write_through(&key, &result).await;
        Ok(Analysis {
            result,
            cached: false,
        })
    }

    pub async fn analyze_directory(
        &self,
        path: &Path,
        mode: AnalysisMode,
        force_recompute: bool,
    ) -> Result<Analysis, AnalysisError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| AnalysisError::io(path, e))?;
        if !metadata.is_dir() {
            return Err(AnalysisError::InvalidTarget(format!(
                "{} is not a directory",
                path.display()
            )));
        }

        let key = CacheKey::new(mode, path, false);
        if !force_recompute {
            if let Some(result) = self.store.get(&key).await {
                return Ok(Analysis {
                    result,
                    cached: true,
                });
            }
        }

        let listing = {
            let walker = self.walker.clone();
            let root = path.to_path_buf();
            tokio::task::spawn_blocking(move || walker.files(&root))
                .await
                .map_err(|e| AnalysisError::io(path, std::io::Error::other(e)))??
        };
        let files = listing.files;
        info!(dir = %path.display(), files = files.len(), mode = %mode, "analyzing directory");

        // at most `max_concurrency` files in flight, results in walk order
        let pending: Vec<_> = files
            .iter()
            .map(|file| self.analyze_file(file, mode, force_recompute))
            .collect();
        let outcomes: Vec<_> = stream::iter(pending)
        .buffered(self.analyzer.max_concurrency())
        .collect()
        .await;

        let mut children = Vec::with_capacity(outcomes.len());
        let mut failures = listing.failures;
        for (file, outcome) in files.iter().zip(outcomes) {
            match outcome {
                Ok(analysis) => children.push(analysis.result),
                Err(e) => {
                    warn!(file = %file.display(), error = %e, "file analysis failed");
                    failures.push(ChildFailure {
                        path: file.display().to_string(),
                        error: e.to_string(),
                    });
                }
            }
        }
        failures.sort_by(|a, b| a.path.cmp(&b.path));

        let mut result = aggregate(mode, &children);
        result.set_failures(failures);
        if result.is_complete() {
            self.write_through(&key, &result).await;
        } else {
            warn!(
                dir = %path.display(),
                failed = result.failures().len(),
                "directory result is incomplete, not caching"
            );
        }

        Ok(Analysis {
            result,
            cached: false,
        })
    }

    async fn compute_file(
        &self,
        path: &Path,
        mode: AnalysisMode,
    ) -> Result<AggregatedResult, AnalysisError> {
        let chunks = {
            let chunker = self.chunker;
            let owned = path.to_path_buf();
            tokio::task::spawn_blocking(move || chunker.split(&owned, None))
                .await
                .map_err(|e| AnalysisError::io(path, std::io::Error::other(e)))??
        };

        if chunks.is_empty() {
            return Ok(empty_result(mode));
        }

        info!(file = %path.display(), chunks = chunks.len(), mode = %mode, "analyzing file");
        let records = try_join_all(
            chunks
                .iter()
                .map(|chunk| self.analyzer.analyze(&chunk.source_text, mode)),
        )
        .await?;

        Ok(aggregate(mode, &records))
    }

    /// Best-effort cache write. Empty results are never stored.
    async fn write_through(&self, key: &CacheKey, result: &AggregatedResult) {
        if result.is_empty() {
            return;
        }
        if let Err(e) = self.store.put(key, result).await {
            warn!(entry = %key.target, error = %e, "failed to write cache entry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryResultStore;
    use crate::config::{ChunkingConfig, WalkConfig};
    use crate::error::ServiceError;
    use crate::mode::tests::evaluative_reply;
    use crate::reasoning::ReasoningService;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Describes each chunk by its first line; fails on chunks containing
    /// `FAIL`.
    struct FirstLine {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ReasoningService for FirstLine {
        fn name(&self) -> &str {
            "first-line"
        }

        async fn complete(
            &self,
            _instruction: &str,
            content: &str,
            mode: AnalysisMode,
        ) -> Result<Value, ServiceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if content.contains("FAIL") {
                return Err(ServiceError::Http {
                    status: 400,
                    body: "rejected".into(),
                });
            }
            if mode.is_evaluative() {
                return Ok(evaluative_reply(mode, 6));
            }
            let first = content.lines().next().unwrap_or_default();
            Ok(json!({ "description": first }))
        }
    }

    fn orchestrator_with(
        store: Arc<dyn ResultStore>,
        walk: WalkConfig,
    ) -> (Orchestrator, Arc<FirstLine>) {
        let service = Arc::new(FirstLine {
            calls: AtomicUsize::new(0),
        });
        let orchestrator = Orchestrator::new(
            store,
            Chunker::new(&ChunkingConfig::default()),
            ChunkAnalyzer::new(service.clone(), AnalyzerPolicy::immediate(2)),
            FileWalker::new(&walk).unwrap(),
            ReposConfig::default(),
        );
        (orchestrator, service)
    }

    fn orchestrator() -> (Orchestrator, Arc<FirstLine>, Arc<MemoryResultStore>) {
        let store = Arc::new(MemoryResultStore::new());
        let (orchestrator, service) = orchestrator_with(store.clone(), WalkConfig::default());
        (orchestrator, service, store)
    }

    #[tokio::test]
    async fn test_cache_write_failure_still_returns_result() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "a file where the cache dir should be").unwrap();
        let file = dir.path().join("main.rs");
        std::fs::write(&file, "// entry point\nfn main() {}\n").unwrap();
        let (orch, service) = orchestrator_with(
            Arc::new(crate::cache::FsResultStore::new(&blocker)),
            WalkConfig::default(),
        );

        let first = orch
            .analyze_file(&file, AnalysisMode::Descriptive, false)
            .await
            .unwrap();
        assert!(!first.cached);
        assert!(!first.result.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 1);

        let second = orch
            .analyze_file(&file, AnalysisMode::Descriptive, false)
            .await
            .unwrap();
        assert!(!second.cached);
        assert_eq!(second.result, first.result);
        assert_eq!(service.calls.load(Ordering::SeqCst), 2);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_entry_is_a_child_failure() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "print('a')\n").unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone.py"), dir.path().join("link.py"))
            .unwrap();
        let store = Arc::new(MemoryResultStore::new());
        let (orch, _) = orchestrator_with(
            store.clone(),
            WalkConfig {
                exclude_globs: vec![],
                follow_symlinks: true,
            },
        );

        let analysis = orch
            .analyze_directory(dir.path(), AnalysisMode::Descriptive, false)
            .await
            .unwrap();
        let AggregatedResult::Description(report) = &analysis.result else {
            panic!("expected descriptive result");
        };
        assert_eq!(report.descriptions, vec!["print('a')"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("link.py"));

        let dir_key = CacheKey::new(AnalysisMode::Descriptive, dir.path(), false);
        assert_eq!(store.get(&dir_key).await, None);
    }

    #[tokio::test]
    async fn test_file_miss_then_hit() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("csv.py");
        std::fs::write(&file, "# parses CSV input\nimport csv\n").unwrap();
        let (orch, service, _) = orchestrator();

        let first = orch
            .analyze_file(&file, AnalysisMode::Descriptive, false)
            .await
            .unwrap();
        assert!(!first.cached);
        let calls = service.calls.load(Ordering::SeqCst);
        assert!(calls >= 1);

        let second = orch
            .analyze_file(&file, AnalysisMode::Descriptive, false)
            .await
            .unwrap();
        assert!(second.cached);
        assert_eq!(second.result, first.result);
        assert_eq!(service.calls.load(Ordering::SeqCst), calls);
    }

    #[tokio::test]
    async fn test_unsupported_file_is_empty_and_uncached() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("notes.bin");
        std::fs::write(&file, "\u{0}\u{1}").unwrap();
        let (orch, service, store) = orchestrator();

        let analysis = orch
            .analyze_file(&file, AnalysisMode::Quality, false)
            .await
            .unwrap();
        assert!(analysis.result.is_empty());
        assert_eq!(service.calls.load(Ordering::SeqCst), 0);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_failed_child_is_recorded_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "print('a')\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "FAIL = True\n").unwrap();
        std::fs::write(dir.path().join("c.py"), "print('c')\n").unwrap();
        let (orch, _, store) = orchestrator();

        let analysis = orch
            .analyze_directory(dir.path(), AnalysisMode::Descriptive, false)
            .await
            .unwrap();
        let AggregatedResult::Description(report) = &analysis.result else {
            panic!("expected descriptive result");
        };
        assert_eq!(report.descriptions, vec!["print('a')", "print('c')"]);
        assert_eq!(report.failures.len(), 1);
        assert!(report.failures[0].path.ends_with("b.py"));

        // a.py and c.py cached individually, the directory itself not
        assert_eq!(store.len(), 2);
        let dir_key = CacheKey::new(AnalysisMode::Descriptive, dir.path(), false);
        assert_eq!(store.get(&dir_key).await, None);
    }

    #[tokio::test]
    async fn test_scope_mismatch_and_missing_target() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, _, _) = orchestrator();

        let err = orch
            .analyze_file(dir.path(), AnalysisMode::Descriptive, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidTarget(_)));

        let missing = dir.path().join("missing.rs");
        let err = orch
            .analyze(&missing, AnalysisMode::Descriptive, false)
            .await
            .unwrap_err();
        assert!(matches!(err, AnalysisError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_evaluative_directory_scores() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.rs"), "fn a() {}\n").unwrap();
        std::fs::write(dir.path().join("b.rs"), "fn b() {}\n").unwrap();
        let (orch, _, _) = orchestrator();

        let analysis = orch
            .run(
                Scope::Folder,
                &dir.path().to_string_lossy(),
                AnalysisMode::Security,
                false,
            )
            .await
            .unwrap();
        let AggregatedResult::Evaluation(report) = &analysis.result else {
            panic!("expected evaluative result");
        };
        assert_eq!(report.scores["cryptography"], 6.0);
        assert!(analysis.result.is_complete());
    }

    #[test]
    fn test_scope_parse() {
        assert_eq!("file".parse::<Scope>().unwrap(), Scope::File);
        assert_eq!("folder".parse::<Scope>().unwrap(), Scope::Folder);
        assert_eq!("repo".parse::<Scope>().unwrap(), Scope::Repo);
        assert!("galaxy".parse::<Scope>().is_err());
    }
}
