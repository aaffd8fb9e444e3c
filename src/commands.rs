//! Implementations of the `ceval` subcommands.

use anyhow::{Context, Result};

use crate::cache::{FsResultStore, ResultStore};
use crate::config::Config;
use crate::language::Language;
use crate::mode::AnalysisMode;
use crate::orchestrator::{Orchestrator, Scope};
use crate::repo;
use crate::server::AnalysisResponse;

/// Analyze `target` and print the response JSON to stdout.
pub async fn run_analyze(
    config: &Config,
    scope: Scope,
    mode: AnalysisMode,
    target: &str,
    force_recompute: bool,
) -> Result<()> {
    let orchestrator = Orchestrator::from_config(config)?;
    let analysis = orchestrator
        .run(scope, target, mode, force_recompute)
        .await
        .with_context(|| format!("{} analysis of {} failed", mode, target))?;

    let response = AnalysisResponse::new(target.to_string(), mode, analysis);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

pub fn run_clone(config: &Config, url: &str) -> Result<()> {
    let path = repo::ensure_cloned(url, &config.repos)?;
    println!("{}", path.display());
    Ok(())
}

pub async fn run_flush(config: &Config, repos: bool) -> Result<()> {
    FsResultStore::new(&config.cache.dir)
        .flush()
        .await
        .with_context(|| format!("Failed to flush cache at {}", config.cache.dir.display()))?;
    println!("Cache flushed: {}", config.cache.dir.display());

    if repos {
        repo::flush_clones(&config.repos)?;
        println!("Clones removed: {}", config.repos.clone_dir.display());
    }
    Ok(())
}

pub fn list_languages() {
    println!("{:<10} {:<12} SYNTAX-AWARE", "EXTENSION", "LANGUAGE");
    for (ext, lang) in Language::table() {
        println!(
            "{:<10} {:<12} {}",
            format!(".{}", ext),
            lang.as_str(),
            lang.is_syntax_aware()
        );
    }
}
