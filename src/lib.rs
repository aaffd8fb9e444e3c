//! # code-eval
//!
//! Chunked, cached analysis of source code by an LLM reasoning service.
//!
//! A file is split into chunks, each chunk is analyzed independently, and
//! the per-chunk records are folded into one result per file. Directory
//! and repository results are folded from their files' results. Every
//! result is cached per `(mode, path, file/dir)` so repeated requests cost
//! nothing.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌──────────────┐   ┌─────────────┐
//! │ CLI/HTTP │──▶│ Orchestrator │──▶│ ResultStore │
//! └──────────┘   └──────┬───────┘   └─────────────┘
//!                       │ miss
//!          ┌────────────┼─────────────┐
//!          ▼            ▼             ▼
//!     ┌─────────┐ ┌──────────────┐ ┌────────────┐
//!     │ Chunker │ │ ChunkAnalyzer│ │ Aggregator │
//!     └─────────┘ └──────┬───────┘ └────────────┘
//!                        ▼
//!               ┌──────────────────┐
//!               │ ReasoningService │
//!               └──────────────────┘
//! ```
//!
//! ## Modes
//!
//! | Mode | Result | Cache directory |
//! |------|--------|-----------------|
//! | description | `descriptions: [...]` | `code_descriptor` |
//! | quality | per-category mean scores | `code_quality` |
//! | security | per-category mean scores | `code_security` |
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`error`] | Typed pipeline errors |
//! | [`models`] | Chunk, record and result types |
//! | [`mode`] | Analysis modes, schemas and record validation |
//! | [`language`] | Extension → language table |
//! | [`chunk`] | Syntax-aware chunking |
//! | [`reasoning`] | Reasoning service abstraction |
//! | [`analyzer`] | Per-chunk analysis with retries and pacing |
//! | [`aggregate`] | Folding records into results |
//! | [`cache`] | Result cache |
//! | [`walk`] | Directory enumeration |
//! | [`repo`] | Repository cloning |
//! | [`orchestrator`] | Cache-or-compute coordination |
//! | [`server`] | HTTP server |
//! | [`commands`] | CLI subcommand implementations |

pub mod aggregate;
pub mod analyzer;
pub mod cache;
pub mod chunk;
pub mod commands;
pub mod config;
pub mod error;
pub mod language;
pub mod mode;
pub mod models;
pub mod orchestrator;
pub mod prompts;
pub mod reasoning;
pub mod repo;
pub mod server;
pub mod walk;
