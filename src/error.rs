//! Error types for the analysis pipeline.
//!
//! Pipeline failures are typed so that the orchestrator can decide, per
//! scope, whether a failure is fatal (the requested target is missing),
//! isolated (one file in a directory failed) or swallowed (the cache could
//! not be written). Unsupported file types are not errors at all: the
//! chunker returns an empty sequence for them.

use std::path::PathBuf;

use thiserror::Error;

/// Failure of a single analysis request, reported for the smallest
/// enclosing scope (chunk → file → directory).
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The requested path does not exist.
    #[error("path not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The target exists but cannot be read.
    #[error("failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The target is of the wrong kind for the requested scope
    /// (e.g. a directory passed to a file analysis).
    #[error("invalid target: {0}")]
    InvalidTarget(String),

    /// A repository could not be cloned.
    #[error("repository acquisition failed: {0}")]
    Repository(String),

    /// The collaborator kept returning records that do not match the
    /// mode's schema.
    #[error("chunk record failed validation after {attempts} attempt(s): {reason}")]
    Validation { attempts: u32, reason: String },

    /// The collaborator could not be reached or refused the request.
    #[error("reasoning service failed after {attempts} attempt(s): {source}")]
    Service {
        attempts: u32,
        #[source]
        source: ServiceError,
    },
}

impl AnalysisError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::Io { path, source }
        }
    }

    /// True for failures of the reasoning collaborator (as opposed to
    /// problems with the requested target).
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. } | Self::Service { .. } | Self::Repository(_)
        )
    }
}

/// Failure reported by a [`ReasoningService`](crate::reasoning::ReasoningService).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("reasoning service is disabled")]
    Disabled,

    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed reply: {0}")]
    Malformed(String),
}

impl ServiceError {
    /// Rate limits, server errors, network errors and unparseable replies
    /// are worth another attempt; client errors and a disabled provider
    /// are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Disabled => false,
            Self::Http { status, .. } => *status == 429 || *status >= 500,
            Self::Transport(_) | Self::Malformed(_) => true,
        }
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

/// A collaborator reply that does not conform to the mode's schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct ValidationError(pub String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

/// Failure of the result cache. Never fatal to an analysis request.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cache I/O error at {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
