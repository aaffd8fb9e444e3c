//! Core data models used throughout the analysis pipeline.
//!
//! These types represent the chunks cut from source files, the validated
//! per-chunk records returned by the reasoning service, and the aggregated
//! reports built for files, directories and repositories.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A bounded slice of one file's source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    pub source_text: String,
    /// Position of the chunk within its file, starting at 0.
    pub sequence_index: usize,
    pub origin_file: PathBuf,
    /// 1-based, inclusive.
    pub start_line: usize,
    /// 1-based, inclusive.
    pub end_line: usize,
}

/// Score and optional justification for one evaluation category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryScore {
    /// Always within `1..=10`.
    pub score: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remarks: Option<String>,
}

/// Validated reply for one chunk under an evaluative mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationRecord {
    pub categories: BTreeMap<String, CategoryScore>,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
    pub improvement_suggestions: Vec<String>,
    pub final_remarks: String,
}

/// The validated structured output for one chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChunkRecord {
    Description { description: String },
    Evaluation(EvaluationRecord),
}

/// A child (file) that could not be analyzed while analyzing its directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildFailure {
    pub path: String,
    pub error: String,
}

/// Aggregated descriptive result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DescriptionReport {
    pub descriptions: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ChildFailure>,
}

/// Aggregated evaluative (quality or security) result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    /// Category → mean score, rounded to two decimals.
    pub scores: BTreeMap<String, f64>,
    /// Category → remarks of every contributing record, in input order.
    #[serde(default)]
    pub details: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub strengths: Vec<String>,
    #[serde(default)]
    pub weaknesses: Vec<String>,
    #[serde(default)]
    pub improvement_suggestions: Vec<String>,
    #[serde(default)]
    pub final_remarks: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failures: Vec<ChildFailure>,
}

/// The merged record for a file, directory or repository.
///
/// Serialized without a tag: descriptive results carry `descriptions`,
/// evaluative results carry `scores`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AggregatedResult {
    Description(DescriptionReport),
    Evaluation(EvaluationReport),
}

impl AggregatedResult {
    /// Children that failed and were left out of this result.
    pub fn failures(&self) -> &[ChildFailure] {
        match self {
            Self::Description(r) => &r.failures,
            Self::Evaluation(r) => &r.failures,
        }
    }

    pub fn set_failures(&mut self, failures: Vec<ChildFailure>) {
        match self {
            Self::Description(r) => r.failures = failures,
            Self::Evaluation(r) => r.failures = failures,
        }
    }

    /// A result built from every child, with nothing left out.
    pub fn is_complete(&self) -> bool {
        self.failures().is_empty()
    }

    pub fn is_empty(&self) -> bool {
        match self {
            Self::Description(r) => r.descriptions.is_empty(),
            Self::Evaluation(r) => r.scores.is_empty(),
        }
    }
}

/// An aggregated result plus whether it was served from the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct Analysis {
    pub result: AggregatedResult,
    pub cached: bool,
}
