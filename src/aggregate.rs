//! Folding of per-chunk records and per-child results into one result.
//!
//! The same fold is used at every level: chunks → file and files →
//! directory/repository. Inputs are anything implementing
//! [`Contribution`], which both [`ChunkRecord`] and [`AggregatedResult`] do,
//! so an aggregated result can itself be aggregated again.
//!
//! # Rules
//!
//! - **Descriptive**: output descriptions are the flat, order-preserving
//!   concatenation of every input's descriptions.
//! - **Evaluative**: for each category present in at least one input, the
//!   score is the mean over the inputs that carry it, rounded to two
//!   decimals; remarks and the strengths/weaknesses/suggestions lists are
//!   concatenated in input order, duplicates kept.
//!
//! Aggregation is a pure function of the ordered input. An empty input
//! yields the mode's empty shape.

use std::collections::BTreeMap;

use crate::mode::{AggregationStrategy, AnalysisMode};
use crate::models::{AggregatedResult, ChunkRecord, DescriptionReport, EvaluationReport};

/// One scored category as seen by the aggregator.
pub struct CategoryContribution<'a> {
    pub name: &'a str,
    pub score: f64,
    pub remarks: Vec<&'a str>,
}

/// Something that can be folded into an [`AggregatedResult`].
pub trait Contribution {
    fn descriptions(&self) -> Vec<&str>;
    fn categories(&self) -> Vec<CategoryContribution<'_>>;
    fn strengths(&self) -> &[String];
    fn weaknesses(&self) -> &[String];
    fn improvement_suggestions(&self) -> &[String];
    fn final_remarks(&self) -> Vec<&str>;
}

impl Contribution for ChunkRecord {
    fn descriptions(&self) -> Vec<&str> {
        match self {
            ChunkRecord::Description { description } => vec![description.as_str()],
            ChunkRecord::Evaluation(_) => Vec::new(),
        }
    }

    fn categories(&self) -> Vec<CategoryContribution<'_>> {
        match self {
            ChunkRecord::Description { .. } => Vec::new(),
            ChunkRecord::Evaluation(e) => e
                .categories
                .iter()
                .map(|(name, c)| CategoryContribution {
                    name,
                    score: f64::from(c.score),
                    remarks: c.remarks.as_deref().into_iter().collect(),
                })
                .collect(),
        }
    }

    fn strengths(&self) -> &[String] {
        match self {
            ChunkRecord::Description { .. } => &[],
            ChunkRecord::Evaluation(e) => &e.strengths,
        }
    }

    fn weaknesses(&self) -> &[String] {
        match self {
            ChunkRecord::Description { .. } => &[],
            ChunkRecord::Evaluation(e) => &e.weaknesses,
        }
    }

    fn improvement_suggestions(&self) -> &[String] {
        match self {
            ChunkRecord::Description { .. } => &[],
            ChunkRecord::Evaluation(e) => &e.improvement_suggestions,
        }
    }

    fn final_remarks(&self) -> Vec<&str> {
        match self {
            ChunkRecord::Description { .. } => Vec::new(),
            ChunkRecord::Evaluation(e) => vec![e.final_remarks.as_str()],
        }
    }
}

impl Contribution for AggregatedResult {
    fn descriptions(&self) -> Vec<&str> {
        match self {
            AggregatedResult::Description(r) => r.descriptions.iter().map(String::as_str).collect(),
            AggregatedResult::Evaluation(_) => Vec::new(),
        }
    }

    fn categories(&self) -> Vec<CategoryContribution<'_>> {
        match self {
            AggregatedResult::Description(_) => Vec::new(),
            AggregatedResult::Evaluation(r) => r
                .scores
                .iter()
                .map(|(name, score)| CategoryContribution {
                    name,
                    score: *score,
                    remarks: r
                        .details
                        .get(name)
                        .map(|d| d.iter().map(String::as_str).collect())
                        .unwrap_or_default(),
                })
                .collect(),
        }
    }

    fn strengths(&self) -> &[String] {
        match self {
            AggregatedResult::Description(_) => &[],
            AggregatedResult::Evaluation(r) => &r.strengths,
        }
    }

    fn weaknesses(&self) -> &[String] {
        match self {
            AggregatedResult::Description(_) => &[],
            AggregatedResult::Evaluation(r) => &r.weaknesses,
        }
    }

    fn improvement_suggestions(&self) -> &[String] {
        match self {
            AggregatedResult::Description(_) => &[],
            AggregatedResult::Evaluation(r) => &r.improvement_suggestions,
        }
    }

    fn final_remarks(&self) -> Vec<&str> {
        match self {
            AggregatedResult::Description(_) => Vec::new(),
            AggregatedResult::Evaluation(r) => r.final_remarks.iter().map(String::as_str).collect(),
        }
    }
}

/// The empty result for a mode.
pub fn empty_result(mode: AnalysisMode) -> AggregatedResult {
    match mode.strategy() {
        AggregationStrategy::DescriptionConcat => {
            AggregatedResult::Description(DescriptionReport::default())
        }
        AggregationStrategy::ScoreMean => AggregatedResult::Evaluation(EvaluationReport::default()),
    }
}

/// Fold an ordered sequence of contributions into one result for `mode`.
pub fn aggregate<C: Contribution>(mode: AnalysisMode, inputs: &[C]) -> AggregatedResult {
    match mode.strategy() {
        AggregationStrategy::DescriptionConcat => {
            let descriptions = inputs
                .iter()
                .flat_map(|c| c.descriptions())
                .map(str::to_string)
                .collect();
            AggregatedResult::Description(DescriptionReport {
                descriptions,
                failures: Vec::new(),
            })
        }
        AggregationStrategy::ScoreMean => AggregatedResult::Evaluation(mean_scores(inputs)),
    }
}

fn mean_scores<C: Contribution>(inputs: &[C]) -> EvaluationReport {
    // (sum, count) per category
    let mut totals: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    let mut details: BTreeMap<String, Vec<String>> = BTreeMap::new();
    let mut report = EvaluationReport::default();

    for input in inputs {
        for cat in input.categories() {
            let entry = totals.entry(cat.name.to_string()).or_insert((0.0, 0));
            entry.0 += cat.score;
            entry.1 += 1;
            details
                .entry(cat.name.to_string())
                .or_default()
                .extend(cat.remarks.into_iter().map(str::to_string));
        }
        report.strengths.extend_from_slice(input.strengths());
        report.weaknesses.extend_from_slice(input.weaknesses());
        report
            .improvement_suggestions
            .extend_from_slice(input.improvement_suggestions());
        report
            .final_remarks
            .extend(input.final_remarks().into_iter().map(str::to_string));
    }

    report.scores = totals
        .into_iter()
        .map(|(name, (sum, count))| (name, round2(sum / count as f64)))
        .collect();
    report.details = details;
    report
}

/// Round half away from zero to two decimal places.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
