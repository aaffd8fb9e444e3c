//! Analysis modes.
//!
//! An [`AnalysisMode`] selects three things: the instruction sent to the
//! reasoning service, the schema its reply must satisfy, and the
//! aggregation strategy used to merge records. All three are resolved by
//! matching on the mode.
//!
//! | Mode | Cache dir | `analysis_type` | Strategy |
//! |------|-----------|-----------------|----------|
//! | [`Descriptive`](AnalysisMode::Descriptive) | `code_descriptor` | `description` | concatenate descriptions |
//! | [`Quality`](AnalysisMode::Quality) | `code_quality` | `quality` | mean scores, union remarks |
//! | [`Security`](AnalysisMode::Security) | `code_security` | `security` | mean scores, union remarks |

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde_json::{json, Map, Value};

use crate::error::ValidationError;
use crate::models::{CategoryScore, ChunkRecord, EvaluationRecord};
use crate::prompts;

pub const MIN_SCORE: u8 = 1;
pub const MAX_SCORE: u8 = 10;

const QUALITY_CATEGORIES: &[&str] = &[
    "readability",
    "maintainability",
    "consistency",
    "commenting",
    "correctness",
    "completeness",
    "error_handling",
    "efficiency",
    "scalability",
    "security",
    "test_coverage",
    "innovation",
    "creativity",
    "complexity_score",
    "technical_complexity",
];

const SECURITY_CATEGORIES: &[&str] = &[
    "input_validation",
    "output_encoding",
    "authentication",
    "authorization",
    "cryptography",
    "error_handling",
    "logging",
    "dependency_management",
    "secure_configuration",
    "session_management",
    "data_protection",
    "security_testing",
    "complexity_score",
    "technical_complexity",
];

const SUMMARY_LISTS: &[&str] = &["strengths", "weaknesses", "improvement_suggestions"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnalysisMode {
    Descriptive,
    Quality,
    Security,
}

/// How records of a mode are folded into one result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStrategy {
    /// Flat, order-preserving concatenation of descriptions.
    DescriptionConcat,
    /// Per-category mean of scores plus concatenation of remarks and lists.
    ScoreMean,
}

impl AnalysisMode {
    pub const ALL: [AnalysisMode; 3] = [
        AnalysisMode::Descriptive,
        AnalysisMode::Quality,
        AnalysisMode::Security,
    ];

    /// Directory name used by the on-disk cache.
    pub fn cache_name(self) -> &'static str {
        match self {
            AnalysisMode::Descriptive => "code_descriptor",
            AnalysisMode::Quality => "code_quality",
            AnalysisMode::Security => "code_security",
        }
    }

    /// Name reported as `analysis_type` in responses.
    pub fn analysis_type(self) -> &'static str {
        match self {
            AnalysisMode::Descriptive => "description",
            AnalysisMode::Quality => "quality",
            AnalysisMode::Security => "security",
        }
    }

    pub fn instruction(self) -> &'static str {
        match self {
            AnalysisMode::Descriptive => prompts::DESCRIPTION,
            AnalysisMode::Quality => prompts::QUALITY,
            AnalysisMode::Security => prompts::SECURITY,
        }
    }

    /// Scored categories every record of this mode must contain.
    pub fn categories(self) -> &'static [&'static str] {
        match self {
            AnalysisMode::Descriptive => &[],
            AnalysisMode::Quality => QUALITY_CATEGORIES,
            AnalysisMode::Security => SECURITY_CATEGORIES,
        }
    }

    pub fn strategy(self) -> AggregationStrategy {
        match self {
            AnalysisMode::Descriptive => AggregationStrategy::DescriptionConcat,
            AnalysisMode::Quality | AnalysisMode::Security => AggregationStrategy::ScoreMean,
        }
    }

    pub fn is_evaluative(self) -> bool {
        self.strategy() == AggregationStrategy::ScoreMean
    }

    /// JSON Schema describing the reply expected from the reasoning service.
    pub fn response_schema(self) -> Value {
        match self {
            AnalysisMode::Descriptive => json!({
                "type": "object",
                "properties": {
                    "description": { "type": "string" }
                },
                "required": ["description"],
                "additionalProperties": false
            }),
            AnalysisMode::Quality | AnalysisMode::Security => {
                let category = json!({
                    "type": "object",
                    "properties": {
                        "score": { "type": "integer", "minimum": MIN_SCORE, "maximum": MAX_SCORE },
                        "remarks": { "type": ["string", "null"] }
                    },
                    "required": ["score", "remarks"],
                    "additionalProperties": false
                });
                let string_list = json!({ "type": "array", "items": { "type": "string" } });

                let mut properties = Map::new();
                let mut required = Vec::new();
                for name in self.categories() {
                    properties.insert(name.to_string(), category.clone());
                    required.push(Value::from(*name));
                }
                for name in SUMMARY_LISTS {
                    properties.insert(name.to_string(), string_list.clone());
                    required.push(Value::from(*name));
                }
                properties.insert("final_remarks".to_string(), json!({ "type": "string" }));
                required.push(Value::from("final_remarks"));

                json!({
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false
                })
            }
        }
    }

    /// Validate a reply from the reasoning service and convert it into a
    /// [`ChunkRecord`]. Unknown extra fields are ignored.
    pub fn validate(self, reply: &Value) -> Result<ChunkRecord, ValidationError> {
        let obj = reply
            .as_object()
            .ok_or_else(|| ValidationError::new("reply is not a JSON object"))?;

        if self.strategy() == AggregationStrategy::DescriptionConcat {
            let description = obj
                .get("description")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::new("missing string field 'description'"))?;
            return Ok(ChunkRecord::Description {
                description: description.to_string(),
            });
        }

        let mut categories = BTreeMap::new();
        for name in self.categories() {
            let entry = obj
                .get(*name)
                .ok_or_else(|| ValidationError::new(format!("missing category '{}'", name)))?;
            categories.insert(name.to_string(), parse_category(name, entry)?);
        }

        Ok(ChunkRecord::Evaluation(EvaluationRecord {
            categories,
            strengths: string_list(obj, "strengths")?,
            weaknesses: string_list(obj, "weaknesses")?,
            improvement_suggestions: string_list(obj, "improvement_suggestions")?,
            final_remarks: obj
                .get("final_remarks")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::new("missing string field 'final_remarks'"))?
                .to_string(),
        }))
    }
}

fn parse_category(name: &str, entry: &Value) -> Result<CategoryScore, ValidationError> {
    let raw = entry
        .get("score")
        .ok_or_else(|| ValidationError::new(format!("category '{}' has no score", name)))?;

    let score = match raw.as_f64() {
        Some(s) if s.fract() == 0.0 => s,
        _ => {
            return Err(ValidationError::new(format!(
                "category '{}' score is not an integer: {}",
                name, raw
            )))
        }
    };
    if score < f64::from(MIN_SCORE) || score > f64::from(MAX_SCORE) {
        return Err(ValidationError::new(format!(
            "category '{}' score {} outside [{}, {}]",
            name, score, MIN_SCORE, MAX_SCORE
        )));
    }

    let remarks = match entry.get("remarks") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            return Err(ValidationError::new(format!(
                "category '{}' remarks must be a string, got {}",
                name, other
            )))
        }
    };

    Ok(CategoryScore {
        score: score as u8,
        remarks,
    })
}

fn string_list(obj: &Map<String, Value>, field: &str) -> Result<Vec<String>, ValidationError> {
    let items = obj
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationError::new(format!("missing list field '{}'", field)))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| ValidationError::new(format!("'{}' must contain strings", field)))
        })
        .collect()
}

impl fmt::Display for AnalysisMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.analysis_type())
    }
}

impl FromStr for AnalysisMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "description" | "descriptive" | "code_descriptor" => Ok(AnalysisMode::Descriptive),
            "quality" | "cqual" | "code_quality" => Ok(AnalysisMode::Quality),
            "security" | "sec" | "code_security" => Ok(AnalysisMode::Security),
            other => Err(format!(
                "unknown analysis mode '{}'. Must be description, quality, or security.",
                other
            )),
        }
    }
}
