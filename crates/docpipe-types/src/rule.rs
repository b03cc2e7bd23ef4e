//! `Rule` and its immutable `RuleVersion` children (spec §3).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::schema::SchemaNode;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleVersionStatus {
    Draft,
    Published,
    Archived,
}

/// Multi-page OCR strategy (spec §4.4).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PageStrategy {
    SinglePage,
    MultiPage,
    SpecifiedPages { expression: String },
}

/// Configuration for one field's bound extraction strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "strategy")]
pub enum ExtractionStrategyConfig {
    Regex {
        pattern: String,
        match_all: bool,
        capture_group: usize,
    },
    Anchor {
        anchor: String,
        anchor_is_regex: bool,
        max_distance: usize,
        end_marker: Option<String>,
    },
    Table {
        table_header: String,
        column_name: String,
        filter: Option<(String, String)>,
    },
    LlmSchema {
        hint: Option<String>,
    },
}

/// A rule's extraction map: field path -> strategy config.
pub type ExtractionMap = BTreeMap<String, ExtractionStrategyConfig>;

/// A single cleaning operation applied in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum CleaningOp {
    RegexReplace { pattern: String, replacement: String },
    Trim,
    DateReformat { target_format: String },
}

/// A single validation predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "predicate")]
pub enum ValidationPredicate {
    Required,
    NotEmpty,
    Pattern { name: Option<String>, custom_regex: Option<String> },
    NumericRange { min: Option<f64>, max: Option<f64> },
    ArrayLength { min: Option<usize>, max: Option<usize> },
    ArrayUnique { key: Option<String> },
    HasFields { fields: Vec<String> },
    ArrayItemsRequired { fields: Vec<String> },
    ScriptExpression { expression: String },
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValidation {
    #[serde(default)]
    pub cleaning: Vec<CleaningOp>,
    #[serde(default)]
    pub predicates: Vec<ValidationPredicate>,
}

pub type ValidationMap = BTreeMap<String, FieldValidation>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum ConsistencyPolicy {
    PreferLlm,
    PreferOcr,
    ManualReview,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancementConfig {
    #[serde(default)]
    pub enabled: bool,
    pub threshold: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsistencyConfig {
    #[serde(default)]
    pub enabled: bool,
    pub threshold: f32,
    pub policy: ConsistencyPolicy,
}

/// An immutable snapshot of a rule's full extraction configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleVersion {
    pub rule_id: String,
    /// `V<major>.<minor>`, see `version_label` module.
    pub version: String,
    pub status: RuleVersionStatus,
    pub schema: SchemaNode,
    pub extraction_map: ExtractionMap,
    pub validation_map: ValidationMap,
    pub page_strategy: PageStrategy,
    pub default_confidence_threshold: Option<f32>,
    pub enhancement: Option<EnhancementConfig>,
    pub consistency: Option<ConsistencyConfig>,
}

/// A rule with a stable id and a pointer to its current published
/// version. Invariant: `current_version` always points to a `published`
/// version (or `None` if never published); exactly one version is
/// `published` at a time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub code: String,
    pub current_version: Option<String>,
}
