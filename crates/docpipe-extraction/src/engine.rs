//! Runs a rule's `ExtractionMap` against OCR output, dispatching each
//! field path to its bound strategy and synthesizing per-field
//! confidence. `LlmSchema` fields are skipped here (they're filled in
//! separately once the LLM call returns) and reported back so the
//! caller knows to invoke the LLM backend for them. `schema` is passed
//! through (rather than just the extraction map) so the anchor strategy
//! can tell whether a field path is array/table-typed, in which case it
//! must find every anchor occurrence instead of only the first
//! (`extraction_service.py`'s `_extract_by_anchor` `is_array_field`
//! branch).

use crate::confidence::calculate_match_confidence;
use crate::{anchor_strategy, regex_strategy, table_strategy};
use docpipe_types::job::{ConfidenceMap, OcrStructured};
use docpipe_types::rule::ExtractionMap;
use docpipe_types::schema::{SchemaNode, SchemaNodeKind};
use docpipe_utils::Result;

/// Outcome of running the non-LLM strategies in an extraction map.
pub struct EngineResult {
    pub fields: serde_json::Value,
    pub confidence: ConfidenceMap,
    /// Field paths bound to `LlmSchema`, left for the caller to resolve.
    pub pending_llm_fields: Vec<String>,
}

/// Confidence the anchor strategy always reports, scalar or array
/// (`extraction_service.py` hardcodes `80.0` for both `_extract_by_anchor`
/// branches rather than scoring against OCR box confidence).
const ANCHOR_CONFIDENCE: f32 = 80.0;

pub fn run(ocr: &OcrStructured, extraction_map: &ExtractionMap, schema: &SchemaNode) -> Result<EngineResult> {
    let mut fields = serde_json::Value::Object(serde_json::Map::new());
    let mut confidence = ConfidenceMap::new();
    let mut pending_llm_fields = Vec::new();

    for (path, strategy) in extraction_map {
        use docpipe_types::rule::ExtractionStrategyConfig as Cfg;
        let is_array_field = matches!(
            schema.resolve(path).map(|n| n.kind),
            Some(SchemaNodeKind::Array) | Some(SchemaNodeKind::Table)
        );
        let extracted = match strategy {
            Cfg::Regex { .. } => regex_strategy::extract(ocr, strategy)?,
            Cfg::Anchor { .. } => anchor_strategy::extract(ocr, strategy, is_array_field)?,
            Cfg::Table { .. } => table_strategy::extract(ocr, strategy)?,
            Cfg::LlmSchema { .. } => {
                pending_llm_fields.push(path.clone());
                continue;
            }
        };

        if extracted.is_empty() {
            docpipe_types::field_path::set(&mut fields, path, extracted.value);
            confidence.insert(path.clone(), 0.0);
            continue;
        }

        let score = if matches!(strategy, Cfg::Anchor { .. }) {
            ANCHOR_CONFIDENCE
        } else {
            match &extracted.value {
                serde_json::Value::Array(items) => {
                    let scores: Vec<f32> = items
                        .iter()
                        .filter_map(|v| v.as_str())
                        .map(|s| calculate_match_confidence(ocr, s, extracted.source_page))
                        .collect();
                    if scores.is_empty() {
                        0.0
                    } else {
                        scores.iter().sum::<f32>() / scores.len() as f32
                    }
                }
                serde_json::Value::String(s) => calculate_match_confidence(ocr, s, extracted.source_page),
                _ => 0.0,
            }
        };

        docpipe_types::field_path::set(&mut fields, path, extracted.value);
        confidence.insert(path.clone(), score);
    }

    Ok(EngineResult {
        fields,
        confidence,
        pending_llm_fields,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_types::job::{OcrPage, OcrTextBox};
    use docpipe_types::rule::ExtractionStrategyConfig;
    use std::collections::BTreeMap;

    fn ocr() -> OcrStructured {
        OcrStructured {
            pages: vec![OcrPage {
                page_number: 1,
                text: "Invoice No: INV-99182".to_string(),
                boxes: vec![OcrTextBox {
                    text: "INV-99182".to_string(),
                    confidence: 0.95,
                    bbox: (0, 0, 10, 10),
                }],
                average_confidence: 0.95,
            }],
        }
    }

    fn flat_schema(fields: &[&str]) -> SchemaNode {
        let mut children = BTreeMap::new();
        for f in fields {
            children.insert((*f).to_string(), SchemaNode::field(*f));
        }
        SchemaNode::object("root", children)
    }

    #[test]
    fn runs_regex_field_and_computes_confidence() {
        let mut map = ExtractionMap::new();
        map.insert(
            "invoice_number".to_string(),
            ExtractionStrategyConfig::Regex {
                pattern: r"Invoice No:\s*(\S+)".to_string(),
                match_all: false,
                capture_group: 1,
            },
        );
        let result = run(&ocr(), &map, &flat_schema(&["invoice_number"])).unwrap();
        assert_eq!(result.fields["invoice_number"], serde_json::json!("INV-99182"));
        assert!(result.confidence["invoice_number"] > 90.0);
        assert!(result.pending_llm_fields.is_empty());
    }

    #[test]
    fn llm_schema_fields_are_deferred() {
        let mut map = ExtractionMap::new();
        map.insert(
            "summary".to_string(),
            ExtractionStrategyConfig::LlmSchema { hint: None },
        );
        let result = run(&ocr(), &map, &flat_schema(&["summary"])).unwrap();
        assert_eq!(result.pending_llm_fields, vec!["summary".to_string()]);
    }

    #[test]
    fn anchor_field_gets_flat_confidence_and_array_field_collects_all_matches() {
        let ocr = OcrStructured {
            pages: vec![OcrPage {
                page_number: 1,
                text: "Item: A1 | Item: B2".to_string(),
                boxes: Vec::new(),
                average_confidence: 0.9,
            }],
        };
        let anchor_cfg = ExtractionStrategyConfig::Anchor {
            anchor: "Item:".to_string(),
            anchor_is_regex: false,
            max_distance: 10,
            end_marker: Some("|".to_string()),
        };

        let mut scalar_map = ExtractionMap::new();
        scalar_map.insert("label".to_string(), anchor_cfg.clone());
        let scalar_result = run(&ocr, &scalar_map, &flat_schema(&["label"])).unwrap();
        assert_eq!(scalar_result.fields["label"], serde_json::json!("A1"));
        assert_eq!(scalar_result.confidence["label"], 80.0);

        let mut array_map = ExtractionMap::new();
        array_map.insert("items".to_string(), anchor_cfg);
        let mut children = BTreeMap::new();
        let schema = SchemaNode::object(
            "root",
            {
                children.insert("items".to_string(), SchemaNode::array("items", SchemaNode::field("items")));
                children
            },
        );
        let array_result = run(&ocr, &array_map, &schema).unwrap();
        assert_eq!(array_result.fields["items"], serde_json::json!(["A1", "B2"]));
        assert_eq!(array_result.confidence["items"], 80.0);
    }
}
