//! Anchor extraction strategy: find a literal or regex anchor and take
//! the text to its right, bounded by `max_distance` characters and
//! optionally cut short at the first occurrence of `end_marker`. The
//! Rust rule shape only models right-of-anchor extraction (the original
//! backend's `direction`/`max_chars` knobs are not carried over).
//!
//! A non-array field stops at the first anchor match, searched page by
//! page. An array/table-typed field (`is_array`, decided by the caller
//! from the rule's schema) instead searches the whole merged document
//! text for every anchor occurrence and returns one element per match,
//! matching `extraction_service.py`'s `_extract_by_anchor` array branch.

use crate::value::ExtractedValue;
use docpipe_types::job::OcrStructured;
use docpipe_types::rule::ExtractionStrategyConfig;
use docpipe_utils::{DocpipeError, Result};
use regex::Regex;

pub fn extract(ocr: &OcrStructured, config: &ExtractionStrategyConfig, is_array: bool) -> Result<ExtractedValue> {
    let ExtractionStrategyConfig::Anchor {
        anchor,
        anchor_is_regex,
        max_distance,
        end_marker,
    } = config
    else {
        return Err(DocpipeError::Extraction(
            "anchor strategy invoked with a non-anchor config".into(),
        ));
    };

    if is_array {
        return extract_all(ocr, anchor, *anchor_is_regex, *max_distance, end_marker.as_deref());
    }

    for page in &ocr.pages {
        let anchor_end = find_anchor_end(&page.text, anchor, *anchor_is_regex)?;
        let Some(anchor_end) = anchor_end else {
            continue;
        };

        let value = bounded_value_after(&page.text, anchor_end, *max_distance, end_marker.as_deref());
        if !value.is_empty() {
            return Ok(ExtractedValue::scalar(value, Some(page.page_number)));
        }
    }

    Ok(ExtractedValue::empty())
}

/// Every anchor occurrence in the merged document text, right-bounded
/// text per match, one array element each. `source_page` is pinned to
/// `1` (the matches span the merged text, not a single page).
fn extract_all(
    ocr: &OcrStructured,
    anchor: &str,
    anchor_is_regex: bool,
    max_distance: usize,
    end_marker: Option<&str>,
) -> Result<ExtractedValue> {
    let merged = ocr.merged_text("\n");
    let ends = find_all_anchor_ends(&merged, anchor, anchor_is_regex)?;
    if ends.is_empty() {
        return Ok(ExtractedValue::empty());
    }

    let values: Vec<serde_json::Value> = ends
        .into_iter()
        .map(|end| bounded_value_after(&merged, end, max_distance, end_marker))
        .filter(|v| !v.is_empty())
        .map(serde_json::Value::String)
        .collect();

    if values.is_empty() {
        Ok(ExtractedValue::empty())
    } else {
        Ok(ExtractedValue::array(values, Some(1)))
    }
}

fn bounded_value_after(text: &str, anchor_end: usize, max_distance: usize, end_marker: Option<&str>) -> String {
    let remainder = &text[anchor_end..];
    let bounded: String = remainder.chars().take(max_distance).collect();
    match end_marker {
        Some(marker) if !marker.is_empty() => bounded
            .split(marker)
            .next()
            .unwrap_or(&bounded)
            .trim()
            .to_string(),
        _ => bounded.trim().to_string(),
    }
}

/// Byte offset just past the anchor's match in `text`, or `None` if the
/// anchor isn't present on this page.
fn find_anchor_end(text: &str, anchor: &str, anchor_is_regex: bool) -> Result<Option<usize>> {
    if anchor_is_regex {
        let re = Regex::new(anchor)
            .map_err(|e| DocpipeError::Extraction(format!("invalid anchor regex {anchor:?}: {e}")))?;
        Ok(re.find(text).map(|m| m.end()))
    } else {
        Ok(text.find(anchor).map(|start| start + anchor.len()))
    }
}

/// Byte offsets just past every non-overlapping anchor occurrence in
/// `text` (searched left to right, advancing one byte past each literal
/// match's start so adjacent occurrences are still found).
fn find_all_anchor_ends(text: &str, anchor: &str, anchor_is_regex: bool) -> Result<Vec<usize>> {
    if anchor_is_regex {
        let re = Regex::new(anchor)
            .map_err(|e| DocpipeError::Extraction(format!("invalid anchor regex {anchor:?}: {e}")))?;
        Ok(re.find_iter(text).map(|m| m.end()).collect())
    } else {
        if anchor.is_empty() {
            return Ok(Vec::new());
        }
        let mut ends = Vec::new();
        let mut start = 0;
        while start < text.len() {
            let Some(pos) = text[start..].find(anchor) else {
                break;
            };
            let abs_pos = start + pos;
            ends.push(abs_pos + anchor.len());
            start = abs_pos + 1;
        }
        Ok(ends)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_types::job::OcrPage;

    fn ocr_from_texts(texts: &[&str]) -> OcrStructured {
        OcrStructured {
            pages: texts
                .iter()
                .enumerate()
                .map(|(i, t)| OcrPage {
                    page_number: i as u32 + 1,
                    text: (*t).to_string(),
                    boxes: Vec::new(),
                    average_confidence: 0.9,
                })
                .collect(),
        }
    }

    fn cfg(
        anchor: &str,
        anchor_is_regex: bool,
        max_distance: usize,
        end_marker: Option<&str>,
    ) -> ExtractionStrategyConfig {
        ExtractionStrategyConfig::Anchor {
            anchor: anchor.to_string(),
            anchor_is_regex,
            max_distance,
            end_marker: end_marker.map(str::to_string),
        }
    }

    #[test]
    fn extracts_text_right_of_literal_anchor() {
        let ocr = ocr_from_texts(&["Customer Name: Acme Corp\nAddress: 123 Main St"]);
        let config = cfg("Customer Name:", false, 30, Some("\n"));
        let result = extract(&ocr, &config, false).unwrap();
        assert_eq!(result.value, serde_json::json!("Acme Corp"));
    }

    #[test]
    fn max_distance_bounds_the_extracted_text() {
        let ocr = ocr_from_texts(&["Total:1234567890"]);
        let config = cfg("Total:", false, 4, None);
        let result = extract(&ocr, &config, false).unwrap();
        assert_eq!(result.value, serde_json::json!("1234"));
    }

    #[test]
    fn regex_anchor_matches_and_extracts() {
        let ocr = ocr_from_texts(&["Ref INV#2024-001 status: Paid now"]);
        let config = cfg(r"INV#\d{4}-\d{3}", true, 20, Some(":"));
        let result = extract(&ocr, &config, false).unwrap();
        assert_eq!(result.value, serde_json::json!("status"));
    }

    #[test]
    fn missing_anchor_is_empty() {
        let ocr = ocr_from_texts(&["nothing relevant"]);
        let config = cfg("Customer Name:", false, 30, None);
        let result = extract(&ocr, &config, false).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn array_field_collects_every_anchor_occurrence() {
        let ocr = ocr_from_texts(&["Item: A1 qty\nItem: B2 qty\nItem: C3 qty"]);
        let config = cfg("Item:", false, 10, Some("qty"));
        let result = extract(&ocr, &config, true).unwrap();
        assert_eq!(result.value, serde_json::json!(["A1", "B2", "C3"]));
        assert_eq!(result.source_page, Some(1));
    }

    #[test]
    fn array_field_with_regex_anchor_finds_all_matches() {
        let ocr = ocr_from_texts(&["PO#100 Alpha | PO#200 Beta | PO#300 Gamma"]);
        let config = cfg(r"PO#\d+", true, 20, Some("|"));
        let result = extract(&ocr, &config, true).unwrap();
        assert_eq!(result.value, serde_json::json!(["Alpha", "Beta", "Gamma"]));
    }

    #[test]
    fn array_field_missing_anchor_is_empty() {
        let ocr = ocr_from_texts(&["nothing relevant"]);
        let config = cfg("Item:", false, 10, None);
        let result = extract(&ocr, &config, true).unwrap();
        assert!(result.is_empty());
    }
}
