//! Confidence synthesis for regex/anchor/table extraction, and
//! separately for LLM-schema extraction, ported from
//! `extraction_service.py`'s `_calculate_confidence` and
//! `_calculate_llm_confidence`.

use docpipe_types::job::OcrStructured;
use docpipe_types::schema::SchemaNodeKind;

/// Confidence for a value pulled out by regex/anchor/table matching:
/// the average OCR confidence (0-100) of text boxes containing (or
/// contained in) the value, boosted 1.1x on an exact box match, capped
/// at 100, and reduced 0.9x when the value is under 3 characters.
#[must_use]
pub fn calculate_match_confidence(
    ocr: &OcrStructured,
    value: &str,
    source_page: Option<u32>,
) -> f32 {
    if value.is_empty() {
        return 0.0;
    }

    let pages: Vec<_> = ocr
        .pages
        .iter()
        .filter(|p| source_page.is_none_or(|n| p.page_number == n))
        .collect();

    let matching: Vec<_> = pages
        .iter()
        .flat_map(|p| p.boxes.iter())
        .filter(|b| value.contains(b.text.as_str()) || b.text.contains(value))
        .collect();

    if matching.is_empty() {
        return 60.0;
    }

    let avg = matching.iter().map(|b| b.confidence).sum::<f32>() / matching.len() as f32;
    let mut score = avg * 100.0;

    let exact_match = matching.iter().any(|b| b.text == value);
    if exact_match {
        score = (score * 1.1).min(100.0);
    }

    if value.trim().chars().count() < 3 {
        score *= 0.9;
    }

    (score * 100.0).round() / 100.0
}

/// Whether `value` fuzzily appears in `text`: case-insensitive substring
/// match, whitespace-stripped substring match, or (for values over 5
/// characters) at least 80% character-level overlap.
#[must_use]
pub fn fuzzy_match_in_text(value: &str, text: &str) -> bool {
    if value.is_empty() || text.is_empty() {
        return false;
    }
    let value = value.trim().to_lowercase();
    let text = text.to_lowercase();

    if text.contains(&value) {
        return true;
    }

    let value_no_space: String = value.chars().filter(|c| !c.is_whitespace()).collect();
    let text_no_space: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    if text_no_space.contains(&value_no_space) {
        return true;
    }

    if value.chars().count() > 5 {
        let match_chars = value.chars().filter(|c| text.contains(*c)).count();
        if match_chars as f64 / value.chars().count() as f64 >= 0.8 {
            return true;
        }
    }

    false
}

/// Confidence for an LLM-schema extracted field value. `kind` is the
/// schema node's declared shape (field/object/array/table); the
/// heuristics differ for each.
#[must_use]
pub fn calculate_llm_confidence(
    ocr: &OcrStructured,
    value: &serde_json::Value,
    kind: SchemaNodeKind,
) -> f32 {
    if value.is_null() {
        return 0.0;
    }
    match value {
        serde_json::Value::String(s) if s.trim().is_empty() => return 0.0,
        serde_json::Value::Array(a) if a.is_empty() => return 0.0,
        serde_json::Value::Object(o) if o.is_empty() => return 0.0,
        _ => {}
    }

    let merged_text = ocr.merged_text("\n");

    let mut score = match kind {
        SchemaNodeKind::Field => {
            let value_str = value_as_display_string(value);
            let mut s = if merged_text.contains(&value_str) {
                90.0
            } else if fuzzy_match_in_text(&value_str, &merged_text) {
                75.0
            } else {
                60.0
            };
            let len = value_str.trim().chars().count();
            if len < 2 {
                s *= 0.8;
            } else if len > 100 {
                s *= 0.9;
            }
            s
        }
        SchemaNodeKind::Object => match value.as_object() {
            Some(obj) if !obj.is_empty() => {
                let total = obj.len();
                let filled = obj
                    .values()
                    .filter(|v| !v.is_null() && v.as_str() != Some(""))
                    .count();
                60.0 + (filled as f32 / total as f32) * 30.0
            }
            Some(_) => 50.0,
            None => 40.0,
        },
        SchemaNodeKind::Array | SchemaNodeKind::Table => match value.as_array() {
            Some(items) if !items.is_empty() => {
                let mut s = if items.len() == 1 { 65.0 } else { 75.0 };
                let match_count = items
                    .iter()
                    .filter(|item| merged_text.contains(&value_as_display_string(item)))
                    .count();
                s += (match_count as f32 / items.len() as f32) * 15.0;
                s
            }
            _ => return 0.0,
        },
    };

    score = score.min(100.0);
    (score * 10.0).round() / 10.0
}

fn value_as_display_string(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
