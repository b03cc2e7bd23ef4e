//! Cleaning pipeline: regex-replace/trim/date-reformat ops applied per
//! field path, with array broadcast for nested line-item fields.
//! Ported from `validation_service.py`'s `clean_data`/`_clean_nested_field`.

use docpipe_types::rule::{CleaningOp, ValidationMap};
use regex::Regex;
use serde_json::Value;

/// Recognized source date-only formats, tried in order. The first seven
/// are ported verbatim from `ValidationService.DATE_FORMATS`; chrono
/// matches the CJK separators as literal text, same as Python's
/// `strptime`.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%Y年%m月%d日",
    "%Y.%m.%d",
    "%Y%m%d",
    "%d.%m.%Y",
];

/// Timestamp formats tried when no date-only format matches.
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"];

/// Run every field's cleaning ops (in declared order) against `doc` in
/// place.
pub fn clean(doc: &mut Value, validation_map: &ValidationMap) {
    for (field, validation) in validation_map {
        if validation.cleaning.is_empty() {
            continue;
        }
        let segments: Vec<&str> = field.split('.').collect();
        apply_segments(doc, &segments, &validation.cleaning);
    }
}

fn apply_segments(node: &mut Value, segments: &[&str], ops: &[CleaningOp]) {
    let Some((head, rest)) = segments.split_first() else {
        return;
    };
    let Value::Object(map) = node else { return };
    let Some(child) = map.get_mut(*head) else {
        return;
    };
    if rest.is_empty() {
        apply_ops(child, ops);
    } else {
        broadcast(child, rest, ops);
    }
}

fn broadcast(node: &mut Value, segments: &[&str], ops: &[CleaningOp]) {
    match node {
        Value::Array(items) => {
            for item in items.iter_mut() {
                apply_segments(item, segments, ops);
            }
        }
        Value::Object(_) => apply_segments(node, segments, ops),
        _ => {}
    }
}

fn apply_ops(value: &mut Value, ops: &[CleaningOp]) {
    if value.is_null() {
        return;
    }
    for op in ops {
        match op {
            CleaningOp::RegexReplace { pattern, replacement } => {
                regex_replace(value, pattern, replacement);
            }
            CleaningOp::Trim => trim(value),
            CleaningOp::DateReformat { target_format } => reformat_date(value, target_format),
        }
    }
}

fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn regex_replace(value: &mut Value, pattern: &str, replacement: &str) {
    let Ok(re) = Regex::new(pattern) else {
        tracing::warn!(pattern, "invalid regex in cleaning rule, skipping");
        return;
    };
    let text = as_text(value);
    *value = Value::String(re.replace_all(&text, replacement).into_owned());
}

fn trim(value: &mut Value) {
    let text = as_text(value);
    *value = Value::String(text.trim().to_string());
}

fn reformat_date(value: &mut Value, target_format: &str) {
    let text = as_text(value);
    let trimmed = text.trim();
    for fmt in DATE_FORMATS {
        if let Ok(date) = chrono::NaiveDate::parse_from_str(trimmed, fmt) {
            *value = Value::String(date.format(target_format).to_string());
            return;
        }
    }
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(trimmed, fmt) {
            *value = Value::String(dt.format(target_format).to_string());
            return;
        }
    }
    tracing::warn!(value = %trimmed, "could not recognize date format, leaving value as-is");
    *value = Value::String(trimmed.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use docpipe_types::rule::FieldValidation;
    use serde_json::json;

    fn map_with(field: &str, ops: Vec<CleaningOp>) -> ValidationMap {
        let mut map = ValidationMap::new();
        map.insert(
            field.to_string(),
            FieldValidation {
                cleaning: ops,
                predicates: Vec::new(),
            },
        );
        map
    }

    #[test]
    fn regex_replace_strips_commas() {
        let mut doc = json!({"amount": "1,234.50"});
        let map = map_with(
            "amount",
            vec![CleaningOp::RegexReplace {
                pattern: ",".to_string(),
                replacement: String::new(),
            }],
        );
        clean(&mut doc, &map);
        assert_eq!(doc["amount"], json!("1234.50"));
    }

    #[test]
    fn trim_removes_surrounding_whitespace() {
        let mut doc = json!({"name": "  Acme Corp  "});
        let map = map_with("name", vec![CleaningOp::Trim]);
        clean(&mut doc, &map);
        assert_eq!(doc["name"], json!("Acme Corp"));
    }

    #[test]
    fn date_reformat_normalizes_recognized_format() {
        let mut doc = json!({"issued_on": "2024/05/01"});
        let map = map_with(
            "issued_on",
            vec![CleaningOp::DateReformat {
                target_format: "%Y-%m-%d".to_string(),
            }],
        );
        clean(&mut doc, &map);
        assert_eq!(doc["issued_on"], json!("2024-05-01"));
    }

    #[test]
    fn broadcasts_across_array_of_line_items() {
        let mut doc = json!({"line": [{"qty": " 3 "}, {"qty": " 1 "}]});
        let map = map_with("line.qty", vec![CleaningOp::Trim]);
        clean(&mut doc, &map);
        assert_eq!(doc["line"][0]["qty"], json!("3"));
        assert_eq!(doc["line"][1]["qty"], json!("1"));
    }
}
