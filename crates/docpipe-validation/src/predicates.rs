//! Field-scoped validation predicates, ported from
//! `validation_service.py`'s `validate*` family: required/not-empty,
//! named and custom regex patterns, numeric range, array length/unique/
//! items-required, and object has-fields.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::collections::HashMap;

static NAMED_PATTERNS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("email", r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$"),
        ("phone", r"^1[3-9]\d{9}$"),
        ("url", r"^https?://\S+$"),
        ("id_card", r"^\d{17}[\dXx]$"),
    ])
});

#[must_use]
pub fn is_blank(value: &Value) -> bool {
    matches!(value, Value::Null) || matches!(value, Value::String(s) if s.is_empty())
}

pub fn required(field: &str, value: &Value) -> Option<String> {
    is_blank(value).then(|| format!("required field is empty: {field}"))
}

pub fn not_empty(field: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(format!("field {field} is empty")),
        Value::Object(o) if o.is_empty() => Some(format!("field {field} object must not be empty")),
        Value::Array(a) if a.is_empty() => Some(format!("field {field} array must not be empty")),
        Value::String(s) if s.trim().is_empty() => {
            Some(format!("field {field} must not be an empty string"))
        }
        _ => None,
    }
}

pub fn pattern(
    field: &str,
    value: &Value,
    name: Option<&str>,
    custom_regex: Option<&str>,
) -> Option<String> {
    let pattern = if let Some(custom) = custom_regex {
        custom.to_string()
    } else if let Some(name) = name {
        match NAMED_PATTERNS.get(name) {
            Some(p) => (*p).to_string(),
            None => {
                let supported = NAMED_PATTERNS.keys().copied().collect::<Vec<_>>().join(", ");
                return Some(format!(
                    "unknown validation pattern {name:?}, supported: {supported}"
                ));
            }
        }
    } else {
        return None;
    };

    let Ok(re) = Regex::new(&pattern) else {
        return Some(format!("invalid pattern for field {field}: {pattern:?}"));
    };
    let text = value_as_text(value);
    if re.is_match(&text) {
        None
    } else {
        let desc = name.unwrap_or("custom format");
        Some(format!("field {field} does not match expected format: {desc}"))
    }
}

pub fn numeric_range(field: &str, value: &Value, min: Option<f64>, max: Option<f64>) -> Option<String> {
    let Some(numeric) = parse_numeric(value) else {
        return Some(format!("field {field} cannot be parsed as a number"));
    };
    if let Some(min) = min {
        if numeric < min {
            return Some(format!("field {field} value {numeric} is below minimum {min}"));
        }
    }
    if let Some(max) = max {
        if numeric > max {
            return Some(format!("field {field} value {numeric} is above maximum {max}"));
        }
    }
    None
}

pub fn array_length(field: &str, value: &Value, min: Option<usize>, max: Option<usize>) -> Option<String> {
    let Value::Array(items) = value else {
        return Some(format!("field {field} is not an array"));
    };
    let len = items.len();
    if let Some(min) = min {
        if len < min {
            return Some(format!("field {field} array length {len} is below minimum {min}"));
        }
    }
    if let Some(max) = max {
        if len > max {
            return Some(format!("field {field} array length {len} is above maximum {max}"));
        }
    }
    None
}

pub fn array_unique(field: &str, value: &Value, key: Option<&str>) -> Option<String> {
    let Value::Array(items) = value else {
        return Some(format!("field {field} is not an array"));
    };
    let mut seen = std::collections::HashSet::new();
    let mut duplicates = Vec::new();
    for (i, item) in items.iter().enumerate() {
        let check = match (key, item) {
            (Some(key), Value::Object(obj)) => obj.get(key).map(value_as_text).unwrap_or_default(),
            _ => value_as_text(item),
        };
        if !seen.insert(check.clone()) {
            duplicates.push(format!("index {i}: {check}"));
        }
    }
    if duplicates.is_empty() {
        None
    } else {
        Some(format!(
            "field {field} has duplicate elements: {}",
            duplicates.join(", ")
        ))
    }
}

pub fn has_fields(field: &str, value: &Value, required: &[String]) -> Option<String> {
    let Value::Object(obj) = value else {
        return Some(format!("field {field} is not an object"));
    };
    let missing: Vec<&str> = required
        .iter()
        .filter(|req| obj.get(req.as_str()).is_none_or(is_blank))
        .map(String::as_str)
        .collect();
    if missing.is_empty() {
        None
    } else {
        Some(format!(
            "field {field} is missing required sub-fields: {}",
            missing.join(", ")
        ))
    }
}

pub fn array_items_required(field: &str, value: &Value, required: &[String]) -> Vec<String> {
    let mut errors = Vec::new();
    let Value::Array(items) = value else {
        errors.push(format!("field {field} must be an array"));
        return errors;
    };
    if items.is_empty() {
        errors.push(format!("required array is empty: {field}"));
        return errors;
    }
    for (i, item) in items.iter().enumerate() {
        let Value::Object(obj) = item else { continue };
        for req in required {
            if obj.get(req.as_str()).is_none_or(is_blank) {
                errors.push(format!(
                    "array {field} item {} is missing required field: {req}",
                    i + 1
                ));
            }
        }
    }
    errors
}

fn value_as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.replace(',', "").trim().parse::<f64>().ok(),
        _ => None,
    }
}
