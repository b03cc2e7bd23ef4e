//! Structural similarity between two extracted values, used by the
//! orchestrator's consistency-check stage to compare an OCR/regex-driven
//! field against an independently vision-extracted one. Ported from
//! `llm_service.py`'s `compare_results`/`_compare_dicts`/
//! `_compare_lists`: both-null is a perfect match, one-null is a total
//! mismatch, object comparison averages per-key similarity over the
//! union of both objects' keys (a key present on only one side scores
//! zero), array comparison averages positional similarity over the
//! longer array's length, and anything else falls back to a string
//! ratio.
//!
//! The original measures string similarity with Python's
//! `difflib.SequenceMatcher.ratio()`; no crate in this workspace's
//! dependency tree implements that algorithm, so [`string_ratio`] is a
//! direct longest-common-subsequence ratio instead
//! (`2 * lcs_len / (len_a + len_b)`), which agrees with `SequenceMatcher`
//! on everything but its opcode-merging heuristics.

use serde_json::Value;

/// Structural similarity between `a` and `b`, in `[0, 100]`.
#[must_use]
pub fn similarity(a: &Value, b: &Value) -> f32 {
    match (a.is_null(), b.is_null()) {
        (true, true) => return 100.0,
        (true, false) | (false, true) => return 0.0,
        (false, false) => {}
    }

    match (a, b) {
        (Value::Object(oa), Value::Object(ob)) => object_similarity(oa, ob),
        (Value::Array(va), Value::Array(vb)) => array_similarity(va, vb),
        _ => string_ratio(&display(a), &display(b)) * 100.0,
    }
}

fn object_similarity(a: &serde_json::Map<String, Value>, b: &serde_json::Map<String, Value>) -> f32 {
    let mut keys: std::collections::BTreeSet<&String> = a.keys().collect();
    keys.extend(b.keys());
    if keys.is_empty() {
        return 100.0;
    }
    let total: f32 = keys
        .iter()
        .map(|k| match (a.get(*k), b.get(*k)) {
            (Some(va), Some(vb)) => similarity(va, vb),
            (None, None) => 100.0,
            _ => 0.0,
        })
        .sum();
    total / keys.len() as f32
}

fn array_similarity(a: &[Value], b: &[Value]) -> f32 {
    let max_len = a.len().max(b.len());
    if max_len == 0 {
        return 100.0;
    }
    let total: f32 = (0..max_len)
        .map(|i| match (a.get(i), b.get(i)) {
            (Some(va), Some(vb)) => similarity(va, vb),
            _ => 0.0,
        })
        .sum();
    total / max_len as f32
}

fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Longest-common-subsequence length ratio in `[0, 1]`.
fn string_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let lcs = lcs_len(&a, &b);
    (2 * lcs) as f32 / (a.len() + b.len()) as f32
}

fn lcs_len(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb { prev[j] + 1 } else { prev[j + 1].max(curr[j]) };
        }
        std::mem::swap(&mut prev, &mut curr);
        for slot in &mut curr {
            *slot = 0;
        }
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn both_null_is_a_perfect_match() {
        assert_eq!(similarity(&Value::Null, &Value::Null), 100.0);
    }

    #[test]
    fn one_null_is_a_total_mismatch() {
        assert_eq!(similarity(&Value::Null, &json!("x")), 0.0);
        assert_eq!(similarity(&json!("x"), &Value::Null), 0.0);
    }

    #[test]
    fn identical_strings_are_a_perfect_match() {
        assert_eq!(similarity(&json!("INV-001"), &json!("INV-001")), 100.0);
    }

    #[test]
    fn near_miss_strings_score_partial_similarity() {
        let score = similarity(&json!("INV-001"), &json!("INV-0O1"));
        assert!(score > 50.0 && score < 100.0, "score was {score}");
    }

    #[test]
    fn object_similarity_averages_over_key_union() {
        let a = json!({"total": "100", "tax": "10"});
        let b = json!({"total": "100"});
        // "total" matches (100.0), "tax" is missing on b's side (0.0).
        assert_eq!(similarity(&a, &b), 50.0);
    }

    #[test]
    fn array_similarity_averages_positionally_over_the_longer_array() {
        let a = json!(["a", "b"]);
        let b = json!(["a", "b", "c"]);
        let score = similarity(&a, &b);
        // two exact matches + one missing slot, divided by 3.
        assert!((score - 200.0 / 3.0).abs() < 0.01);
    }
}
