//! Regex extraction strategy, ported from `extraction_service.py`'s
//! `_extract_by_regex`: `match_all = false` returns the first match's
//! capture group as a scalar, `match_all = true` returns every match's
//! capture group as an array.

use crate::value::ExtractedValue;
use docpipe_types::job::OcrStructured;
use docpipe_types::rule::ExtractionStrategyConfig;
use docpipe_utils::{DocpipeError, Result};
use regex::Regex;

pub fn extract(ocr: &OcrStructured, config: &ExtractionStrategyConfig) -> Result<ExtractedValue> {
    let ExtractionStrategyConfig::Regex {
        pattern,
        match_all,
        capture_group,
    } = config
    else {
        return Err(DocpipeError::Extraction(
            "regex strategy invoked with a non-regex config".into(),
        ));
    };

    let re = Regex::new(pattern)
        .map_err(|e| DocpipeError::Extraction(format!("invalid regex pattern {pattern:?}: {e}")))?;

    if *match_all {
        let mut values = Vec::new();
        let mut last_page = None;
        for page in &ocr.pages {
            for caps in re.captures_iter(&page.text) {
                if let Some(group) = capture_text(&caps, *capture_group) {
                    values.push(serde_json::Value::String(group.to_string()));
                    last_page = Some(page.page_number);
                }
            }
        }
        Ok(ExtractedValue {
            value: serde_json::Value::Array(values),
            source_page: last_page,
        })
    } else {
        for page in &ocr.pages {
            if let Some(caps) = re.captures(&page.text) {
                if let Some(group) = capture_text(&caps, *capture_group) {
                    return Ok(ExtractedValue::scalar(group, Some(page.page_number)));
                }
            }
        }
        Ok(ExtractedValue::empty())
    }
}

fn capture_text<'a>(caps: &regex::Captures<'a>, group: usize) -> Option<&'a str> {
    caps.get(group).map(|m| m.as_str())
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

    fn cfg(pattern: &str, match_all: bool, capture_group: usize) -> ExtractionStrategyConfig {
        ExtractionStrategyConfig::Regex {
            pattern: pattern.to_string(),
            match_all,
            capture_group,
        }
    }

    #[test]
    fn first_match_returns_capture_group() {
        let ocr = ocr_from_texts(&["Invoice No: INV-99182"]);
        let config = cfg(r"Invoice No:\s*(\S+)", false, 1);
        let result = extract(&ocr, &config).unwrap();
        assert_eq!(result.value, serde_json::json!("INV-99182"));
        assert_eq!(result.source_page, Some(1));
    }

    #[test]
    fn whole_match_when_capture_group_zero() {
        let ocr = ocr_from_texts(&["Total: 500"]);
        let config = cfg(r"Total: \d+", false, 0);
        let result = extract(&ocr, &config).unwrap();
        assert_eq!(result.value, serde_json::json!("Total: 500"));
    }

    #[test]
    fn match_all_collects_every_page() {
        let ocr = ocr_from_texts(&["Item: A1", "Item: B2"]);
        let config = cfg(r"Item: (\w+)", true, 1);
        let result = extract(&ocr, &config).unwrap();
        assert_eq!(result.value, serde_json::json!(["A1", "B2"]));
    }

    #[test]
    fn no_match_is_empty() {
        let ocr = ocr_from_texts(&["nothing relevant here"]);
        let config = cfg(r"Invoice No:\s*(\S+)", false, 1);
        let result = extract(&ocr, &config).unwrap();
        assert!(result.is_empty());
    }
}
