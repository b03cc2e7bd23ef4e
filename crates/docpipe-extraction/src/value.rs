//! Shared result type for every extraction strategy.

use serde::{Deserialize, Serialize};

/// One field's extracted value plus the page it was found on (if any)
/// and a best-effort raw confidence, before [`crate::confidence`]
/// synthesizes the final score against the OCR boxes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedValue {
    pub value: serde_json::Value,
    pub source_page: Option<u32>,
}

impl ExtractedValue {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            value: serde_json::Value::Null,
            source_page: None,
        }
    }

    #[must_use]
    pub fn scalar(text: impl Into<String>, page: Option<u32>) -> Self {
        Self {
            value: serde_json::Value::String(text.into()),
            source_page: page,
        }
    }

    #[must_use]
    pub fn array(values: Vec<serde_json::Value>, page: Option<u32>) -> Self {
        Self {
            value: serde_json::Value::Array(values),
            source_page: page,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(&self.value, serde_json::Value::Null)
            || matches!(&self.value, serde_json::Value::String(s) if s.is_empty())
            || matches!(&self.value, serde_json::Value::Array(a) if a.is_empty())
    }
}
