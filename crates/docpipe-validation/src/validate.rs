//! Runs a rule's `ValidationMap` against an extracted document,
//! producing `AuditReason::ValidationFailed` entries for every predicate
//! that fails. Ported from `validation_service.py`'s `validate`.

use crate::{predicates, script};
use docpipe_types::field_path;
use docpipe_types::job::{AuditReason, AuditReasonType};
use docpipe_types::rule::{ValidationMap, ValidationPredicate};
use serde_json::Value;

/// Evaluate every predicate bound in `validation_map` against `doc`,
/// returning one audit reason per failure. Predicates whose value is
/// blank are skipped (matching the source's "skip further checks for an
/// absent optional field" behavior) except `Required`, which is the one
/// predicate that fires precisely because the value is blank.
#[must_use]
pub fn validate(doc: &Value, validation_map: &ValidationMap) -> Vec<AuditReason> {
    let mut reasons = Vec::new();

    for (field, validation) in validation_map {
        let value = field_path::get(doc, field).cloned().unwrap_or(Value::Null);

        for predicate in &validation.predicates {
            let message = match predicate {
                ValidationPredicate::Required => predicates::required(field, &value),
                ValidationPredicate::NotEmpty => predicates::not_empty(field, &value),
                ValidationPredicate::Pattern { name, custom_regex } => {
                    if predicates::is_blank(&value) {
                        None
                    } else {
                        predicates::pattern(field, &value, name.as_deref(), custom_regex.as_deref())
                    }
                }
                ValidationPredicate::NumericRange { min, max } => {
                    if predicates::is_blank(&value) {
                        None
                    } else {
                        predicates::numeric_range(field, &value, *min, *max)
                    }
                }
                ValidationPredicate::ArrayLength { min, max } => {
                    predicates::array_length(field, &value, *min, *max)
                }
                ValidationPredicate::ArrayUnique { key } => {
                    predicates::array_unique(field, &value, key.as_deref())
                }
                ValidationPredicate::HasFields { fields } => {
                    predicates::has_fields(field, &value, fields)
                }
                ValidationPredicate::ArrayItemsRequired { fields } => {
                    let errors = predicates::array_items_required(field, &value, fields);
                    for error in errors {
                        reasons.push(failure(field, error));
                    }
                    None
                }
                ValidationPredicate::ScriptExpression { expression } => {
                    match script::evaluate(expression, doc) {
                        Ok(true) => None,
                        Ok(false) => Some(format!("script expression failed: {expression}")),
                        Err(e) => Some(format!("script expression error: {e}")),
                    }
                }
            };

            if let Some(message) = message {
                reasons.push(failure(field, message));
            }
        }
    }

    reasons
}

fn failure(field: &str, message: String) -> AuditReason {
    AuditReason {
        kind: AuditReasonType::ValidationFailed,
        field: field.to_string(),
        confidence: None,
        threshold: None,
        message: Some(message),
    }
}
