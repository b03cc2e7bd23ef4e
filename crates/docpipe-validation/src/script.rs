//! Sandboxed boolean-expression predicate evaluation. The original
//! backend shells out to `js2py` with no real timeout enforcement; this
//! port uses `rhai`, an embeddable scripting engine with no filesystem
//! or network access by construction, and enforces the spec's 100ms
//! wall-clock budget via an `on_progress` hook rather than a best-effort
//! comment.

use docpipe_utils::{DocpipeError, Result};
use std::time::{Duration, Instant};

const SCRIPT_TIMEOUT: Duration = Duration::from_millis(100);

/// Evaluate `expression` against `fields` (the document under
/// validation, exposed as the `fields` variable) and return its boolean
/// result.
pub fn evaluate(expression: &str, fields: &serde_json::Value) -> Result<bool> {
    let mut engine = rhai::Engine::new();
    engine.set_max_operations(200_000);
    engine.set_max_expr_depths(64, 64);

    let start = Instant::now();
    engine.on_progress(move |_ops| {
        if start.elapsed() > SCRIPT_TIMEOUT {
            Some(rhai::Dynamic::UNIT)
        } else {
            None
        }
    });

    let fields_dynamic = rhai::serde::to_dynamic(fields)
        .map_err(|e| DocpipeError::Sandbox(format!("could not marshal fields for script: {e}")))?;

    let mut scope = rhai::Scope::new();
    scope.push("fields", fields_dynamic);

    let result: rhai::Dynamic = engine
        .eval_with_scope(&mut scope, expression)
        .map_err(|e| DocpipeError::Sandbox(format!("script expression failed: {e}")))?;

    result
        .as_bool()
        .map_err(|_| DocpipeError::Sandbox("script expression did not evaluate to a boolean".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn evaluates_arithmetic_consistency_check() {
        let fields = json!({"amount": 10.0, "count": 3.0, "total": 30.0});
        let ok = evaluate("fields.amount * fields.count == fields.total", &fields).unwrap();
        assert!(ok);
    }

    #[test]
    fn false_when_expression_does_not_hold() {
        let fields = json!({"amount": 10.0, "count": 3.0, "total": 25.0});
        let ok = evaluate("fields.amount * fields.count == fields.total", &fields).unwrap();
        assert!(!ok);
    }

    #[test]
    fn invalid_expression_is_an_error() {
        let fields = json!({});
        let result = evaluate("fields.amount ===", &fields);
        assert!(result.is_err());
    }

    #[test]
    fn runaway_loop_is_killed_by_the_progress_guard() {
        let fields = json!({});
        let result = evaluate("let x = 0; while true { x += 1; }", &fields);
        assert!(result.is_err());
    }
}
