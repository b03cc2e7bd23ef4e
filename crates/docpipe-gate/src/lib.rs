//! Audit-gate policy (spec §4.4): a job is routed to `pending_audit`
//! when it has any validation failure or any field whose confidence
//! falls below its effective threshold. Generalizes the teacher's
//! `GatePolicy` (a flat set of pass/fail conditions accumulated into one
//! gate decision) from CI-spec gating to per-job audit gating.

use docpipe_types::job::{AuditReason, AuditReasonType, ConfidenceMap};
use docpipe_types::schema::{SchemaNode, SchemaNodeKind};

/// Outcome of running the audit gate against one job's extraction
/// result: every accumulated reason, and whether the job should be
/// routed to audit (`true` iff `reasons` is non-empty).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateResult {
    pub reasons: Vec<AuditReason>,
    pub needs_audit: bool,
}

/// Evaluate the audit gate: combine pre-computed validation-failure
/// reasons with confidence-below-threshold reasons derived by walking
/// `schema` against `confidence`.
#[must_use]
pub fn evaluate(
    schema: &SchemaNode,
    confidence: &ConfidenceMap,
    rule_default_threshold: Option<f32>,
    validation_reasons: Vec<AuditReason>,
) -> GateResult {
    let mut reasons = validation_reasons;

    let mut leaves = Vec::new();
    collect_leaf_thresholds(schema, None, rule_default_threshold, &mut leaves);

    for (path, threshold) in leaves {
        let Some(&score) = confidence.get(&path) else {
            continue;
        };
        if score < threshold {
            reasons.push(AuditReason {
                kind: AuditReasonType::ConfidenceLow,
                field: path,
                confidence: Some(score),
                threshold: Some(threshold),
                message: None,
            });
        }
    }

    let needs_audit = !reasons.is_empty();
    GateResult { reasons, needs_audit }
}

fn collect_leaf_thresholds(
    node: &SchemaNode,
    path_prefix: Option<String>,
    rule_default: Option<f32>,
    out: &mut Vec<(String, f32)>,
) {
    match node.kind {
        SchemaNodeKind::Field => {
            if let Some(path) = path_prefix {
                out.push((path, node.effective_threshold(rule_default)));
            }
        }
        SchemaNodeKind::Object => {
            for (key, child) in &node.children {
                let child_path = join(&path_prefix, key);
                collect_leaf_thresholds(child, Some(child_path), rule_default, out);
            }
        }
        SchemaNodeKind::Array => {
            if let Some(element) = &node.element {
                collect_leaf_thresholds(element, path_prefix, rule_default, out);
            }
        }
        SchemaNodeKind::Table => {
            for (key, child) in &node.children {
                let child_path = join(&path_prefix, key);
                collect_leaf_thresholds(child, Some(child_path), rule_default, out);
            }
        }
    }
}

fn join(prefix: &Option<String>, key: &str) -> String {
    match prefix {
        Some(p) => format!("{p}.{key}"),
        None => key.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn flat_schema() -> SchemaNode {
        let mut children = BTreeMap::new();
        children.insert(
            "invoice_number".to_string(),
            SchemaNode::field("invoice_number").with_threshold(90.0),
        );
        children.insert("total".to_string(), SchemaNode::field("total"));
        SchemaNode::object("root", children)
    }

    #[test]
    fn clean_job_does_not_need_audit() {
        let schema = flat_schema();
        let mut confidence = ConfidenceMap::new();
        confidence.insert("invoice_number".to_string(), 95.0);
        confidence.insert("total".to_string(), 85.0);
        let result = evaluate(&schema, &confidence, Some(80.0), Vec::new());
        assert!(!result.needs_audit);
    }

    #[test]
    fn low_confidence_field_triggers_audit() {
        let schema = flat_schema();
        let mut confidence = ConfidenceMap::new();
        confidence.insert("invoice_number".to_string(), 60.0);
        confidence.insert("total".to_string(), 85.0);
        let result = evaluate(&schema, &confidence, Some(80.0), Vec::new());
        assert!(result.needs_audit);
        assert_eq!(result.reasons.len(), 1);
        assert_eq!(result.reasons[0].field, "invoice_number");
    }

    #[test]
    fn validation_failures_always_trigger_audit() {
        let schema = flat_schema();
        let mut confidence = ConfidenceMap::new();
        confidence.insert("invoice_number".to_string(), 95.0);
        confidence.insert("total".to_string(), 95.0);
        let validation = vec![AuditReason {
            kind: AuditReasonType::ValidationFailed,
            field: "total".to_string(),
            confidence: None,
            threshold: None,
            message: Some("required field is empty".to_string()),
        }];
        let result = evaluate(&schema, &confidence, Some(80.0), validation);
        assert!(result.needs_audit);
        assert_eq!(result.reasons.len(), 1);
    }

    #[test]
    fn array_broadcast_resolves_line_item_thresholds() {
        let mut line_children = BTreeMap::new();
        line_children.insert("qty".to_string(), SchemaNode::field("qty").with_threshold(90.0));
        let line_elem = SchemaNode::object("line", line_children);
        let mut root_children = BTreeMap::new();
        root_children.insert("line".to_string(), SchemaNode::array("line", line_elem));
        let schema = SchemaNode::object("root", root_children);

        let mut confidence = ConfidenceMap::new();
        confidence.insert("line.qty".to_string(), 70.0);
        let result = evaluate(&schema, &confidence, Some(80.0), Vec::new());
        assert!(result.needs_audit);
    }
}
