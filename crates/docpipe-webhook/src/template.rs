//! Request-body template rendering: replaces `{{placeholder}}` tokens in
//! a webhook's JSON template with job-derived values, ported from
//! `push_service.py`'s `_render_request_template`.

use docpipe_types::job::Job;

/// Variables available to a request template, matching the set
/// `_render_request_template` builds: `task_id`, `result_json`,
/// `file_url`, `meta_info`.
pub struct TemplateContext<'a> {
    pub job: &'a Job,
    pub file_url: String,
}

impl<'a> TemplateContext<'a> {
    #[must_use]
    pub fn new(job: &'a Job, file_url: String) -> Self {
        Self { job, file_url }
    }

    fn meta_info(&self) -> serde_json::Value {
        serde_json::json!({
            "file_name": self.job.original_filename,
            "page_count": self.job.page_count,
            "rule_id": self.job.rule.rule_id,
            "rule_version": self.job.rule.rule_version,
            "created_at": self.job.created_at,
            "completed_at": self.job.completed_at,
            "confidence_scores": self.job.confidence,
            "llm_token_count": self.job.llm_accounting.tokens,
            "llm_cost": self.job.llm_accounting.cost_micros as f64 / 1_000_000.0,
        })
    }

    fn variables(&self) -> Vec<(&'static str, serde_json::Value)> {
        vec![
            ("task_id", serde_json::Value::String(self.job.id.clone())),
            ("result_json", self.job.extracted_fields.clone()),
            (
                "file_url",
                serde_json::Value::String(self.file_url.clone()),
            ),
            ("meta_info", self.meta_info()),
        ]
    }
}

/// Render `template` by substituting each `"{{name}}"` occurrence with
/// its JSON-encoded value (dropping the surrounding quotes so objects
/// and numbers splice in structurally, matching the Python original's
/// string-replace-on-the-serialized-template approach).
#[must_use]
pub fn render(template: &serde_json::Value, ctx: &TemplateContext) -> String {
    let mut rendered = template.to_string();
    for (name, value) in ctx.variables() {
        let placeholder = format!("\"{{{{{name}}}}}\"");
        if rendered.contains(&placeholder) {
            let value_str = value.to_string();
            rendered = rendered.replace(&placeholder, &value_str);
        }
    }
    rendered
}
