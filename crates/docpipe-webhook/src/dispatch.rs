//! Top-level webhook dispatch: routes to the generic-HTTP or ERP-session
//! target by `Webhook::kind`, and builds the `PushLog` record either
//! target leaves behind. Ported from `push_service.py`'s
//! `push_to_webhook`, which branches on `webhook_type` before anything
//! else happens.

use crate::erp::ErpClient;
use crate::generic::{self, AuthCredential};
use crate::template::TemplateContext;
use docpipe_config::ErpConfig;
use docpipe_types::webhook::{PushLog, Webhook, WebhookType};
use std::collections::HashMap;
use std::time::Duration;

pub struct DispatchOutcome {
    pub success: bool,
    pub push_log: PushLog,
}

/// Push one job's result to one webhook. `retry_count` is recorded on
/// the resulting [`PushLog`] for observability; the caller (orchestrator)
/// owns re-scheduling via [`crate::retry`].
pub async fn dispatch(
    http_client: &reqwest::Client,
    webhook: &Webhook,
    credential: &AuthCredential,
    ctx: &TemplateContext<'_>,
    erp_config: &ErpConfig,
    timeout: Duration,
    retry_count: u32,
) -> DispatchOutcome {
    match webhook.kind {
        WebhookType::Generic => match generic::push(http_client, webhook, credential, ctx, timeout).await {
            Ok(outcome) => DispatchOutcome {
                success: outcome.success,
                push_log: PushLog {
                    job_id: ctx.job.id.clone(),
                    webhook_id: webhook.id.clone(),
                    http_status: outcome.http_status,
                    request_headers: HashMap::new(),
                    request_body: outcome.request_body,
                    response_body: outcome.response_body,
                    duration_ms: outcome.duration_ms,
                    retry_count,
                    error: outcome.error,
                    save_mode: None,
                    is_degraded: false,
                    created_at: chrono::Utc::now(),
                },
            },
            Err(e) => DispatchOutcome {
                success: false,
                push_log: PushLog {
                    job_id: ctx.job.id.clone(),
                    webhook_id: webhook.id.clone(),
                    http_status: None,
                    request_headers: HashMap::new(),
                    request_body: String::new(),
                    response_body: None,
                    duration_ms: 0,
                    retry_count,
                    error: Some(e.to_string()),
                    save_mode: None,
                    is_degraded: false,
                    created_at: chrono::Utc::now(),
                },
            },
        },
        WebhookType::ErpSession => {
            let request_body = ctx.job.extracted_fields.clone();
            if request_body.get("parameters").is_none() {
                return DispatchOutcome {
                    success: false,
                    push_log: PushLog {
                        job_id: ctx.job.id.clone(),
                        webhook_id: webhook.id.clone(),
                        http_status: None,
                        request_headers: HashMap::new(),
                        request_body: request_body.to_string(),
                        response_body: None,
                        duration_ms: 0,
                        retry_count,
                        error: Some(
                            "ERP request body must contain a top-level `parameters` field"
                                .to_string(),
                        ),
                        save_mode: None,
                        is_degraded: false,
                        created_at: chrono::Utc::now(),
                    },
                };
            }
            let mut erp_client = ErpClient::new(erp_config);
            let result = erp_client.smart_save(&request_body).await;
            DispatchOutcome {
                success: result.success,
                push_log: PushLog {
                    job_id: ctx.job.id.clone(),
                    webhook_id: webhook.id.clone(),
                    http_status: result.http_status,
                    request_headers: HashMap::new(),
                    request_body: request_body.to_string(),
                    response_body: result.response_body,
                    duration_ms: result.duration_ms,
                    retry_count,
                    error: result.error,
                    save_mode: Some(result.save_mode.to_string()),
                    is_degraded: result.is_degraded,
                    created_at: chrono::Utc::now(),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docpipe_types::job::{ConfidenceMap, Job, JobStatus, LlmAccounting, OcrStructured, RuleRef};
    use docpipe_types::webhook::AuthMode;

    fn sample_job(extracted_fields: serde_json::Value) -> Job {
        Job {
            id: "job-1".to_string(),
            original_filename: "invoice.pdf".to_string(),
            object_key: "key".to_string(),
            content_hash: [0u8; 32],
            page_count: 1,
            rule: RuleRef {
                rule_id: "rule-1".to_string(),
                rule_version: "v1".to_string(),
            },
            status: JobStatus::Completed,
            is_instant: false,
            ocr_text: String::new(),
            ocr_structured: OcrStructured::default(),
            extracted_fields,
            confidence: ConfidenceMap::new(),
            audit_reasons: Vec::new(),
            auditor: None,
            audited_at: None,
            llm_accounting: LlmAccounting::default(),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            last_error: None,
        }
    }

    #[tokio::test]
    async fn erp_dispatch_rejects_missing_parameters_field() {
        let webhook = Webhook {
            id: "wh-erp".to_string(),
            name: "kingdee".to_string(),
            kind: WebhookType::ErpSession,
            endpoint_url: None,
            auth_mode: AuthMode::None,
            auth_secret_encrypted: None,
            signing_secret: None,
            request_template: serde_json::json!({}),
            active: true,
            save_mode: None,
        };
        let job = sample_job(serde_json::json!({"not_parameters": true}));
        let ctx = TemplateContext::new(&job, String::new());
        let erp_config = ErpConfig::default();
        let client = reqwest::Client::new();
        let outcome = dispatch(
            &client,
            &webhook,
            &AuthCredential::None,
            &ctx,
            &erp_config,
            Duration::from_secs(5),
            0,
        )
        .await;
        assert!(!outcome.success);
        assert!(outcome
            .push_log
            .error
            .unwrap()
            .contains("parameters"));
    }
}
