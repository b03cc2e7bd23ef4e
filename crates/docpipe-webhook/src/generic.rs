//! Generic HTTP webhook target: render the request template, apply auth
//! headers and an optional HMAC signature, POST with a 30s-class
//! timeout. Ported from `push_service.py`'s `_push_to_http`/`_build_headers`.

use crate::signing;
use crate::template::{render, TemplateContext};
use docpipe_types::webhook::{AuthMode, Webhook};
use docpipe_utils::{DocpipeError, Result};
use std::time::Duration;

/// Outcome of a single delivery attempt, mirroring `PushResult`.
pub struct PushOutcome {
    pub success: bool,
    pub http_status: Option<u16>,
    pub request_body: String,
    pub response_body: Option<String>,
    pub duration_ms: u64,
    pub error: Option<String>,
}

/// Plaintext credential bound to a webhook's `auth_mode`, resolved by
/// the caller from `Webhook::auth_secret_encrypted` before the push
/// (this crate never touches the at-rest encryption).
pub enum AuthCredential {
    None,
    Basic { username: String, password: String },
    Bearer { token: String },
    ApiKey { header_name: String, value: String },
}

pub async fn push(
    client: &reqwest::Client,
    webhook: &Webhook,
    credential: &AuthCredential,
    ctx: &TemplateContext<'_>,
    timeout: Duration,
) -> Result<PushOutcome> {
    let endpoint = webhook
        .endpoint_url
        .as_deref()
        .filter(|u| u.starts_with("http://") || u.starts_with("https://"))
        .ok_or_else(|| {
            DocpipeError::Webhook(format!(
                "webhook {} has no valid endpoint_url",
                webhook.name
            ))
        })?;

    let request_body = render(&webhook.request_template, ctx);
    let started = std::time::Instant::now();

    let mut builder = client
        .post(endpoint)
        .header("Content-Type", "application/json")
        .header("X-IDP-Timestamp", chrono::Utc::now().timestamp().to_string())
        .timeout(timeout);

    builder = apply_auth(builder, webhook.auth_mode, credential);

    if let Some(secret) = &webhook.signing_secret {
        let signature = signing::sign(&request_body, secret);
        builder = builder.header("X-IDP-Signature", signature);
    }

    let response = builder.body(request_body.clone()).send().await;

    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

    match response {
        Ok(resp) => {
            let status = resp.status();
            let body_text = resp.text().await.unwrap_or_default();
            Ok(PushOutcome {
                success: status.is_success(),
                http_status: Some(status.as_u16()),
                request_body,
                response_body: Some(body_text),
                duration_ms,
                error: None,
            })
        }
        Err(e) => Ok(PushOutcome {
            success: false,
            http_status: None,
            request_body,
            response_body: None,
            duration_ms,
            error: Some(format!("webhook request failed: {e}")),
        }),
    }
}

fn apply_auth(
    builder: reqwest::RequestBuilder,
    mode: AuthMode,
    credential: &AuthCredential,
) -> reqwest::RequestBuilder {
    match (mode, credential) {
        (AuthMode::Basic, AuthCredential::Basic { username, password }) => {
            builder.basic_auth(username, Some(password))
        }
        (AuthMode::Bearer, AuthCredential::Bearer { token }) => builder.bearer_auth(token),
        (AuthMode::ApiKey, AuthCredential::ApiKey { header_name, value }) => {
            builder.header(header_name.as_str(), value.as_str())
        }
        _ => builder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::TemplateContext;
    use chrono::Utc;
    use docpipe_types::job::{ConfidenceMap, Job, JobStatus, LlmAccounting, OcrStructured, RuleRef};
    use docpipe_types::webhook::WebhookType;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    fn sample_webhook(endpoint: String) -> Webhook {
        Webhook {
            id: "wh-1".to_string(),
            name: "erp-sink".to_string(),
            kind: WebhookType::Generic,
            endpoint_url: Some(endpoint),
            auth_mode: AuthMode::None,
            auth_secret_encrypted: None,
            signing_secret: Some("shh".to_string()),
            request_template: serde_json::json!({"id": "{{task_id}}"}),
            active: true,
            save_mode: None,
        }
    }

    fn sample_job() -> Job {
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
            extracted_fields: serde_json::json!({}),
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

    fn spawn_echo_server(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            if let Ok((mut stream, _)) = listener.accept() {
                let mut buf = [0u8; 4096];
                let _ = stream.read(&mut buf);
                let body = "ok";
                let response =
                    format!("{status_line}\r\nContent-Length: {}\r\n\r\n{body}", body.len());
                let _ = stream.write_all(response.as_bytes());
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn successful_post_is_reported() {
        let url = spawn_echo_server("HTTP/1.1 200 OK");
        let webhook = sample_webhook(url);
        let job = sample_job();
        let ctx = TemplateContext::new(&job, String::new());
        let client = reqwest::Client::new();
        let outcome = push(
            &client,
            &webhook,
            &AuthCredential::None,
            &ctx,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(outcome.success);
        assert_eq!(outcome.http_status, Some(200));
        assert!(outcome.request_body.contains("job-1"));
    }

    #[tokio::test]
    async fn server_error_status_is_not_success() {
        let url = spawn_echo_server("HTTP/1.1 500 Internal Server Error");
        let webhook = sample_webhook(url);
        let job = sample_job();
        let ctx = TemplateContext::new(&job, String::new());
        let client = reqwest::Client::new();
        let outcome = push(
            &client,
            &webhook,
            &AuthCredential::None,
            &ctx,
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert!(!outcome.success);
        assert_eq!(outcome.http_status, Some(500));
    }

    #[tokio::test]
    async fn invalid_endpoint_is_rejected_before_sending() {
        let webhook = sample_webhook("ftp://nope".to_string());
        let job = sample_job();
        let ctx = TemplateContext::new(&job, String::new());
        let client = reqwest::Client::new();
        let result = push(
            &client,
            &webhook,
            &AuthCredential::None,
            &ctx,
            Duration::from_secs(5),
        )
        .await;
        assert!(result.is_err());
    }
}
