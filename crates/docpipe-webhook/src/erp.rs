//! ERP-session webhook target: Kingdee K3 Cloud integration, ported
//! from `kingdee_service.py`'s `KingdeeClient`. Login is session-cookie
//! based; `save`/`draft` differ only in validation strictness; `smart`
//! save tries `save` first and falls back to `draft` on a
//! validation-shaped error.

use docpipe_config::ErpConfig;
use docpipe_utils::{DocpipeError, Result};
use std::time::Instant;

/// `2052` is K3 Cloud's `zh-CN` locale code, required by the login API
/// regardless of deployment locale (ported verbatim, it is a vendor
/// constant, not a developer-facing default).
const LOGIN_LOCALE: i64 = 2052;

const VALIDATION_KEYWORDS: &[&str] = &[
    "必填", "不能为空", "校验", "验证", "required", "validate",
];

pub struct ErpResult {
    pub success: bool,
    pub http_status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub duration_ms: u64,
    pub bill_no: Option<String>,
    pub save_mode: &'static str,
    pub is_degraded: bool,
}

pub struct ErpClient<'a> {
    config: &'a ErpConfig,
    client: reqwest::Client,
    cookies: Option<String>,
}

impl<'a> ErpClient<'a> {
    #[must_use]
    pub fn new(config: &'a ErpConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
            cookies: None,
        }
    }

    fn api_url(&self, method: &str) -> String {
        let base = self.config.api_url.as_deref().unwrap_or("").trim_end_matches('/');
        format!("{base}/Kingdee.BOS.WebApi.ServicesStub.{method}.common.kdsvc")
    }

    async fn login(&mut self) -> Result<()> {
        if !self.config.is_configured() {
            return Err(DocpipeError::Webhook(
                "ERP integration is not configured".to_string(),
            ));
        }
        let url = self.api_url("AuthService.ValidateUser");
        let params = serde_json::json!([
            self.config.db_id,
            self.config.username,
            self.config.password,
            LOGIN_LOCALE,
        ]);
        let payload = serde_json::json!({ "parameters": params.to_string() });

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| DocpipeError::Webhook(format!("ERP login request failed: {e}")))?;

        let cookie_header = response
            .headers()
            .get_all(reqwest::header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(|v| v.split(';').next().unwrap_or(v).to_string())
            .collect::<Vec<_>>()
            .join("; ");

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| DocpipeError::Webhook(format!("ERP login response invalid: {e}")))?;

        if body["LoginResultType"].as_i64() == Some(1) {
            self.cookies = Some(cookie_header);
            Ok(())
        } else {
            let message = body["Message"].as_str().unwrap_or("unknown error");
            Err(DocpipeError::Webhook(format!("ERP login failed: {message}")))
        }
    }

    async fn execute_save(&mut self, body: &serde_json::Value, mode: &'static str) -> ErpResult {
        let started = Instant::now();
        if self.cookies.is_none() {
            if let Err(e) = self.login().await {
                return ErpResult {
                    success: false,
                    http_status: None,
                    response_body: None,
                    error: Some(e.to_string()),
                    duration_ms: elapsed_ms(started),
                    bill_no: None,
                    save_mode: mode,
                    is_degraded: false,
                };
            }
        }

        let method = if mode == "save" {
            "DynamicFormService.Save"
        } else {
            "DynamicFormService.Draft"
        };
        let url = self.api_url(method);

        let mut request = self.client.post(&url).json(body);
        if let Some(cookie) = &self.cookies {
            request = request.header(reqwest::header::COOKIE, cookie.clone());
        }

        let response = match request.send().await {
            Ok(resp) => resp,
            Err(e) => {
                return ErpResult {
                    success: false,
                    http_status: None,
                    response_body: None,
                    error: Some(format!("ERP {mode} request failed: {e}")),
                    duration_ms: elapsed_ms(started),
                    bill_no: None,
                    save_mode: mode,
                    is_degraded: false,
                };
            }
        };
        let http_status = response.status().as_u16();
        let result: serde_json::Value = match response.json().await {
            Ok(v) => v,
            Err(e) => {
                return ErpResult {
                    success: false,
                    http_status: Some(http_status),
                    response_body: None,
                    error: Some(format!("ERP {mode} response invalid JSON: {e}")),
                    duration_ms: elapsed_ms(started),
                    bill_no: None,
                    save_mode: mode,
                    is_degraded: false,
                };
            }
        };
        let response_body = result.to_string();
        let status = &result["Result"]["ResponseStatus"];
        let is_success = status["IsSuccess"].as_bool().unwrap_or(false);

        if is_success {
            let bill_no = status["SuccessEntitys"][0]["Number"]
                .as_str()
                .map(String::from);
            ErpResult {
                success: true,
                http_status: Some(http_status),
                response_body: Some(response_body),
                error: None,
                duration_ms: elapsed_ms(started),
                bill_no,
                save_mode: mode,
                is_degraded: false,
            }
        } else {
            let error = status["Errors"]
                .as_array()
                .map(|errors| {
                    errors
                        .iter()
                        .filter_map(|e| e["Message"].as_str())
                        .collect::<Vec<_>>()
                        .join("; ")
                })
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "unknown error".to_string());
            ErpResult {
                success: false,
                http_status: Some(http_status),
                response_body: Some(response_body),
                error: Some(error),
                duration_ms: elapsed_ms(started),
                bill_no: None,
                save_mode: mode,
                is_degraded: false,
            }
        }
    }

    /// Strategy per `config.save_mode` (spec §4.6): `smart` tries `save`
    /// and falls back to `draft` when the failure looks like a
    /// validation error; `save_only`/`draft_only` pin to one mode.
    pub async fn smart_save(&mut self, request_body: &serde_json::Value) -> ErpResult {
        match self.config.save_mode.as_str() {
            "draft_only" => self.execute_save(request_body, "draft").await,
            "save_only" => self.execute_save(request_body, "save").await,
            _ => {
                let save_result = self.execute_save(request_body, "save").await;
                if save_result.success {
                    return save_result;
                }
                let looks_like_validation_error = save_result
                    .error
                    .as_deref()
                    .map(|msg| {
                        let lower = msg.to_lowercase();
                        VALIDATION_KEYWORDS
                            .iter()
                            .any(|kw| msg.contains(kw) || lower.contains(&kw.to_lowercase()))
                    })
                    .unwrap_or(false);
                if !looks_like_validation_error {
                    return save_result;
                }
                let mut draft_result = self.execute_save(request_body, "draft").await;
                if draft_result.success {
                    draft_result.is_degraded = true;
                }
                draft_result
            }
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}
